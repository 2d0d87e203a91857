use std::sync::Arc;

use crate::category::{Category, Semantics};
use crate::chart::Cell;
use crate::normal_form::NormalFormValidator;
use crate::rules::{BinaryRule, RuleName, RuleResult, UnaryRule};
use crate::span::Span;

/// A binary rule as the chart applies it: to cells rather than categories,
/// subject to the normal-form constraints.
pub(crate) struct CkyBinaryRule<M: Semantics> {
  rule: Arc<dyn BinaryRule<M>>,
  validator: Option<Arc<NormalFormValidator>>,
}

impl<M: Semantics> CkyBinaryRule<M> {
  pub fn new(rule: Arc<dyn BinaryRule<M>>, validator: Option<Arc<NormalFormValidator>>) -> Self {
    Self { rule, validator }
  }

  pub fn name(&self) -> &RuleName {
    self.rule.name()
  }

  pub fn apply(&self, left: &Cell<M>, right: &Cell<M>) -> Option<RuleResult<M>> {
    let (left_span, right_span) = (left.span(), right.span());
    assert!(
      left_span.is_adjacent_to(&right_span),
      "{} can't combine non-adjacent spans {} and {}",
      self.name(),
      left_span,
      right_span
    );
    if let Some(validator) = &self.validator
      && !validator.is_valid_binary(left.rule_names(), right.rule_names(), self.name())
    {
      return None;
    }
    self
      .rule
      .apply(left.category(), right.category(), left_span.join(&right_span))
  }
}

pub(crate) struct CkyUnaryRule<M: Semantics> {
  rule: Arc<dyn UnaryRule<M>>,
  validator: Option<Arc<NormalFormValidator>>,
}

impl<M: Semantics> CkyUnaryRule<M> {
  pub fn new(rule: Arc<dyn UnaryRule<M>>, validator: Option<Arc<NormalFormValidator>>) -> Self {
    Self { rule, validator }
  }

  pub fn name(&self) -> &RuleName {
    self.rule.name()
  }

  pub fn apply(&self, cell: &Cell<M>) -> Option<RuleResult<M>> {
    if let Some(validator) = &self.validator
      && !validator.is_valid_unary(cell.rule_names(), self.name())
    {
      return None;
    }
    self.rule.apply(cell.category(), cell.span())
  }

  pub fn is_valid_argument(&self, category: &Category<M>, span: Span) -> bool {
    self.rule.is_valid_argument(category, span)
  }
}
