//! Filters that reject combinations known to only add spurious ambiguity.
//! Constraints see the names of the rules that generated each input cell.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::rules::{APPLICATION_LABEL, COMPOSITION_LABEL, Direction, RuleName};

pub trait NormalFormConstraint: fmt::Debug + Send + Sync {
  fn is_valid_binary(&self, left: &[RuleName], right: &[RuleName], rule: &RuleName) -> bool;

  fn is_valid_unary(&self, child: &[RuleName], rule: &RuleName) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct NormalFormValidator {
  constraints: Vec<Arc<dyn NormalFormConstraint>>,
}

impl NormalFormValidator {
  pub fn builder() -> NormalFormValidatorBuilder {
    NormalFormValidatorBuilder::default()
  }

  pub fn is_valid_binary(&self, left: &[RuleName], right: &[RuleName], rule: &RuleName) -> bool {
    self
      .constraints
      .iter()
      .all(|c| c.is_valid_binary(left, right, rule))
  }

  pub fn is_valid_unary(&self, child: &[RuleName], rule: &RuleName) -> bool {
    self.constraints.iter().all(|c| c.is_valid_unary(child, rule))
  }

  pub fn len(&self) -> usize {
    self.constraints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.constraints.is_empty()
  }
}

#[derive(Debug, Default)]
pub struct NormalFormValidatorBuilder {
  constraints: Vec<Arc<dyn NormalFormConstraint>>,
}

impl NormalFormValidatorBuilder {
  pub fn add_constraint(mut self, constraint: impl NormalFormConstraint + 'static) -> Self {
    self.constraints.push(Arc::new(constraint));
    self
  }

  pub fn build(self) -> NormalFormValidator {
    info!(
      constraints = ?self.constraints,
      "normal form validator"
    );
    NormalFormValidator {
      constraints: self.constraints,
    }
  }
}

/// Bans unary rules from applying to cells generated by any of `rules`
#[derive(Debug, Clone)]
pub struct UnaryConstraint {
  rules: HashSet<RuleName>,
}

impl UnaryConstraint {
  pub fn new(rules: impl IntoIterator<Item = RuleName>) -> Self {
    Self {
      rules: rules.into_iter().collect(),
    }
  }
}

impl NormalFormConstraint for UnaryConstraint {
  fn is_valid_binary(&self, _left: &[RuleName], _right: &[RuleName], _rule: &RuleName) -> bool {
    true
  }

  fn is_valid_unary(&self, child: &[RuleName], _rule: &RuleName) -> bool {
    !child.iter().any(|name| self.rules.contains(name.outermost()))
  }
}

/// Eisner-style constraints on composition (Hockenmaier & Bisk, 2010):
///
/// 1. the primary functor of a first-order composition or an application
///    can't itself come from composition in the same direction;
/// 2. the primary functor of any composition can't come from first-order
///    composition in the same direction;
/// 3. the secondary functor of a composition can't come from a lower order
///    composition in the same direction.
#[derive(Debug, Clone, Default)]
pub struct CompositionConstraint;

impl CompositionConstraint {
  pub fn new() -> Self {
    Self
  }
}

impl NormalFormConstraint for CompositionConstraint {
  fn is_valid_binary(&self, left: &[RuleName], right: &[RuleName], rule: &RuleName) -> bool {
    let direction = match rule.direction() {
      Some(direction) => direction,
      None => return true,
    };
    let (primary, secondary) = match direction {
      Direction::Forward => (left, right),
      Direction::Backward => (right, left),
    };
    let is_composition = rule.label() == COMPOSITION_LABEL;
    let is_application = rule.label() == APPLICATION_LABEL;

    let primary_composed = |order_zero_only: bool| {
      primary.iter().map(RuleName::outermost).any(|r| {
        r.label() == COMPOSITION_LABEL
          && r.direction() == Some(direction)
          && (!order_zero_only || r.order() == 0)
      })
    };

    if (is_application || (is_composition && rule.order() == 0)) && primary_composed(false) {
      return false;
    }
    if is_composition && primary_composed(true) {
      return false;
    }
    if is_composition
      && secondary.iter().map(RuleName::outermost).any(|r| {
        r.label() == COMPOSITION_LABEL && r.direction() == Some(direction) && rule.order() > r.order()
      })
    {
      return false;
    }
    true
  }

  fn is_valid_unary(&self, _child: &[RuleName], _rule: &RuleName) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fcomp() -> RuleName {
    RuleName::new(COMPOSITION_LABEL, Some(Direction::Forward), 0)
  }

  fn fapp() -> RuleName {
    RuleName::new(APPLICATION_LABEL, Some(Direction::Forward), 0)
  }

  fn bapp() -> RuleName {
    RuleName::new(APPLICATION_LABEL, Some(Direction::Backward), 0)
  }

  #[test]
  fn test_composition_constraint() {
    let nf = NormalFormValidator::builder()
      .add_constraint(CompositionConstraint::new())
      .build();
    let lex = [RuleName::lexical()];

    // (X/Y Y/Z) Z: compose then apply is the spurious bracketing
    assert!(!nf.is_valid_binary(&[fcomp()], &lex, &fapp()));
    assert!(!nf.is_valid_binary(&[fcomp()], &lex, &fcomp()));
    assert!(nf.is_valid_binary(&lex, &[fcomp()], &fapp()));
    // backward application looks at the right cell as the functor
    assert!(nf.is_valid_binary(&[fcomp()], &lex, &bapp()));
    assert!(nf.is_valid_binary(&lex, &lex, &fapp()));
  }

  #[test]
  fn test_overloaded_names_use_the_unary() {
    let nf = NormalFormValidator::builder()
      .add_constraint(CompositionConstraint::new())
      .build();
    let shifted = fcomp().overload(&RuleName::simple("shift"));
    assert!(nf.is_valid_binary(&[shifted], &[RuleName::lexical()], &fapp()));
  }

  #[test]
  fn test_unary_constraint() {
    let nf = NormalFormValidator::builder()
      .add_constraint(UnaryConstraint::new([fcomp()]))
      .build();
    let shift = RuleName::simple("shift");
    assert!(!nf.is_valid_unary(&[RuleName::lexical(), fcomp()], &shift));
    assert!(nf.is_valid_unary(&[RuleName::lexical()], &shift));
    assert!(nf.is_valid_binary(&[fcomp()], &[fcomp()], &fapp()));
  }
}
