//! Helpers shared by unit tests.

use std::sync::Arc;

use crate::category::{Category, Syntax, Term};
use crate::chart::{Cell, CellId, ChildScores, Step};
use crate::lexicon::{LexicalEntry, Lexicon};
use crate::model::{LexicalFeatureSet, LinearModel, Model};
use crate::rules::{RuleName, RuleResult};
use crate::span::Span;

/// A model whose lexical scores are set per entry origin
pub fn origin_model(weights: &[(&str, f64)]) -> LinearModel<Term> {
  let mut model = LinearModel::new(Lexicon::new()).with_feature_set(LexicalFeatureSet);
  for (origin, weight) in weights {
    model.set_weight(format!("ORIGIN#{}", origin), *weight);
  }
  model
}

pub fn noun(sem: &str) -> Category<Term> {
  Category::new(Syntax::atom("N"), Term::constant(sem))
}

pub fn lexical_step(model: &dyn Model<Term>, span: Span, category: Category<Term>, origin: &str) -> Step<Term> {
  let entry = LexicalEntry::new(&["w"], category, origin);
  Step::lexical(Arc::new(entry), span, span.is_complete(), model)
}

pub fn lexical_cell(model: &dyn Model<Term>, span: Span, category: Category<Term>, origin: &str) -> Cell<Term> {
  Cell::new(lexical_step(model, span, category, origin), ChildScores::leaf())
}

/// A cell built by a binary step whose children score `score`. `child` tells
/// steps of the same category apart.
pub fn binary_cell(model: &dyn Model<Term>, span: Span, category: Category<Term>, score: f64, child: usize) -> Cell<Term> {
  let result = RuleResult {
    name: RuleName::simple("combine"),
    category,
  };
  let left = CellId {
    start: span.start,
    end: span.start,
    key: child,
  };
  let right = CellId {
    start: span.end,
    end: span.end,
    key: child,
  };
  let children = ChildScores {
    viterbi: score,
    log_inside: score,
    ..ChildScores::leaf()
  };
  Cell::new(Step::binary(result, span, left, right, span.is_complete(), model), children)
}
