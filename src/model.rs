use std::collections::BTreeMap;
use std::fmt;

use crate::category::{Category, Semantics};
use crate::lexicon::{LexicalEntry, Lexicon, LexiconSource};
use crate::rules::RuleName;
use crate::span::Span;
use crate::utils::{log_diff_exp, log_sum_exp};

/// Sparse feature vector, ordered by key so printing and iteration are stable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> f64 {
    self.0.get(key).copied().unwrap_or(0.0)
  }

  pub fn get_or(&self, key: &str, default: f64) -> f64 {
    self.0.get(key).copied().unwrap_or(default)
  }

  pub fn set(&mut self, key: impl Into<String>, value: f64) {
    self.0.insert(key.into(), value);
  }

  pub fn add(&mut self, key: impl Into<String>, value: f64) {
    *self.0.entry(key.into()).or_insert(0.0) += value;
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.0.iter().map(|(k, v)| (k.as_str(), *v))
  }

  /// target += factor * self
  pub fn add_times_into(&self, factor: f64, target: &mut FeatureVector) {
    for (key, value) in self.0.iter() {
      target.add(key.as_str(), factor * value);
    }
  }

  pub fn divide_by(&mut self, divisor: f64) {
    for value in self.0.values_mut() {
      *value /= divisor;
    }
  }

  pub fn dot(&self, other: &FeatureVector) -> f64 {
    self.iter().map(|(k, v)| v * other.get(k)).sum()
  }
}

/// Log-space feature values that may be negative. Positive and negative
/// contributions are summed apart and only combined when read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFeatureVector {
  positive: FeatureVector,
  negative: FeatureVector,
}

impl LogFeatureVector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Accumulate `exp(log_weight) * features`. Zeros contribute nothing.
  pub fn log_sum_exp_add(&mut self, log_weight: f64, features: &FeatureVector) {
    for (key, value) in features.iter() {
      let side = if value > 0.0 {
        &mut self.positive
      } else if value < 0.0 {
        &mut self.negative
      } else {
        continue;
      };
      let current = side.get_or(key, f64::NEG_INFINITY);
      side.set(key, log_sum_exp(current, log_weight + value.abs().ln()));
    }
  }

  /// Sign and log magnitude of the value of `key`. A zero value has
  /// magnitude `-inf` and a positive sign.
  pub fn signed(&self, key: &str) -> (f64, f64) {
    let positive = self.positive.get_or(key, f64::NEG_INFINITY);
    let negative = self.negative.get_or(key, f64::NEG_INFINITY);
    if positive >= negative {
      (1.0, log_diff_exp(positive, negative))
    } else {
      (-1.0, log_diff_exp(negative, positive))
    }
  }

  /// Log of the value of `key`, NaN if the value is negative
  pub fn get(&self, key: &str) -> f64 {
    match self.signed(key) {
      (sign, magnitude) if sign > 0.0 => magnitude,
      _ => f64::NAN,
    }
  }

  pub fn is_negative(&self, key: &str) -> bool {
    self.signed(key).0 < 0.0
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    let mut keys = self.positive.0.keys().chain(self.negative.0.keys()).collect::<Vec<_>>();
    keys.sort();
    keys.dedup();
    keys.into_iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.keys().count()
  }

  pub fn is_empty(&self) -> bool {
    self.positive.is_empty() && self.negative.is_empty()
  }

  /// exp(self - log_norm), turning log expectations into expectations
  pub fn exp_normalized(&self, log_norm: f64) -> FeatureVector {
    self
      .keys()
      .map(|key| {
        let positive = (self.positive.get_or(key, f64::NEG_INFINITY) - log_norm).exp();
        let negative = (self.negative.get_or(key, f64::NEG_INFINITY) - log_norm).exp();
        (key, positive - negative)
      })
      .collect()
  }
}

impl fmt::Display for LogFeatureVector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{")?;
    for (idx, key) in self.keys().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      let (sign, magnitude) = self.signed(key);
      let sign = if sign < 0.0 { "-" } else { "" };
      write!(f, "{}={}exp({})", key, sign, magnitude)?;
    }
    write!(f, "}}")
  }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureVector {
  fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
    let mut v = Self::new();
    for (k, value) in iter {
      v.add(k, value);
    }
    v
  }
}

impl fmt::Display for FeatureVector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{")?;
    for (idx, (k, v)) in self.0.iter().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}={}", k, v)?;
    }
    write!(f, "}}")
  }
}

/// What the model gets to look at when scoring a chart step
#[derive(Debug, Clone)]
pub struct StepView<'a, M> {
  pub rule: &'a RuleName,
  pub span: Span,
  pub category: &'a Category<M>,
  pub entry: Option<&'a LexicalEntry<M>>,
}

pub trait Model<M: Semantics>: Send + Sync {
  fn features(&self, step: &StepView<'_, M>) -> FeatureVector;

  fn score(&self, features: &FeatureVector) -> f64;

  /// Entries the model was trained with
  fn lexicon(&self) -> &dyn LexiconSource<M>;

  fn features_and_score(&self, step: &StepView<'_, M>) -> (FeatureVector, f64) {
    let features = self.features(step);
    let score = self.score(&features);
    (features, score)
  }
}

pub trait FeatureSet<M: Semantics>: Send + Sync {
  fn set_features(&self, step: &StepView<'_, M>, features: &mut FeatureVector);
}

/// One indicator per lexical entry, plus one per entry origin
#[derive(Debug, Clone, Default)]
pub struct LexicalFeatureSet;

impl LexicalFeatureSet {
  pub const PREFIX: &'static str = "LEX";
  pub const ORIGIN_PREFIX: &'static str = "ORIGIN";

  pub fn entry_key<M: Semantics>(entry: &LexicalEntry<M>) -> String {
    format!("{}#{}", Self::PREFIX, entry)
  }
}

impl<M: Semantics> FeatureSet<M> for LexicalFeatureSet {
  fn set_features(&self, step: &StepView<'_, M>, features: &mut FeatureVector) {
    if let Some(entry) = step.entry {
      features.add(Self::entry_key(entry), 1.0);
      features.add(format!("{}#{}", Self::ORIGIN_PREFIX, entry.origin), 1.0);
    }
  }
}

/// One indicator per rule application. Overloaded steps count both rules.
#[derive(Debug, Clone, Default)]
pub struct RuleUsageFeatureSet {
  skip_lexical: bool,
}

impl RuleUsageFeatureSet {
  pub const PREFIX: &'static str = "RULE";

  pub fn new(skip_lexical: bool) -> Self {
    Self { skip_lexical }
  }

  pub fn rule_key(rule: &RuleName) -> String {
    format!("{}#{}", Self::PREFIX, rule.base())
  }
}

impl<M: Semantics> FeatureSet<M> for RuleUsageFeatureSet {
  fn set_features(&self, step: &StepView<'_, M>, features: &mut FeatureVector) {
    let base = step.rule.base();
    if !(self.skip_lexical && base.is_lexical()) {
      features.add(Self::rule_key(&base), 1.0);
    }
    if let Some(unary) = step.rule.unary() {
      features.add(Self::rule_key(unary), 1.0);
    }
  }
}

/// Features from a list of feature sets, scored against a weight vector
pub struct LinearModel<M: Semantics> {
  lexicon: Lexicon<M>,
  feature_sets: Vec<Box<dyn FeatureSet<M>>>,
  weights: FeatureVector,
}

impl<M: Semantics> LinearModel<M> {
  pub fn new(lexicon: Lexicon<M>) -> Self {
    Self {
      lexicon,
      feature_sets: Vec::new(),
      weights: FeatureVector::new(),
    }
  }

  /// Lexical and rule usage features, the usual setup
  pub fn with_default_features(lexicon: Lexicon<M>) -> Self {
    Self::new(lexicon)
      .with_feature_set(LexicalFeatureSet)
      .with_feature_set(RuleUsageFeatureSet::new(true))
  }

  pub fn with_feature_set(mut self, set: impl FeatureSet<M> + 'static) -> Self {
    self.feature_sets.push(Box::new(set));
    self
  }

  pub fn weights(&self) -> &FeatureVector {
    &self.weights
  }

  pub fn weights_mut(&mut self) -> &mut FeatureVector {
    &mut self.weights
  }

  pub fn set_weight(&mut self, key: impl Into<String>, value: f64) {
    self.weights.set(key, value);
  }

  pub fn lexicon_mut(&mut self) -> &mut Lexicon<M> {
    &mut self.lexicon
  }
}

impl<M: Semantics> Model<M> for LinearModel<M> {
  fn features(&self, step: &StepView<'_, M>) -> FeatureVector {
    let mut features = FeatureVector::new();
    for set in self.feature_sets.iter() {
      set.set_features(step, &mut features);
    }
    features
  }

  fn score(&self, features: &FeatureVector) -> f64 {
    features.dot(&self.weights)
  }

  fn lexicon(&self) -> &dyn LexiconSource<M> {
    &self.lexicon
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::category::{Syntax, Term};

  #[test]
  fn test_vector_ops() {
    let mut a: FeatureVector = [("x", 1.0), ("y", 2.0)].into_iter().collect();
    let b: FeatureVector = [("y", 3.0), ("z", 1.0)].into_iter().collect();
    assert_eq!(a.dot(&b), 6.0);
    b.add_times_into(2.0, &mut a);
    assert_eq!(a.get("y"), 8.0);
    assert_eq!(a.get("z"), 2.0);
    a.divide_by(2.0);
    assert_eq!(a.get("x"), 0.5);
    assert_eq!(a.get("missing"), 0.0);
    assert_eq!(FeatureVector::new().to_string(), "{}");
  }

  #[test]
  fn test_log_sum_exp_add() {
    let mut acc = LogFeatureVector::new();
    let feats: FeatureVector = [("x", 2.0), ("zero", 0.0)].into_iter().collect();
    acc.log_sum_exp_add(0.5f64.ln(), &feats);
    acc.log_sum_exp_add(0.25f64.ln(), &feats);
    assert!((acc.get("x").exp() - 1.5).abs() < 1e-12);
    assert_eq!(acc.len(), 1);
    assert_eq!(acc.get("zero"), f64::NEG_INFINITY);
    let expected = acc.exp_normalized(0.0);
    assert!((expected.get("x") - 1.5).abs() < 1e-12);
  }

  #[test]
  fn test_log_sum_exp_add_signed() {
    let mut acc = LogFeatureVector::new();
    let up: FeatureVector = [("x", 1.0), ("y", 1.0)].into_iter().collect();
    let down: FeatureVector = [("x", -3.0), ("y", -0.5)].into_iter().collect();
    acc.log_sum_exp_add(0.0, &up);
    acc.log_sum_exp_add(0.0, &down);

    // x = 1 - 3, y = 1 - 0.5
    assert!(acc.is_negative("x"));
    let (sign, magnitude) = acc.signed("x");
    assert_eq!(sign, -1.0);
    assert!((magnitude - 2f64.ln()).abs() < 1e-12);
    assert!(acc.get("x").is_nan());
    assert!((acc.get("y") - 0.5f64.ln()).abs() < 1e-12);

    let expected = acc.exp_normalized(2f64.ln());
    assert!((expected.get("x") + 1.0).abs() < 1e-12);
    assert!((expected.get("y") - 0.25).abs() < 1e-12);
  }

  #[test]
  fn test_linear_model() {
    let entry = LexicalEntry::new(
      &["dog"],
      Category::new(Syntax::atom("N"), Term::constant("dog")),
      "base",
    );
    let mut model = LinearModel::with_default_features(Lexicon::new());
    model.set_weight(LexicalFeatureSet::entry_key(&entry), 1.5);
    model.set_weight("ORIGIN#base", -0.5);

    let lex = RuleName::lexical();
    let step = StepView {
      rule: &lex,
      span: Span::new(0, 0, 1),
      category: &entry.category,
      entry: Some(&entry),
    };
    let (features, score) = model.features_and_score(&step);
    assert_eq!(features.len(), 2);
    assert_eq!(score, 1.0);

    let shifted = lex.overload(&RuleName::simple("shift"));
    let step = StepView {
      rule: &shifted,
      ..step
    };
    let features = model.features(&step);
    assert_eq!(features.get("RULE#shift"), 1.0);
    assert_eq!(features.get("RULE#lex"), 0.0);
  }
}
