//! Outside scores checked against brute-force enumeration of every tree.

use std::collections::BTreeMap;

use ccg_chart::category::{Category, Term};
use ccg_chart::lexicon::Lexicon;
use ccg_chart::model::{FeatureSet, FeatureVector, LinearModel, LogFeatureVector, RuleUsageFeatureSet, StepView};
use ccg_chart::normal_form::{CompositionConstraint, NormalFormValidator};
use ccg_chart::rules::{BinaryRule, ForwardApplication, ForwardComposition};
use ccg_chart::utils::log_sum_exp_all;
use ccg_chart::{Err, MultiCkyParser, Parser, ParserBuilder, ParserOutput};

const LEXICON: &str = r"
  a :- S/S : a
  b :- S/S : b
  b :- S/S : b {alt}
  c :- S : c
";

fn model() -> Result<LinearModel<Term>, Err> {
  let lexicon: Lexicon<Term> = LEXICON.parse()?;
  let mut model = LinearModel::with_default_features(lexicon);
  model.set_weight("ORIGIN#lexicon", 0.2);
  model.set_weight("ORIGIN#alt", -0.7);
  model.set_weight(
    RuleUsageFeatureSet::rule_key(BinaryRule::<Term>::name(&ForwardComposition::new())),
    0.5,
  );
  model.set_weight(
    RuleUsageFeatureSet::rule_key(BinaryRule::<Term>::name(&ForwardApplication::new())),
    -0.3,
  );
  Ok(model)
}

fn builder() -> ParserBuilder<Term> {
  ParserBuilder::new()
    .add_binary_rule(ForwardApplication::new())
    .add_binary_rule(ForwardComposition::new())
}

/// (category, score, features) of every tree under every full parse
fn enumerate(output: &ParserOutput<Term>) -> Vec<(Category<Term>, f64, FeatureVector)> {
  output
    .all_derivations()
    .iter()
    .flat_map(|d| {
      d.trees()
        .into_iter()
        .map(|t| (d.category().clone(), t.score, t.features))
        .collect::<Vec<_>>()
    })
    .collect()
}

/// log sum_t exp(score_t + bonus_t) f_t, per feature
fn brute_log_expected<'a>(trees: impl Iterator<Item = (f64, &'a FeatureVector)>) -> BTreeMap<String, f64> {
  let mut terms: BTreeMap<String, Vec<f64>> = BTreeMap::new();
  for (score, features) in trees {
    for (key, value) in features.iter() {
      terms.entry(key.to_string()).or_default().push(score + value.ln());
    }
  }
  terms
    .into_iter()
    .map(|(key, values)| (key, log_sum_exp_all(values)))
    .collect()
}

fn assert_close(actual: &LogFeatureVector, expected: &BTreeMap<String, f64>) {
  assert_eq!(actual.len(), expected.len(), "{} vs {:?}", actual, expected);
  for (key, value) in expected.iter() {
    let got = actual.get(key);
    assert!((got - value).abs() < 1e-9, "{}: {} vs {}", key, got, value);
  }
}

fn check_against_brute_force(mut output: ParserOutput<Term>) {
  let trees = enumerate(&output);
  assert_eq!(trees.len(), 4);

  for derivation in output.all_derivations() {
    let inside = log_sum_exp_all(
      derivation
        .trees()
        .iter()
        .map(|t| t.score),
    );
    assert!((derivation.log_inside_score() - inside).abs() < 1e-9);
    assert_eq!(derivation.num_parses(), 2);
  }

  let log_norm = log_sum_exp_all(trees.iter().map(|(_, score, _)| *score));
  assert!((output.log_norm() - log_norm).abs() < 1e-9);

  let expected = brute_log_expected(trees.iter().map(|(_, score, f)| (*score, f)));
  assert_close(&output.log_expected_features(), &expected);

  // a second pass over the same chart starts from scratch
  assert_close(&output.log_expected_features(), &expected);

  let normalised = output.expected_features();
  for (key, log_value) in expected.iter() {
    assert!((normalised.get(key) - (log_value - log_norm).exp()).abs() < 1e-9);
  }
  // every tree uses three lexical entries
  let lexical = normalised.get("ORIGIN#lexicon") + normalised.get("ORIGIN#alt");
  assert!((lexical - 3.0).abs() < 1e-9);

  let composed = |c: &Category<Term>| c.to_string().contains('.');
  let filtered_norm = log_sum_exp_all(
    trees
      .iter()
      .filter(|(c, _, _)| composed(c))
      .map(|(_, score, _)| *score),
  );
  assert!((output.log_norm_filtered(composed) - filtered_norm).abs() < 1e-9);
  let filtered = brute_log_expected(
    trees
      .iter()
      .filter(|(c, _, _)| composed(c))
      .map(|(_, score, f)| (*score, f)),
  );
  assert_close(&output.log_expected_features_filtered(composed), &filtered);

  let bonus = |c: &Category<Term>| if composed(c) { 1.5 } else { 0.0 };
  let scored = brute_log_expected(trees.iter().map(|(c, score, f)| (score + bonus(c), f)));
  assert_close(&output.log_expected_features_scored(bonus), &scored);
}

#[test]
fn test_outside_matches_enumeration() -> Result<(), Err> {
  let model = model()?;
  let output = builder().build()?.parse(&["a", "b", "c"], &model)?;
  assert!(output.is_exact());
  assert_eq!(output.all_derivations().len(), 2);
  check_against_brute_force(output);
  Ok(())
}

#[test]
fn test_outside_matches_enumeration_multi() -> Result<(), Err> {
  let model = model()?;
  let parser: MultiCkyParser<Term> = builder().num_threads(3).build_multi()?;
  check_against_brute_force(parser.parse(&["a", "b", "c"], &model)?);
  Ok(())
}

#[test]
fn test_viterbi_features_average_ties() -> Result<(), Err> {
  let lexicon: Lexicon<Term> = LEXICON.parse()?;
  // no weights: both b entries tie
  let model = LinearModel::with_default_features(lexicon);
  let output = builder().build()?.parse(&["a", "b", "c"], &model)?;

  for derivation in output.best_derivations() {
    assert_eq!(derivation.num_viterbi_parses(), 2);
    let features = derivation.average_max_features();
    assert!((features.get("ORIGIN#alt") - 0.5).abs() < 1e-9);
    assert!((features.get("ORIGIN#lexicon") - 2.5).abs() < 1e-9);
    assert_eq!(derivation.max_lexical_entries().len(), 4);
  }
  assert_eq!(output.best_derivations().len(), 2);
  Ok(())
}

/// +1 per composition, -1 per application
struct Balance;

impl FeatureSet<Term> for Balance {
  fn set_features(&self, step: &StepView<'_, Term>, features: &mut FeatureVector) {
    match step.rule.base().to_string().as_str() {
      ">comp" => features.add("BALANCE", 1.0),
      ">apply" => features.add("BALANCE", -1.0),
      _ => {}
    }
  }
}

#[test]
fn test_negative_feature_expectations() -> Result<(), Err> {
  let mut model = model()?.with_feature_set(Balance);
  model.set_weight("BALANCE", 0.4);
  let parsers: Vec<Box<dyn Parser<Term>>> = vec![
    Box::new(builder().build()?),
    Box::new(builder().num_threads(2).build_multi()?),
  ];
  for parser in parsers {
    let mut output = parser.parse(&["a", "b", "c"], &model)?;
    let trees = enumerate(&output);
    let log_norm = log_sum_exp_all(trees.iter().map(|(_, score, _)| *score));
    let expected = trees
      .iter()
      .map(|(_, score, f)| (score - log_norm).exp() * f.get("BALANCE"))
      .sum::<f64>();
    assert!(expected < 0.0);

    let log_expected = output.log_expected_features();
    assert!(log_expected.is_negative("BALANCE"));
    let (_, magnitude) = log_expected.signed("BALANCE");
    assert!((magnitude - (-expected * log_norm.exp()).ln()).abs() < 1e-9);
    assert!((output.expected_features().get("BALANCE") - expected).abs() < 1e-9);
  }
  Ok(())
}

#[test]
fn test_normal_form_drops_spurious_bracketing() -> Result<(), Err> {
  let model = model()?;
  let validator = || {
    NormalFormValidator::builder()
      .add_constraint(CompositionConstraint::new())
      .build()
  };
  let parsers: Vec<Box<dyn Parser<Term>>> = vec![
    Box::new(builder().normal_form(validator()).build()?),
    Box::new(builder().normal_form(validator()).num_threads(2).build_multi()?),
  ];
  for parser in parsers {
    let output = parser.parse(&["a", "b", "c"], &model)?;
    // only a (b c) survives; composing a with b first is never combined further
    let derivations = output.all_derivations();
    assert_eq!(derivations.len(), 1);
    assert!(!derivations[0].category().to_string().contains('.'));
    assert_eq!(derivations[0].num_parses(), 2);
    assert_eq!(enumerate(&output).len(), 2);
  }
  Ok(())
}
