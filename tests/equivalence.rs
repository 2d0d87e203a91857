//! The worker pool must build exactly the chart the sequential parser builds.

use std::collections::BTreeMap;

use proptest::prelude::*;

use ccg_chart::category::{Syntax, Term};
use ccg_chart::chart::Chart;
use ccg_chart::lexicon::Lexicon;
use ccg_chart::model::LinearModel;
use ccg_chart::rules::{BackwardApplication, ForwardApplication, TypeShift};
use ccg_chart::{CkyParser, Err, MultiCkyParser, Parser, ParserBuilder};

const LEXICON: &str = r"
  x :- S/S : f {fwd}
  x :- S : a {atom}
  x :- S\S : g {bwd}
  x :- N : n {noun}
  x :- S\NP : v {verb}
  y :- NP : y {noun}
  y :- (S\NP)/NP : t {verb}
";

fn model() -> Result<LinearModel<Term>, Err> {
  let lexicon: Lexicon<Term> = LEXICON.parse()?;
  let mut model = LinearModel::with_default_features(lexicon);
  for (origin, weight) in [("fwd", 0.3), ("atom", -0.2), ("bwd", 0.1), ("noun", 0.7), ("verb", -0.4)] {
    model.set_weight(format!("ORIGIN#{}", origin), weight);
  }
  model.set_weight("RULE#<apply", 0.25);
  Ok(model)
}

fn builder() -> ParserBuilder<Term> {
  ParserBuilder::new()
    .beam(100_000)
    .add_binary_rule(ForwardApplication::new())
    .add_binary_rule(BackwardApplication::new())
    .add_unary_rule(TypeShift::new("shift", Syntax::atom("N"), Syntax::atom("NP")))
}

fn parsers() -> Result<(CkyParser<Term>, MultiCkyParser<Term>), Err> {
  Ok((builder().build()?, builder().num_threads(4).build_multi()?))
}

/// What a cell looks like independent of insertion order
type CellSummary = (f64, f64, u64, u64, usize);

fn summarize(chart: &Chart<Term>) -> BTreeMap<(usize, usize, String), CellSummary> {
  chart
    .iter()
    .map(|(id, cell)| {
      (
        (id.start, id.end, cell.category().to_string()),
        (
          cell.viterbi_score(),
          cell.log_inside_score(),
          cell.num_parses(),
          cell.num_viterbi_parses(),
          cell.num_steps(),
        ),
      )
    })
    .collect()
}

fn assert_same_chart(single: &Chart<Term>, multi: &Chart<Term>) {
  let (single, multi) = (summarize(single), summarize(multi));
  assert_eq!(
    single.keys().collect::<Vec<_>>(),
    multi.keys().collect::<Vec<_>>(),
    "different cells"
  );
  for (key, a) in single.iter() {
    let b = &multi[key];
    assert!((a.0 - b.0).abs() < 1e-9, "{:?}: viterbi {} vs {}", key, a.0, b.0);
    assert!((a.1 - b.1).abs() < 1e-9, "{:?}: inside {} vs {}", key, a.1, b.1);
    assert_eq!((a.2, a.3, a.4), (b.2, b.3, b.4), "{:?}", key);
  }
}

#[test]
fn test_equivalent_charts_by_length() -> Result<(), Err> {
  let model = model()?;
  let (single, multi) = parsers()?;
  for len in 1..=6 {
    let sentence = vec!["x"; len];
    let expected = single.parse(&sentence, &model)?;
    let actual = multi.parse(&sentence, &model)?;
    assert!(expected.is_exact() && actual.is_exact());
    assert_same_chart(expected.chart(), actual.chart());
    assert_eq!(expected.all_derivations().len(), actual.all_derivations().len());
    assert!((expected.log_norm() - actual.log_norm()).abs() < 1e-9);
  }
  Ok(())
}

#[test]
fn test_repeated_runs_agree() -> Result<(), Err> {
  let model = model()?;
  let (single, multi) = parsers()?;
  let sentence = ["x", "y", "x", "x", "y", "x"];
  let expected = single.parse(&sentence, &model)?;
  for _ in 0..10 {
    let actual = multi.parse(&sentence, &model)?;
    assert_same_chart(expected.chart(), actual.chart());
  }
  Ok(())
}

#[test]
fn test_single_token_and_one_thread() -> Result<(), Err> {
  let model = model()?;
  let single = builder().build()?;
  let multi = builder().num_threads(1).build_multi()?;
  for sentence in [vec!["x"], vec!["y", "x"], vec!["x", "y", "y"]] {
    let expected = single.parse(&sentence, &model)?;
    let actual = multi.parse(&sentence, &model)?;
    assert_same_chart(expected.chart(), actual.chart());
  }
  Ok(())
}

#[test]
fn test_multi_respects_beam() -> Result<(), Err> {
  let model = model()?;
  let multi = builder().beam(3).num_threads(4).build_multi()?;
  let sentence = vec!["x"; 7];
  let output = multi.parse(&sentence, &model)?;
  assert!(!output.is_exact());
  for start in 0..sentence.len() {
    for end in start..sentence.len() {
      assert!(output.chart().span(start, end).bounded_len() <= 3);
    }
  }
  Ok(())
}

#[test]
fn test_pruned_charts_agree() -> Result<(), Err> {
  let model = model()?;
  let sentences = [vec!["x"; 6], vec!["x", "y", "x", "x", "y", "x"], vec!["y", "x", "y", "x", "x"]];
  for beam in 1..=4 {
    for pre_chart_pruning in [false, true] {
      let single = builder().beam(beam).pre_chart_pruning(pre_chart_pruning).build()?;
      let multi = builder()
        .beam(beam)
        .pre_chart_pruning(pre_chart_pruning)
        .num_threads(4)
        .build_multi()?;
      let mut pruned = false;
      for sentence in sentences.iter() {
        let expected = single.parse(sentence, &model)?;
        pruned |= !expected.is_exact();
        for _ in 0..5 {
          let actual = multi.parse(sentence, &model)?;
          assert_same_chart(expected.chart(), actual.chart());
          assert_eq!(expected.pruned_spans(), actual.pruned_spans());
        }
      }
      assert!(pruned, "beam {} never pruned", beam);
    }
  }
  Ok(())
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(24))]

  #[test]
  fn prop_pruned_single_and_multi_agree(
    sentence in prop::collection::vec(prop::sample::select(vec!["x", "y"]), 1..7),
    beam in 1usize..4,
    pre_chart_pruning in any::<bool>(),
  ) {
    let model = model().unwrap();
    let single = builder().beam(beam).pre_chart_pruning(pre_chart_pruning).build().unwrap();
    let multi = builder()
      .beam(beam)
      .pre_chart_pruning(pre_chart_pruning)
      .num_threads(3)
      .build_multi()
      .unwrap();
    let expected = single.parse(&sentence, &model).unwrap();
    let actual = multi.parse(&sentence, &model).unwrap();
    assert_same_chart(expected.chart(), actual.chart());
    prop_assert_eq!(expected.is_exact(), actual.is_exact());
  }

  #[test]
  fn prop_single_and_multi_agree(sentence in prop::collection::vec(prop::sample::select(vec!["x", "y"]), 1..6)) {
    let model = model().unwrap();
    let (single, multi) = parsers().unwrap();
    let expected = single.parse(&sentence, &model).unwrap();
    let actual = multi.parse(&sentence, &model).unwrap();
    assert_same_chart(expected.chart(), actual.chart());
  }
}
