//! What a parse hands back: the finished chart and views of the derivations
//! over the whole sentence.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use indexmap::IndexSet;

use crate::category::{Category, Semantics};
use crate::chart::{Cell, CellId, Chart, Step};
use crate::forest::{self, DerivationTree, ScoredTree};
use crate::lexicon::LexicalEntry;
use crate::model::{FeatureVector, LogFeatureVector};
use crate::rules::RuleName;
use crate::span::Span;

pub struct ParserOutput<M: Semantics> {
  chart: Chart<M>,
  parsing_time: Duration,
}

impl<M: Semantics> ParserOutput<M> {
  pub fn new(chart: Chart<M>, parsing_time: Duration) -> Self {
    Self { chart, parsing_time }
  }

  pub fn chart(&self) -> &Chart<M> {
    &self.chart
  }

  pub fn into_chart(self) -> Chart<M> {
    self.chart
  }

  pub fn parsing_time(&self) -> Duration {
    self.parsing_time
  }

  /// No span was pruned, so the chart holds every derivation
  pub fn is_exact(&self) -> bool {
    self.chart.is_exact()
  }

  pub fn pruned_spans(&self) -> Vec<Span> {
    self.chart.pruned_spans()
  }

  /// Every full parse
  pub fn all_derivations(&self) -> Vec<Derivation<'_, M>> {
    self
      .chart
      .full_parses()
      .into_iter()
      .map(|id| Derivation::new(&self.chart, id))
      .collect()
  }

  pub fn derivations(&self, filter: impl Fn(&Category<M>) -> bool) -> Vec<Derivation<'_, M>> {
    self
      .all_derivations()
      .into_iter()
      .filter(|d| filter(d.category()))
      .collect()
  }

  /// Full parses tied for the highest score
  pub fn best_derivations(&self) -> Vec<Derivation<'_, M>> {
    self.max_derivations(|_| true)
  }

  /// Derivations tied for the highest score among those passing `filter`
  pub fn max_derivations(&self, filter: impl Fn(&Category<M>) -> bool) -> Vec<Derivation<'_, M>> {
    let mut best: Vec<Derivation<'_, M>> = Vec::new();
    for derivation in self.derivations(filter) {
      match best.first().map(Derivation::score) {
        Some(score) if derivation.score() < score => {}
        Some(score) if derivation.score() == score => best.push(derivation),
        _ => best = vec![derivation],
      }
    }
    best
  }

  /// log Z over the full parses
  pub fn log_norm(&self) -> f64 {
    self.log_norm_filtered(|_| true)
  }

  pub fn log_norm_filtered(&self, filter: impl Fn(&Category<M>) -> bool) -> f64 {
    let end = self.chart.sentence_len() - 1;
    self
      .chart
      .log_norm(0, end, |cell: &Cell<M>| cell.is_full_parse() && filter(cell.category()))
  }

  /// Unnormalised log expected features over the full parses
  pub fn log_expected_features(&mut self) -> LogFeatureVector {
    self.chart.log_expected_full_parse_features()
  }

  pub fn log_expected_features_filtered(&mut self, filter: impl Fn(&Category<M>) -> bool) -> LogFeatureVector {
    let full_parses = self
      .chart
      .full_parses()
      .into_iter()
      .map(|id| self.chart.cell(id).category().clone())
      .collect::<HashSet<_>>();
    self
      .chart
      .log_expected_features_filtered(|category| full_parses.contains(category) && filter(category))
  }

  /// Outside pass seeded by an arbitrary scorer over the complete span
  pub fn log_expected_features_scored(&mut self, scorer: impl Fn(&Category<M>) -> f64) -> LogFeatureVector {
    let end = self.chart.sentence_len() - 1;
    self.chart.log_expected_features(0, end, scorer)
  }

  /// Expected feature values under the model's distribution over full parses
  pub fn expected_features(&mut self) -> FeatureVector {
    let log_norm = self.log_norm();
    self.log_expected_features().exp_normalized(log_norm)
  }
}

/// One rule application on a Viterbi tree. Lexical steps get their own span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleUsage {
  pub rule: RuleName,
  pub spans: Vec<Span>,
}

impl fmt::Display for RuleUsage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.rule)?;
    for span in self.spans.iter() {
      write!(f, " {}", span)?;
    }
    Ok(())
  }
}

/// A full parse: a cell over the whole sentence and everything below it
pub struct Derivation<'a, M: Semantics> {
  chart: &'a Chart<M>,
  id: CellId,
  average_max_features: OnceLock<FeatureVector>,
}

impl<'a, M: Semantics> Derivation<'a, M> {
  pub fn new(chart: &'a Chart<M>, id: CellId) -> Self {
    Self {
      chart,
      id,
      average_max_features: OnceLock::new(),
    }
  }

  pub fn id(&self) -> CellId {
    self.id
  }

  pub fn cell(&self) -> &'a Cell<M> {
    self.chart.cell(self.id)
  }

  pub fn category(&self) -> &'a Category<M> {
    self.cell().category()
  }

  pub fn semantics(&self) -> Option<&'a M> {
    self.category().semantics.as_ref()
  }

  /// Viterbi score
  pub fn score(&self) -> f64 {
    self.cell().viterbi_score()
  }

  pub fn log_inside_score(&self) -> f64 {
    self.cell().log_inside_score()
  }

  pub fn num_parses(&self) -> u64 {
    self.cell().num_parses()
  }

  pub fn num_viterbi_parses(&self) -> u64 {
    self.cell().num_viterbi_parses()
  }

  fn walk(&self, viterbi_only: bool, visit: &mut impl FnMut(&'a Step<M>)) {
    let mut visited = HashSet::new();
    self.walk_from(self.id, viterbi_only, &mut visited, visit);
  }

  fn walk_from(
    &self,
    id: CellId,
    viterbi_only: bool,
    visited: &mut HashSet<CellId>,
    visit: &mut impl FnMut(&'a Step<M>),
  ) {
    if !visited.insert(id) {
      return;
    }
    let cell = self.chart.cell(id);
    let steps: Vec<&'a Step<M>> = if viterbi_only {
      cell.viterbi_steps().collect()
    } else {
      cell.steps().collect()
    };
    for step in steps {
      for child in step.children() {
        self.walk_from(*child, viterbi_only, visited, visit);
      }
      visit(step);
    }
  }

  fn lexical_entries(&self, viterbi_only: bool) -> IndexSet<Arc<LexicalEntry<M>>> {
    let mut entries = IndexSet::new();
    self.walk(viterbi_only, &mut |step| {
      if let Some(entry) = step.entry() {
        entries.insert(entry.clone());
      }
    });
    entries
  }

  /// Entries used by any tree under this derivation
  pub fn all_lexical_entries(&self) -> IndexSet<Arc<LexicalEntry<M>>> {
    self.lexical_entries(false)
  }

  /// Entries used by at least one Viterbi tree
  pub fn max_lexical_entries(&self) -> IndexSet<Arc<LexicalEntry<M>>> {
    self.lexical_entries(true)
  }

  pub fn max_rules_used(&self) -> IndexSet<RuleUsage> {
    let mut rules = IndexSet::new();
    self.walk(true, &mut |step| {
      let spans = match step.children() {
        [] => vec![step.span()],
        children => children
          .iter()
          .map(|c| Span::new(c.start, c.end, step.span().sentence_len))
          .collect(),
      };
      rules.insert(RuleUsage {
        rule: step.rule().clone(),
        spans,
      });
    });
    rules
  }

  /// Every step of every cell reachable from this one
  pub fn all_steps(&self) -> Vec<&'a Step<M>> {
    let mut steps = Vec::new();
    self.walk(false, &mut |step| steps.push(step));
    steps
  }

  pub fn max_steps(&self) -> Vec<&'a Step<M>> {
    let mut steps = Vec::new();
    self.walk(true, &mut |step| steps.push(step));
    steps
  }

  /// Features of the Viterbi trees, averaged over the Viterbi steps at every
  /// cell. Computed once.
  pub fn average_max_features(&self) -> &FeatureVector {
    self.average_max_features.get_or_init(|| {
      let mut memo = HashMap::new();
      self.average_max_features_from(self.id, &mut memo)
    })
  }

  fn average_max_features_from(&self, id: CellId, memo: &mut HashMap<CellId, FeatureVector>) -> FeatureVector {
    if let Some(features) = memo.get(&id) {
      return features.clone();
    }
    let mut result = FeatureVector::new();
    let mut num_trees = 0;
    for step in self.chart.cell(id).viterbi_steps() {
      for child in step.children() {
        self
          .average_max_features_from(*child, memo)
          .add_times_into(1.0, &mut result);
      }
      step.features().add_times_into(1.0, &mut result);
      num_trees += 1;
    }
    if num_trees > 1 {
      result.divide_by(num_trees as f64);
    }
    memo.insert(id, result.clone());
    result
  }

  pub fn viterbi_tree(&self) -> Option<DerivationTree<M>> {
    forest::viterbi_tree(self.chart, self.id)
  }

  /// Every tree packed under this derivation, with scores. Exponential.
  pub fn trees(&self) -> Vec<ScoredTree<M>> {
    forest::all_trees(self.chart, self.id)
  }
}

impl<M: Semantics> fmt::Display for Derivation<'_, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.category())
  }
}

impl<M: Semantics> fmt::Debug for Derivation<'_, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Derivation")
      .field("id", &self.id)
      .field("category", self.category())
      .field("score", &self.score())
      .finish()
  }
}
