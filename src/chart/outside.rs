//! Outside scores and expected feature values over a finished chart.

use tracing::debug;

use crate::category::{Category, Semantics};
use crate::chart::{Cell, CellId, Chart};
use crate::model::LogFeatureVector;
use crate::utils::log_sum_exp;

impl<M: Semantics> Chart<M> {
  /// Log expected feature values over the derivations rooted at `start..=end`.
  /// `scorer` gives each root cell its initial log outside score; `-inf`
  /// excludes a cell. Values come back unnormalised: subtract the matching
  /// log norm to get expectations.
  pub fn log_expected_features(
    &mut self,
    start: usize,
    end: usize,
    scorer: impl Fn(&Category<M>) -> f64,
  ) -> LogFeatureVector {
    self.initialize_log_outside(start, end, |cell| scorer(cell.category()));
    self.propagate_log_outside();
    self.collect_log_expected_features()
  }

  /// Expectations over complete-span cells accepted by `filter`
  pub fn log_expected_features_filtered(
    &mut self,
    filter: impl Fn(&Category<M>) -> bool,
  ) -> LogFeatureVector {
    let end = self.sentence_len().saturating_sub(1);
    self.log_expected_features(0, end, |category| {
      if filter(category) { 0.0 } else { f64::NEG_INFINITY }
    })
  }

  /// Expectations over the full parses
  pub fn log_expected_full_parse_features(&mut self) -> LogFeatureVector {
    let end = self.sentence_len().saturating_sub(1);
    self.initialize_log_outside(0, end, |cell| {
      if cell.is_full_parse() { 0.0 } else { f64::NEG_INFINITY }
    });
    self.propagate_log_outside();
    self.collect_log_expected_features()
  }

  fn initialize_log_outside(
    &mut self,
    start: usize,
    end: usize,
    scorer: impl Fn(&Cell<M>) -> f64,
  ) {
    let n = self.sentence_len();
    for s in 0..n {
      for e in s..n {
        for (_, cell) in self.span_mut(s, e).iter_mut() {
          let value = if s == start && e == end {
            scorer(cell)
          } else {
            f64::NEG_INFINITY
          };
          cell.set_log_outside(value);
        }
      }
    }
  }

  /// Push outside mass from long spans to short ones. Children always sit in
  /// strictly shorter spans, so each span is final once longer ones are done.
  fn propagate_log_outside(&mut self) {
    let n = self.sentence_len();
    for len in (0..n).rev() {
      for begin in 0..n - len {
        let updates = self.outside_updates(begin, begin + len);
        self.apply_outside_updates(updates);
      }
    }
  }

  fn outside_updates(&self, start: usize, end: usize) -> Vec<(CellId, f64)> {
    let mut updates = Vec::new();
    for (_, cell) in self.cells(start, end) {
      let outside = cell.log_outside_score();
      if outside == f64::NEG_INFINITY {
        continue;
      }
      for step in cell.steps() {
        let children = step.children();
        for (idx, child) in children.iter().enumerate() {
          let siblings = children
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != idx)
            .map(|(_, sibling)| self.cell(*sibling).log_inside_score())
            .sum::<f64>();
          updates.push((*child, outside + step.local_score() + siblings));
        }
      }
    }
    updates
  }

  fn apply_outside_updates(&mut self, updates: Vec<(CellId, f64)>) {
    for (id, value) in updates {
      if let Some(cell) = self.span_mut(id.start, id.end).cell_mut(id.key) {
        cell.add_log_outside(value);
      }
    }
  }

  fn collect_log_expected_features(&self) -> LogFeatureVector {
    let mut expected = LogFeatureVector::new();
    let mut num_steps = 0;
    let mut log_total = f64::NEG_INFINITY;
    for (_, cell) in self.iter() {
      let outside = cell.log_outside_score();
      if outside == f64::NEG_INFINITY {
        continue;
      }
      for step in cell.steps() {
        let log_weight = outside
          + step.local_score()
          + step
            .children()
            .iter()
            .map(|child| self.cell(*child).log_inside_score())
            .sum::<f64>();
        expected.log_sum_exp_add(log_weight, step.features());
        log_total = log_sum_exp(log_total, log_weight);
        num_steps += 1;
      }
    }
    debug!(num_steps, log_total, features = expected.len(), "collected expected features");
    expected
  }
}
