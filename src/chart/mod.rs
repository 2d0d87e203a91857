//! The packed forest: per-span beams of cells, built concurrently through
//! [`SharedChart`] and read back through [`Chart`].

mod cell;
mod outside;
mod queue;

use std::fmt;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, trace};

pub use crate::chart::cell::{Cell, ChildScores, PruneKey, Step};
pub use crate::chart::queue::{Admission, CellQueue, PruneOrder};
use crate::category::{Category, Semantics};
use crate::model::FeatureVector;
use crate::span::Span;
use crate::utils::log_sum_exp_all;

/// Handle to a cell: its span plus its slot in that span's beam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
  pub start: usize,
  pub end: usize,
  pub key: usize,
}

impl fmt::Display for CellId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}#{}", self.start, self.end, self.key)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartConfig {
  pub beam: usize,
  pub order: PruneOrder,
  /// Keep lexical cells outside the beam so they're never starved out
  pub separate_lexical: bool,
}

/// Index of span start..=end in a triangular layout
fn slot(start: usize, end: usize) -> usize {
  debug_assert!(start <= end);
  end * (end + 1) / 2 + start
}

fn new_queues<M: Semantics, T>(len: usize, config: ChartConfig, wrap: impl Fn(CellQueue<M>) -> T) -> Vec<T> {
  (0..len * (len + 1) / 2)
    .map(|_| wrap(CellQueue::new(config.beam, config.order, config.separate_lexical)))
    .collect()
}

/// A chart under construction. Each span's beam sits behind its own lock, so
/// jobs on different spans never contend and jobs on one span serialise only
/// while they add cells.
pub struct SharedChart<M: Semantics> {
  tokens: Vec<String>,
  config: ChartConfig,
  spans: Vec<RwLock<CellQueue<M>>>,
}

impl<M: Semantics> SharedChart<M> {
  pub fn new(tokens: Vec<String>, config: ChartConfig) -> Self {
    let spans = new_queues(tokens.len(), config, RwLock::new);
    Self {
      tokens,
      config,
      spans,
    }
  }

  pub fn sentence_len(&self) -> usize {
    self.tokens.len()
  }

  pub fn tokens(&self) -> &[String] {
    &self.tokens
  }

  pub fn config(&self) -> ChartConfig {
    self.config
  }

  /// Read access to a finished (or at least quiescent) span
  pub fn read(&self, start: usize, end: usize) -> RwLockReadGuard<'_, CellQueue<M>> {
    self.spans[slot(start, end)].read()
  }

  pub fn add(&self, cell: Cell<M>) -> Admission {
    let span = cell.span();
    self.spans[slot(span.start, span.end)].write().offer(cell)
  }

  /// Offer a batch of cells to one span in a single critical section, marking
  /// it pruned if the batch was already truncated upstream.
  pub fn add_all(&self, start: usize, end: usize, cells: Vec<Cell<M>>, externally_pruned: bool) {
    let mut queue = self.spans[slot(start, end)].write();
    let offered = cells.len();
    let mut rejected = 0;
    for cell in cells {
      debug_assert_eq!((cell.span().start, cell.span().end), (start, end));
      if queue.offer(cell) == Admission::Rejected {
        rejected += 1;
      }
    }
    if externally_pruned {
      queue.mark_pruned();
    }
    trace!(start, end, offered, rejected, size = queue.len(), "added cells");
  }

  pub fn external_pruning(&self, start: usize, end: usize) {
    self.spans[slot(start, end)].write().mark_pruned();
  }

  pub fn into_chart(self) -> Chart<M> {
    Chart {
      tokens: self.tokens,
      config: self.config,
      spans: self
        .spans
        .into_iter()
        .map(|lock| {
          let mut queue = lock.into_inner();
          queue.seal();
          queue
        })
        .collect(),
    }
  }
}

/// A finished chart
pub struct Chart<M: Semantics> {
  tokens: Vec<String>,
  config: ChartConfig,
  spans: Vec<CellQueue<M>>,
}

impl<M: Semantics> Chart<M> {
  pub fn new(tokens: Vec<String>, config: ChartConfig) -> Self {
    let spans = new_queues(tokens.len(), config, |q| q);
    Self {
      tokens,
      config,
      spans,
    }
  }

  pub fn sentence_len(&self) -> usize {
    self.tokens.len()
  }

  pub fn tokens(&self) -> &[String] {
    &self.tokens
  }

  pub fn beam_size(&self) -> usize {
    self.config.beam
  }

  pub fn config(&self) -> ChartConfig {
    self.config
  }

  pub fn add(&mut self, cell: Cell<M>) -> Admission {
    let span = cell.span();
    self.spans[slot(span.start, span.end)].offer(cell)
  }

  pub fn external_pruning(&mut self, start: usize, end: usize) {
    self.spans[slot(start, end)].mark_pruned();
  }

  pub fn span(&self, start: usize, end: usize) -> &CellQueue<M> {
    &self.spans[slot(start, end)]
  }

  pub(crate) fn span_mut(&mut self, start: usize, end: usize) -> &mut CellQueue<M> {
    &mut self.spans[slot(start, end)]
  }

  pub fn span_size(&self, start: usize, end: usize) -> usize {
    self.span(start, end).len()
  }

  /// Cells of one span with their ids
  pub fn cells(&self, start: usize, end: usize) -> impl Iterator<Item = (CellId, &Cell<M>)> {
    self
      .span(start, end)
      .iter()
      .map(move |(key, cell)| (CellId { start, end, key }, cell))
  }

  /// Every cell, shortest spans first
  pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell<M>)> {
    let n = self.sentence_len();
    (0..n).flat_map(move |len| (0..n - len).flat_map(move |begin| self.cells(begin, begin + len)))
  }

  pub fn cell(&self, id: CellId) -> &Cell<M> {
    self
      .span(id.start, id.end)
      .cell(id.key)
      .unwrap_or_else(|| panic!("dangling cell reference {}", id))
  }

  pub fn find(&self, span: Span, category: &Category<M>) -> Option<CellId> {
    self
      .span(span.start, span.end)
      .get(category)
      .map(|(key, _)| CellId {
        start: span.start,
        end: span.end,
        key,
      })
  }

  /// Spans whose candidate set was truncated
  pub fn pruned_spans(&self) -> Vec<Span> {
    let n = self.sentence_len();
    let mut spans = Vec::new();
    for start in 0..n {
      for end in start..n {
        if self.span(start, end).is_pruned() {
          spans.push(Span::new(start, end, n));
        }
      }
    }
    spans
  }

  pub fn is_exact(&self) -> bool {
    self.pruned_spans().is_empty()
  }

  /// Cells over the whole sentence that pass the completeness predicate
  pub fn full_parses(&self) -> Vec<CellId> {
    match self.sentence_len() {
      0 => Vec::new(),
      n => self
        .cells(0, n - 1)
        .filter(|(_, cell)| cell.is_full_parse())
        .map(|(id, _)| id)
        .collect(),
    }
  }

  /// log of the summed inside mass of the span's cells that pass `filter`
  pub fn log_norm(&self, start: usize, end: usize, filter: impl Fn(&Cell<M>) -> bool) -> f64 {
    log_sum_exp_all(
      self
        .cells(start, end)
        .filter(|(_, cell)| filter(cell))
        .map(|(_, cell)| cell.log_inside_score()),
    )
  }

  /// Re-derive every cell's scores from its steps, shortest spans first
  pub fn recompute_scores(&mut self) {
    let n = self.sentence_len();
    for len in 0..n {
      for begin in 0..n - len {
        let end = begin + len;
        let fresh = self
          .cells(begin, end)
          .map(|(id, cell)| {
            let children = cell
              .steps()
              .map(|step| ChildScores::of(step.children().iter().map(|c| self.cell(*c))))
              .collect::<Vec<_>>();
            (id.key, children)
          })
          .collect::<Vec<_>>();
        let queue = self.span_mut(begin, end);
        for (key, children) in fresh {
          if let Some(cell) = queue.cell_mut(key) {
            cell.recompute_scores(children);
          }
        }
      }
    }
    debug!(cells = self.iter().count(), "recomputed chart scores");
  }

  /// Re-score every step's local score from its stored features, then recompute
  pub fn rescore(&mut self, score: impl Fn(&FeatureVector) -> f64) {
    for queue in self.spans.iter_mut() {
      for (_, cell) in queue.iter_mut() {
        cell.rescore_steps(&score);
      }
    }
    self.recompute_scores();
  }
}

impl<M: Semantics> fmt::Display for Chart<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut cells = self.iter().collect::<Vec<_>>();
    cells.sort_by(|(a_id, a), (b_id, b)| b.prune_key().cmp(&a.prune_key()).then(a_id.cmp(b_id)));
    for (_, cell) in cells {
      let span = cell.span();
      writeln!(f, "{} :- {}", self.tokens[span.start..=span.end].join(" "), cell)?;
    }
    let pruned = self.pruned_spans();
    write!(f, "Spans pruned: [")?;
    for (idx, span) in pruned.iter().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", span)?;
    }
    write!(f, "]")
  }
}
