use std::collections::HashMap;

use slab::Slab;
use tracing::trace;

use crate::category::{Category, Semantics};
use crate::chart::cell::{Cell, PruneKey};

/// How a full beam decides what to drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneOrder {
  /// Overflow evicts every cell tied at the minimum and raises a threshold
  /// that later candidates must beat. The kept set doesn't depend on the
  /// order cells arrive in.
  #[default]
  OrderInvariant,
  /// Overflow evicts a single minimum, the latest arrival losing ties.
  /// Reproducible single-threaded, effectively random under concurrency.
  InsertionOrder,
}

/// Outcome of offering a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  Inserted(usize),
  Merged { key: usize, viterbi_changed: bool },
  Rejected,
}

#[derive(Debug)]
struct Entry<M: Semantics> {
  cell: Cell<M>,
  seq: u64,
  /// Lexical cells in a two-queue span are kept outside the bound
  unbounded: bool,
}

/// A bounded, direct-access set of cells keyed by category. Used for every
/// span of the chart and for pre-chart pruning inside jobs.
///
/// In order-invariant mode a cell that is turned away is kept aside and
/// still merges later steps of its category. It comes back once its score
/// beats the threshold, so the kept cells are the ones a beam over the fully
/// merged cells would keep.
#[derive(Debug)]
pub struct CellQueue<M: Semantics> {
  cells: Slab<Entry<M>>,
  index: HashMap<Category<M>, usize>,
  dropped: HashMap<Category<M>, Cell<M>>,
  capacity: usize,
  order: PruneOrder,
  separate_lexical: bool,
  num_bounded: usize,
  threshold: Option<PruneKey>,
  rejected: bool,
  externally_pruned: bool,
  next_seq: u64,
}

impl<M: Semantics> CellQueue<M> {
  pub fn new(capacity: usize, order: PruneOrder, separate_lexical: bool) -> Self {
    assert!(capacity > 0, "cell queue needs a positive capacity");
    Self {
      cells: Slab::new(),
      index: HashMap::new(),
      dropped: HashMap::new(),
      capacity,
      order,
      separate_lexical,
      num_bounded: 0,
      threshold: None,
      rejected: false,
      externally_pruned: false,
      next_seq: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  /// Cells that count against the capacity
  pub fn bounded_len(&self) -> usize {
    self.num_bounded
  }

  pub fn get(&self, category: &Category<M>) -> Option<(usize, &Cell<M>)> {
    let key = *self.index.get(category)?;
    Some((key, &self.cells[key].cell))
  }

  pub fn cell(&self, key: usize) -> Option<&Cell<M>> {
    self.cells.get(key).map(|e| &e.cell)
  }

  pub(crate) fn cell_mut(&mut self, key: usize) -> Option<&mut Cell<M>> {
    self.cells.get_mut(key).map(|e| &mut e.cell)
  }

  pub fn iter(&self) -> impl Iterator<Item = (usize, &Cell<M>)> {
    self.cells.iter().map(|(key, e)| (key, &e.cell))
  }

  pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Cell<M>)> {
    self.cells.iter_mut().map(|(key, e)| (key, &mut e.cell))
  }

  pub fn keys(&self) -> Vec<usize> {
    self.cells.iter().map(|(key, _)| key).collect()
  }

  /// True if a cell is missing because of the beam, or the span was marked.
  /// In order-invariant mode a cell that was evicted and came back doesn't
  /// count.
  pub fn is_pruned(&self) -> bool {
    self.rejected || self.externally_pruned || !self.dropped.is_empty()
  }

  pub fn has_threshold(&self) -> bool {
    self.threshold.is_some()
  }

  pub fn mark_pruned(&mut self) {
    self.externally_pruned = true;
  }

  /// Forget the cells kept aside once nothing more will be offered
  pub fn seal(&mut self) {
    if !self.dropped.is_empty() {
      self.rejected = true;
      self.dropped.clear();
    }
  }

  pub fn into_cells(self) -> Vec<Cell<M>> {
    self.cells.into_iter().map(|(_, e)| e.cell).collect()
  }

  fn bump_seq(&mut self) -> u64 {
    self.next_seq += 1;
    self.next_seq
  }

  /// Merge into the cell with the same category, or admit as a new cell if
  /// the beam allows it.
  pub fn offer(&mut self, cell: Cell<M>) -> Admission {
    if let Some(&key) = self.index.get(cell.category()) {
      return self.merge_existing(key, cell);
    }
    match self.dropped.remove(cell.category()) {
      Some(mut previous) => {
        previous.merge(cell);
        let lexical = self.separate_lexical && previous.has_lexical_step();
        let admission = self.admit(previous);
        if lexical {
          // it no longer competes for the bounded slots
          self.rebalance();
        }
        admission
      }
      None => self.admit(cell),
    }
  }

  fn admit(&mut self, cell: Cell<M>) -> Admission {
    let unbounded = self.separate_lexical && cell.has_lexical_step();
    if unbounded {
      return Admission::Inserted(self.insert(cell, true));
    }

    let score = cell.prune_key();
    if let Some(threshold) = self.threshold
      && score <= threshold
    {
      trace!(span = %cell.span(), category = %cell.category(), "below beam threshold");
      self.turn_away(cell);
      return Admission::Rejected;
    }

    match self.order {
      PruneOrder::OrderInvariant => {
        let key = self.insert(cell, false);
        if self.num_bounded > self.capacity {
          let evicted = self.evict_minimum_ties();
          if evicted.contains(&key) {
            return Admission::Rejected;
          }
        }
        Admission::Inserted(key)
      }
      PruneOrder::InsertionOrder => {
        if self.num_bounded < self.capacity {
          return Admission::Inserted(self.insert(cell, false));
        }
        match self.latest_minimum() {
          Some((min_key, min_score)) if score > min_score => {
            self.remove(min_key);
            self.rejected = true;
            Admission::Inserted(self.insert(cell, false))
          }
          _ => {
            trace!(span = %cell.span(), category = %cell.category(), "beam full");
            self.rejected = true;
            Admission::Rejected
          }
        }
      }
    }
  }

  fn merge_existing(&mut self, key: usize, cell: Cell<M>) -> Admission {
    let separate_lexical = self.separate_lexical;
    let entry = &mut self.cells[key];
    let viterbi_changed = entry.cell.merge(cell);
    let became_lexical = separate_lexical && !entry.unbounded && entry.cell.has_lexical_step();
    if became_lexical {
      entry.unbounded = true;
      self.num_bounded -= 1;
    }
    if viterbi_changed && self.order == PruneOrder::InsertionOrder {
      let seq = self.bump_seq();
      self.cells[key].seq = seq;
    }
    if became_lexical && self.order == PruneOrder::OrderInvariant {
      self.rebalance();
    }
    Admission::Merged {
      key,
      viterbi_changed,
    }
  }

  /// Keep a cell that lost its place, or forget it when ties break by arrival
  fn turn_away(&mut self, cell: Cell<M>) {
    match self.order {
      PruneOrder::OrderInvariant => {
        self.dropped.insert(cell.category().clone(), cell);
      }
      PruneOrder::InsertionOrder => self.rejected = true,
    }
  }

  fn insert(&mut self, cell: Cell<M>, unbounded: bool) -> usize {
    let seq = self.bump_seq();
    let category = cell.category().clone();
    let key = self.cells.insert(Entry {
      cell,
      seq,
      unbounded,
    });
    self.index.insert(category, key);
    if !unbounded {
      self.num_bounded += 1;
    }
    key
  }

  fn remove(&mut self, key: usize) -> Cell<M> {
    let entry = self.cells.remove(key);
    self.index.remove(entry.cell.category());
    if !entry.unbounded {
      self.num_bounded -= 1;
    }
    trace!(span = %entry.cell.span(), category = %entry.cell.category(), "evicted");
    entry.cell
  }

  /// Drop every bounded cell tied at the lowest score and make that score the threshold
  fn evict_minimum_ties(&mut self) -> Vec<usize> {
    let Some(min) = self
      .cells
      .iter()
      .filter(|(_, e)| !e.unbounded)
      .map(|(_, e)| e.cell.prune_key())
      .min()
    else {
      return Vec::new();
    };
    let evicted = self
      .cells
      .iter()
      .filter(|(_, e)| !e.unbounded && e.cell.prune_key() == min)
      .map(|(key, _)| key)
      .collect::<Vec<_>>();
    for key in evicted.iter() {
      let cell = self.remove(*key);
      self.turn_away(cell);
    }
    self.threshold = Some(match self.threshold {
      Some(old) if old > min => old,
      _ => min,
    });
    evicted
  }

  /// Rebuild the bounded part from every bounded candidate seen so far. A
  /// cell joining the lexical part can leave room that an earlier eviction
  /// took away.
  fn rebalance(&mut self) {
    let mut scores = self
      .cells
      .iter()
      .filter(|(_, e)| !e.unbounded)
      .map(|(_, e)| e.cell.prune_key())
      .chain(self.dropped.values().map(Cell::prune_key))
      .collect::<Vec<_>>();
    scores.sort_by(|a, b| b.cmp(a));
    self.threshold = scores.get(self.capacity).copied();

    let Some(threshold) = self.threshold else {
      for (_, cell) in std::mem::take(&mut self.dropped) {
        self.insert(cell, false);
      }
      return;
    };
    let losing = self
      .cells
      .iter()
      .filter(|(_, e)| !e.unbounded && e.cell.prune_key() <= threshold)
      .map(|(key, _)| key)
      .collect::<Vec<_>>();
    for key in losing {
      let cell = self.remove(key);
      self.turn_away(cell);
    }
    let winning = self
      .dropped
      .iter()
      .filter(|(_, cell)| cell.prune_key() > threshold)
      .map(|(category, _)| category.clone())
      .collect::<Vec<_>>();
    for category in winning {
      if let Some(cell) = self.dropped.remove(&category) {
        self.insert(cell, false);
      }
    }
  }

  /// The bounded cell that would go first: lowest score, latest arrival
  fn latest_minimum(&self) -> Option<(usize, PruneKey)> {
    self
      .cells
      .iter()
      .filter(|(_, e)| !e.unbounded)
      .min_by(|(_, a), (_, b)| {
        a.cell
          .prune_key()
          .cmp(&b.cell.prune_key())
          .then(b.seq.cmp(&a.seq))
      })
      .map(|(key, e)| (key, e.cell.prune_key()))
  }
}
