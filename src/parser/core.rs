//! Rule application shared by both parsers. Each job computes its cells from
//! finished spans without holding any lock, then hands the batch to the
//! chart in one call.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::category::{Category, Semantics};
use crate::chart::{Cell, CellId, CellQueue, ChartConfig, ChildScores, PruneOrder, SharedChart, Step};
use crate::error::ParserError;
use crate::lexicon::{CompositeLexicon, Lexicon, LexiconSource, SentenceLexiconGenerator};
use crate::model::Model;
use crate::parser::cky_rules::{CkyBinaryRule, CkyUnaryRule};
use crate::parser::{CategoryFilter, ParseOptions, ParsingOp, PruningFilter};
use crate::rules::RuleName;
use crate::span::Span;

pub(crate) struct CkyCore<M: Semantics> {
  pub beam: usize,
  pub prune_lexical_cells: bool,
  pub break_ties: bool,
  pub pre_chart_pruning: bool,
  pub complete_filter: CategoryFilter<M>,
  pub binary_rules: Vec<CkyBinaryRule<M>>,
  pub unary_rules: Vec<CkyUnaryRule<M>>,
  pub sentence_generators: Vec<Arc<dyn SentenceLexiconGenerator<M>>>,
  pub sloppy_generators: Vec<Arc<dyn SentenceLexiconGenerator<M>>>,
}

/// Everything a job needs to know about the sentence being parsed
pub(crate) struct ParseContext<'a, M: Semantics> {
  pub tokens: Vec<String>,
  pub config: ChartConfig,
  model: &'a dyn Model<M>,
  lexicon: CompositeLexicon<'a, M>,
  pruning_filter: Option<&'a PruningFilter<M>>,
}

impl<M: Semantics> ParseContext<'_, M> {
  pub fn span(&self, start: usize, end: usize) -> Span {
    Span::new(start, end, self.tokens.len())
  }
}

pub(crate) fn owned_tokens(tokens: &[&str]) -> Result<Vec<String>, ParserError> {
  if tokens.is_empty() {
    return Err(ParserError::EmptyInput);
  }
  Ok(tokens.iter().map(|t| t.to_string()).collect())
}

/// Cells a job produced, optionally bounded before they reach the chart
enum Batch<M: Semantics> {
  Unbounded(Vec<Cell<M>>),
  Bounded(CellQueue<M>),
}

impl<M: Semantics> Batch<M> {
  fn push(&mut self, cell: Cell<M>) {
    match self {
      Self::Unbounded(cells) => cells.push(cell),
      Self::Bounded(queue) => {
        queue.offer(cell);
      }
    }
  }

  /// The cells plus whether the batch itself dropped any
  fn finish(self) -> (Vec<Cell<M>>, bool) {
    match self {
      Self::Unbounded(cells) => (cells, false),
      Self::Bounded(queue) => {
        let pruned = queue.is_pruned();
        (queue.into_cells(), pruned)
      }
    }
  }
}

impl<M: Semantics> CkyCore<M> {
  pub fn chart_config(&self, beam: usize) -> ChartConfig {
    ChartConfig {
      beam,
      order: if self.break_ties {
        PruneOrder::InsertionOrder
      } else {
        PruneOrder::OrderInvariant
      },
      separate_lexical: !self.prune_lexical_cells,
    }
  }

  /// Lexicons built from the sentence itself, sloppy ones first
  pub fn generate_lexicons(&self, tokens: &[String], sloppy: bool) -> Vec<Lexicon<M>> {
    let mut lexicons = Vec::new();
    if sloppy {
      lexicons.extend(self.sloppy_generators.iter().map(|g| g.generate(tokens)));
      if lexicons.iter().all(Lexicon::is_empty) {
        warn!("sloppy inference but no sloppy entries created, check the parser's sloppy generators");
      }
    }
    lexicons.extend(self.sentence_generators.iter().map(|g| g.generate(tokens)));
    lexicons
  }

  pub fn context<'a>(
    &self,
    tokens: Vec<String>,
    model: &'a dyn Model<M>,
    generated: &'a [Lexicon<M>],
    options: &ParseOptions<'a, M>,
  ) -> Result<ParseContext<'a, M>, ParserError> {
    let beam = options.beam.unwrap_or(self.beam);
    if beam == 0 {
      return Err(ParserError::InvalidBeam);
    }

    let mut sources: Vec<&'a dyn LexiconSource<M>> = generated.iter().map(|l| l as &dyn LexiconSource<M>).collect();
    sources.push(model.lexicon());
    if let Some(temp) = options.temp_lexicon {
      sources.push(temp);
    }
    debug!(tokens = tokens.len(), beam, lexicons = sources.len(), "parse context");

    Ok(ParseContext {
      tokens,
      config: self.chart_config(beam),
      model,
      lexicon: CompositeLexicon::new(sources),
      pruning_filter: options.pruning_filter,
    })
  }

  fn is_full_parse(&self, span: Span, category: &Category<M>) -> bool {
    span.is_complete() && (self.complete_filter)(category)
  }

  fn batch(&self, ctx: &ParseContext<'_, M>) -> Batch<M> {
    if self.pre_chart_pruning {
      Batch::Bounded(CellQueue::new(
        ctx.config.beam.saturating_mul(2).saturating_add(1),
        PruneOrder::OrderInvariant,
        false,
      ))
    } else {
      Batch::Unbounded(Vec::new())
    }
  }

  /// Categories that can never be part of a parse: no semantics unless
  /// explicitly empty, or vetoed by the caller's filter.
  fn hard_prune(&self, ctx: &ParseContext<'_, M>, op: &ParsingOp<'_, M>) -> bool {
    match &op.category.semantics {
      None if !op.category.syntax.is_empty() => {
        trace!(%op, "pruned: no semantics and not empty");
        true
      }
      None => false,
      Some(_) => match ctx.pruning_filter {
        Some(filter) if !filter(op) => {
          trace!(%op, "pruned by filter");
          true
        }
        _ => false,
      },
    }
  }

  /// Hard pruning plus, over the whole sentence, dropping anything that isn't
  /// a full parse. Before the unary pass such a cell survives if some unary
  /// rule could still turn it into one.
  fn prune(&self, ctx: &ParseContext<'_, M>, op: &ParsingOp<'_, M>, pre_unary: bool) -> bool {
    if self.hard_prune(ctx, op) {
      return true;
    }
    if !op.span.is_complete() || self.is_full_parse(op.span, op.category) {
      return false;
    }
    if pre_unary
      && self
        .unary_rules
        .iter()
        .any(|rule| rule.is_valid_argument(op.category, op.span))
    {
      return false;
    }
    trace!(%op, pre_unary, "pruned: complete span but not a full parse");
    true
  }

  pub fn lexical_job(&self, ctx: &ParseContext<'_, M>, chart: &SharedChart<M>, start: usize, end: usize) {
    let (cells, pruned) = self.generate_lexical_cells(ctx, start, end);
    chart.add_all(start, end, cells, pruned);
  }

  pub fn generate_lexical_cells(&self, ctx: &ParseContext<'_, M>, start: usize, end: usize) -> (Vec<Cell<M>>, bool) {
    let span = ctx.span(start, end);
    let lexical = RuleName::lexical();
    let entries = ctx.lexicon.entries_for(&ctx.tokens[start..=end]);
    let num_entries = entries.len();

    let cells = entries
      .into_iter()
      .filter(|entry| {
        let op = ParsingOp {
          category: &entry.category,
          span,
          rule: &lexical,
        };
        !self.hard_prune(ctx, &op)
      })
      .map(|entry| {
        let full_parse = self.is_full_parse(span, &entry.category);
        Cell::new(Step::lexical(entry, span, full_parse, ctx.model), ChildScores::leaf())
      });

    // With lexical pruning on, a span never gets more lexical cells than the beam
    let (cells, pruned) = if self.prune_lexical_cells {
      let mut queue = CellQueue::new(ctx.config.beam, ctx.config.order, false);
      for cell in cells {
        queue.offer(cell);
      }
      let pruned = queue.is_pruned();
      (queue.into_cells(), pruned)
    } else {
      (cells.collect::<Vec<_>>(), false)
    };
    debug!(%span, num_entries, kept = cells.len(), pruned, "lexical cells");
    (cells, pruned)
  }

  pub fn split_job(&self, ctx: &ParseContext<'_, M>, chart: &SharedChart<M>, start: usize, end: usize, split: usize) {
    let (cells, pruned) = self.process_split(ctx, chart, start, end, split);
    chart.add_all(start, end, cells, pruned);
  }

  /// Combine every left cell with every right cell of split `split` under
  /// every binary rule. Both halves must be finished.
  pub fn process_split(
    &self,
    ctx: &ParseContext<'_, M>,
    chart: &SharedChart<M>,
    start: usize,
    end: usize,
    split: usize,
  ) -> (Vec<Cell<M>>, bool) {
    let span = ctx.span(start, end);
    let (left_span, right_span) = span.split(split);
    let left = chart.read(left_span.start, left_span.end);
    let right = chart.read(right_span.start, right_span.end);
    trace!(%left_span, %right_span, left = left.len(), right = right.len(), "processing split");

    let mut batch = self.batch(ctx);
    let mut generated = 0;
    for (left_key, left_cell) in left.iter() {
      for (right_key, right_cell) in right.iter() {
        for rule in self.binary_rules.iter() {
          let Some(result) = rule.apply(left_cell, right_cell) else {
            continue;
          };
          generated += 1;
          let op = ParsingOp {
            category: &result.category,
            span,
            rule: rule.name(),
          };
          if self.prune(ctx, &op, true) {
            continue;
          }
          let full_parse = self.is_full_parse(span, &result.category);
          let left_id = CellId {
            start: left_span.start,
            end: left_span.end,
            key: left_key,
          };
          let right_id = CellId {
            start: right_span.start,
            end: right_span.end,
            key: right_key,
          };
          let step = Step::binary(result, span, left_id, right_id, full_parse, ctx.model);
          batch.push(Cell::new(step, ChildScores::of([left_cell, right_cell])));
        }
      }
    }
    drop(left);
    drop(right);

    let (cells, pruned) = batch.finish();
    debug!(%span, split, generated, kept = cells.len(), pruned, "processed split");
    (cells, pruned)
  }

  pub fn unary_job(&self, ctx: &ParseContext<'_, M>, chart: &SharedChart<M>, start: usize, end: usize) {
    let (cells, pruned) = self.unary_process_span(ctx, chart, start, end);
    chart.add_all(start, end, cells, pruned);
  }

  /// Apply unary rules to the span's cells once its lexical and binary cells
  /// are in. Every step of the argument cell is overloaded with the unary
  /// step, so the new cells never point at cells of their own span.
  pub fn unary_process_span(
    &self,
    ctx: &ParseContext<'_, M>,
    chart: &SharedChart<M>,
    start: usize,
    end: usize,
  ) -> (Vec<Cell<M>>, bool) {
    let span = ctx.span(start, end);
    let mut batch = self.batch(ctx);
    let mut generated = 0;
    {
      let queue = chart.read(start, end);
      for (_, cell) in queue.iter() {
        for rule in self.unary_rules.iter() {
          let Some(result) = rule.apply(cell) else {
            continue;
          };
          let op = ParsingOp {
            category: &result.category,
            span,
            rule: rule.name(),
          };
          if self.prune(ctx, &op, false) {
            continue;
          }
          let full_parse = self.is_full_parse(span, &result.category);
          // unary steps don't chain
          for (step, children) in cell.steps_with_scores().filter(|(s, _)| !s.rule().is_overloaded()) {
            generated += 1;
            batch.push(Cell::new(step.overload(&result, full_parse, ctx.model), *children));
          }
        }
      }
    }

    let (cells, pruned) = batch.finish();
    debug!(%span, generated, kept = cells.len(), pruned, "unary pass");
    (cells, pruned)
  }
}
