//! CKY parsers over the packed chart. [`ParserBuilder`] configures a rule set
//! and pruning policy once, then [`CkyParser`] fills the chart span by span on
//! the calling thread while [`MultiCkyParser`] spreads the same jobs over a
//! worker pool.

mod cky_rules;
mod core;
mod multi;
mod single;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

pub use crate::parser::multi::MultiCkyParser;
pub use crate::parser::single::CkyParser;
use crate::category::{Category, Semantics};
use crate::error::ParserError;
use crate::lexicon::{LexiconSource, SentenceLexiconGenerator};
use crate::model::Model;
use crate::normal_form::NormalFormValidator;
use crate::output::ParserOutput;
use crate::parser::cky_rules::{CkyBinaryRule, CkyUnaryRule};
use crate::parser::core::CkyCore;
use crate::rules::{BinaryRule, RuleName, UnaryRule};
use crate::span::Span;

/// A candidate a pruning filter gets to veto: the category about to enter the
/// chart, where, and the rule that made it.
#[derive(Debug, Clone, Copy)]
pub struct ParsingOp<'a, M> {
  pub category: &'a Category<M>,
  pub span: Span,
  pub rule: &'a RuleName,
}

impl<M: fmt::Display> fmt::Display for ParsingOp<'_, M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.rule, self.span, self.category)
  }
}

/// Returns false to drop the candidate
pub type PruningFilter<M> = dyn Fn(&ParsingOp<'_, M>) -> bool + Send + Sync;

/// Decides whether a category over the whole sentence is a valid result
pub type CategoryFilter<M> = Arc<dyn Fn(&Category<M>) -> bool + Send + Sync>;

/// Per-call knobs
pub struct ParseOptions<'a, M: Semantics> {
  pub pruning_filter: Option<&'a PruningFilter<M>>,
  /// Extra entries for this call only, consulted after the model's lexicon
  pub temp_lexicon: Option<&'a dyn LexiconSource<M>>,
  /// Overrides the parser's beam size
  pub beam: Option<usize>,
  /// Also use the sloppy lexical generators
  pub sloppy: bool,
}

impl<M: Semantics> Default for ParseOptions<'_, M> {
  fn default() -> Self {
    Self {
      pruning_filter: None,
      temp_lexicon: None,
      beam: None,
      sloppy: false,
    }
  }
}

pub trait Parser<M: Semantics> {
  fn parse_with(
    &self,
    tokens: &[&str],
    model: &dyn Model<M>,
    options: &ParseOptions<'_, M>,
  ) -> Result<ParserOutput<M>, ParserError>;

  fn parse(&self, tokens: &[&str], model: &dyn Model<M>) -> Result<ParserOutput<M>, ParserError> {
    self.parse_with(tokens, model, &ParseOptions::default())
  }
}

pub struct ParserBuilder<M: Semantics> {
  beam: usize,
  prune_lexical_cells: bool,
  break_ties: bool,
  pre_chart_pruning: bool,
  complete_filter: CategoryFilter<M>,
  binary_rules: Vec<Arc<dyn BinaryRule<M>>>,
  unary_rules: Vec<Arc<dyn UnaryRule<M>>>,
  validator: Option<Arc<NormalFormValidator>>,
  sentence_generators: Vec<Arc<dyn SentenceLexiconGenerator<M>>>,
  sloppy_generators: Vec<Arc<dyn SentenceLexiconGenerator<M>>>,
  num_threads: Option<usize>,
  thread_name_prefix: String,
}

impl<M: Semantics> Default for ParserBuilder<M> {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: Semantics> ParserBuilder<M> {
  pub const DEFAULT_BEAM: usize = 50;
  pub const DEFAULT_THREAD_PREFIX: &'static str = "CKY";

  pub fn new() -> Self {
    Self {
      beam: Self::DEFAULT_BEAM,
      prune_lexical_cells: false,
      break_ties: false,
      pre_chart_pruning: false,
      complete_filter: Arc::new(|_| true),
      binary_rules: Vec::new(),
      unary_rules: Vec::new(),
      validator: None,
      sentence_generators: Vec::new(),
      sloppy_generators: Vec::new(),
      num_threads: None,
      thread_name_prefix: Self::DEFAULT_THREAD_PREFIX.to_string(),
    }
  }

  /// Maximum number of cells per span
  pub fn beam(mut self, beam: usize) -> Self {
    self.beam = beam;
    self
  }

  /// Make lexical cells compete for the beam like any other cell, instead of
  /// keeping them all
  pub fn prune_lexical_cells(mut self, prune: bool) -> Self {
    self.prune_lexical_cells = prune;
    self
  }

  /// Evict one cell at a time, breaking ties by arrival order
  pub fn break_ties(mut self, break_ties: bool) -> Self {
    self.break_ties = break_ties;
    self
  }

  /// Bound the cells each split or unary job hands to the chart
  pub fn pre_chart_pruning(mut self, pre_chart_pruning: bool) -> Self {
    self.pre_chart_pruning = pre_chart_pruning;
    self
  }

  pub fn complete_parse_filter(mut self, filter: impl Fn(&Category<M>) -> bool + Send + Sync + 'static) -> Self {
    self.complete_filter = Arc::new(filter);
    self
  }

  pub fn add_binary_rule(mut self, rule: impl BinaryRule<M> + 'static) -> Self {
    self.binary_rules.push(Arc::new(rule));
    self
  }

  pub fn add_unary_rule(mut self, rule: impl UnaryRule<M> + 'static) -> Self {
    self.unary_rules.push(Arc::new(rule));
    self
  }

  /// Checked before every binary and unary rule application
  pub fn normal_form(mut self, validator: NormalFormValidator) -> Self {
    self.validator = Some(Arc::new(validator));
    self
  }

  pub fn add_sentence_generator(mut self, generator: impl SentenceLexiconGenerator<M> + 'static) -> Self {
    self.sentence_generators.push(Arc::new(generator));
    self
  }

  /// Only consulted for sloppy parses
  pub fn add_sloppy_generator(mut self, generator: impl SentenceLexiconGenerator<M> + 'static) -> Self {
    self.sloppy_generators.push(Arc::new(generator));
    self
  }

  /// Worker count for [`MultiCkyParser`]. Defaults to the available parallelism.
  pub fn num_threads(mut self, num_threads: usize) -> Self {
    self.num_threads = Some(num_threads);
    self
  }

  pub fn thread_name_prefix(mut self, prefix: &str) -> Self {
    self.thread_name_prefix = prefix.to_string();
    self
  }

  pub fn build(self) -> Result<CkyParser<M>, ParserError> {
    Ok(CkyParser::new(self.into_core()?))
  }

  pub fn build_multi(self) -> Result<MultiCkyParser<M>, ParserError> {
    let num_threads = match self.num_threads {
      Some(0) => return Err(ParserError::InvalidThreads),
      Some(n) => n,
      None => std::thread::available_parallelism().map_or(1, |n| n.get()),
    };
    let prefix = self.thread_name_prefix.clone();
    let core = self.into_core()?;
    MultiCkyParser::new(core, num_threads, &prefix)
  }

  fn into_core(self) -> Result<CkyCore<M>, ParserError> {
    if self.beam == 0 {
      return Err(ParserError::InvalidBeam);
    }

    let mut seen = HashSet::new();
    let names = self
      .binary_rules
      .iter()
      .map(|r| r.name())
      .chain(self.unary_rules.iter().map(|r| r.name()));
    for name in names {
      if !seen.insert(name.clone()) {
        return Err(ParserError::DuplicateRule(name.to_string()));
      }
    }

    info!(
      beam = self.beam,
      prune_lexical_cells = self.prune_lexical_cells,
      break_ties = self.break_ties,
      pre_chart_pruning = self.pre_chart_pruning,
      binary_rules = %join_names(self.binary_rules.iter().map(|r| r.name())),
      unary_rules = %join_names(self.unary_rules.iter().map(|r| r.name())),
      normal_form = self.validator.as_ref().map_or(0, |v| v.len()),
      "configured parser"
    );
    if self.pre_chart_pruning {
      warn!("pre-chart pruning is on, each job keeps at most 2*beam+1 cells before they reach the chart");
    }

    let binary_rules = self
      .binary_rules
      .into_iter()
      .map(|rule| CkyBinaryRule::new(rule, self.validator.clone()))
      .collect();
    let unary_rules = self
      .unary_rules
      .into_iter()
      .map(|rule| CkyUnaryRule::new(rule, self.validator.clone()))
      .collect();

    Ok(CkyCore {
      beam: self.beam,
      prune_lexical_cells: self.prune_lexical_cells,
      break_ties: self.break_ties,
      pre_chart_pruning: self.pre_chart_pruning,
      complete_filter: self.complete_filter,
      binary_rules,
      unary_rules,
      sentence_generators: self.sentence_generators,
      sloppy_generators: self.sloppy_generators,
    })
  }
}

fn join_names<'a>(names: impl Iterator<Item = &'a RuleName>) -> String {
  names.map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::category::Term;
  use crate::rules::{ForwardApplication, ForwardComposition};

  #[test]
  fn test_builder_validation() {
    let zero_beam = ParserBuilder::<Term>::new().beam(0).build();
    assert!(matches!(zero_beam, Err(ParserError::InvalidBeam)));

    let duplicate = ParserBuilder::<Term>::new()
      .add_binary_rule(ForwardApplication::new())
      .add_binary_rule(ForwardApplication::new())
      .build();
    assert!(matches!(duplicate, Err(ParserError::DuplicateRule(name)) if name == ">apply"));

    let threads = ParserBuilder::<Term>::new().num_threads(0).build_multi();
    assert!(matches!(threads, Err(ParserError::InvalidThreads)));

    assert!(
      ParserBuilder::<Term>::new()
        .add_binary_rule(ForwardApplication::new())
        .add_binary_rule(ForwardComposition::new())
        .build()
        .is_ok()
    );
  }
}
