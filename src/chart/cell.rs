use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::category::{Category, Semantics};
use crate::chart::CellId;
use crate::lexicon::LexicalEntry;
use crate::model::{FeatureVector, Model, StepView};
use crate::rules::{RuleName, RuleResult};
use crate::span::Span;
use crate::utils::log_sum_exp;

/// One way of building a cell: a lexical insertion, or a rule applied to
/// child cells. A unary rule is folded into the step it applies to, so a step
/// never has a child in its own span.
#[derive(Debug, Clone)]
pub struct Step<M> {
  rule: RuleName,
  span: Span,
  root: Category<M>,
  intermediate: Option<Category<M>>,
  entry: Option<Arc<LexicalEntry<M>>>,
  children: SmallVec<[CellId; 2]>,
  full_parse: bool,
  features: FeatureVector,
  local_score: f64,
}

impl<M: Semantics> Step<M> {
  pub fn lexical(
    entry: Arc<LexicalEntry<M>>,
    span: Span,
    full_parse: bool,
    model: &dyn Model<M>,
  ) -> Self {
    Self {
      rule: RuleName::lexical(),
      span,
      root: entry.category.clone(),
      intermediate: None,
      entry: Some(entry),
      children: SmallVec::new(),
      full_parse,
      features: FeatureVector::new(),
      local_score: 0.0,
    }
    .scored(model)
  }

  pub fn binary(
    result: RuleResult<M>,
    span: Span,
    left: CellId,
    right: CellId,
    full_parse: bool,
    model: &dyn Model<M>,
  ) -> Self {
    let mut children = SmallVec::new();
    children.push(left);
    children.push(right);
    Self {
      rule: result.name,
      span,
      root: result.category,
      intermediate: None,
      entry: None,
      children,
      full_parse,
      features: FeatureVector::new(),
      local_score: 0.0,
    }
    .scored(model)
  }

  /// This step followed by a unary rule. Keeps the children and the lexical
  /// entry, and remembers the category the unary rule consumed.
  pub fn overload(&self, unary: &RuleResult<M>, full_parse: bool, model: &dyn Model<M>) -> Self {
    Self {
      rule: self.rule.overload(&unary.name),
      span: self.span,
      root: unary.category.clone(),
      intermediate: Some(self.root.clone()),
      entry: self.entry.clone(),
      children: self.children.clone(),
      full_parse,
      features: FeatureVector::new(),
      local_score: 0.0,
    }
    .scored(model)
  }

  fn scored(mut self, model: &dyn Model<M>) -> Self {
    let (features, score) = model.features_and_score(&self.view());
    self.features = features;
    self.local_score = score;
    self
  }

  pub fn view(&self) -> StepView<'_, M> {
    StepView {
      rule: &self.rule,
      span: self.span,
      category: &self.root,
      entry: self.entry.as_deref(),
    }
  }

  pub fn rule(&self) -> &RuleName {
    &self.rule
  }

  pub fn span(&self) -> Span {
    self.span
  }

  pub fn root(&self) -> &Category<M> {
    &self.root
  }

  /// Category between the binary (or lexical) rule and the unary rule of an overloaded step
  pub fn intermediate(&self) -> Option<&Category<M>> {
    self.intermediate.as_ref()
  }

  pub fn entry(&self) -> Option<&Arc<LexicalEntry<M>>> {
    self.entry.as_ref()
  }

  pub fn children(&self) -> &[CellId] {
    &self.children
  }

  pub fn is_lexical(&self) -> bool {
    self.entry.is_some()
  }

  pub fn is_full_parse(&self) -> bool {
    self.full_parse
  }

  pub fn features(&self) -> &FeatureVector {
    &self.features
  }

  pub fn local_score(&self) -> f64 {
    self.local_score
  }

  pub(crate) fn set_local_score(&mut self, score: f64) {
    self.local_score = score;
  }
}

// Features and score are a function of the rest, so they stay out of identity.
impl<M: Semantics> PartialEq for Step<M> {
  fn eq(&self, other: &Self) -> bool {
    self.rule == other.rule
      && self.span == other.span
      && self.children == other.children
      && self.root == other.root
      && self.intermediate == other.intermediate
      && self.entry == other.entry
  }
}

impl<M: Semantics> Eq for Step<M> {}

impl<M: Semantics> Hash for Step<M> {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.rule.hash(state);
    self.span.hash(state);
    self.children.hash(state);
    self.root.hash(state);
    self.intermediate.hash(state);
    self.entry.hash(state);
  }
}

impl<M: Semantics> fmt::Display for Step<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}[", self.rule)?;
    if let Some(entry) = &self.entry {
      write!(f, "{}", entry)?;
    } else {
      for (idx, child) in self.children.iter().enumerate() {
        if idx > 0 {
          write!(f, ", ")?;
        }
        write!(f, "{}", child)?;
      }
    }
    write!(f, "] : {:.3}", self.local_score)
  }
}

/// Aggregate scores of a step's children, taken when the step is added.
/// Children always live in shorter, already finished spans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildScores {
  pub viterbi: f64,
  pub log_inside: f64,
  pub num_parses: u64,
  pub num_viterbi_parses: u64,
}

impl ChildScores {
  /// No children: the identity for combining
  pub fn leaf() -> Self {
    Self {
      viterbi: 0.0,
      log_inside: 0.0,
      num_parses: 1,
      num_viterbi_parses: 1,
    }
  }

  pub fn of<'a, M: Semantics + 'a>(cells: impl IntoIterator<Item = &'a Cell<M>>) -> Self {
    cells.into_iter().fold(Self::leaf(), |acc, cell| Self {
      viterbi: acc.viterbi + cell.viterbi,
      log_inside: acc.log_inside + cell.log_inside,
      num_parses: acc.num_parses.saturating_mul(cell.num_parses),
      num_viterbi_parses: acc.num_viterbi_parses.saturating_mul(cell.num_viterbi_parses),
    })
  }
}

/// Score a beam orders cells by: Viterbi first, log-inside to break ties
#[derive(Debug, Clone, Copy)]
pub struct PruneKey {
  pub primary: f64,
  pub secondary: f64,
}

impl Ord for PruneKey {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .primary
      .total_cmp(&other.primary)
      .then(self.secondary.total_cmp(&other.secondary))
  }
}

impl PartialOrd for PruneKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for PruneKey {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for PruneKey {}

/// All steps that build the same category over the same span, packed together.
#[derive(Debug, Clone)]
pub struct Cell<M: Semantics> {
  category: Category<M>,
  span: Span,
  full_parse: bool,
  steps: IndexMap<Step<M>, ChildScores>,
  viterbi: f64,
  log_inside: f64,
  num_parses: u64,
  num_viterbi_parses: u64,
  num_viterbi_steps: usize,
  viterbi_steps: OnceLock<Vec<usize>>,
  rule_names: OnceLock<Vec<RuleName>>,
  log_outside: f64,
}

impl<M: Semantics> Cell<M> {
  pub fn new(step: Step<M>, children: ChildScores) -> Self {
    let mut cell = Self {
      category: step.root.clone(),
      span: step.span,
      full_parse: step.full_parse,
      steps: IndexMap::new(),
      viterbi: f64::NEG_INFINITY,
      log_inside: f64::NEG_INFINITY,
      num_parses: 0,
      num_viterbi_parses: 0,
      num_viterbi_steps: 0,
      viterbi_steps: OnceLock::new(),
      rule_names: OnceLock::new(),
      log_outside: f64::NEG_INFINITY,
    };
    cell.update_scores(step.local_score, children);
    cell.steps.insert(step, children);
    cell.sum_log_inside();
    cell
  }

  pub fn category(&self) -> &Category<M> {
    &self.category
  }

  pub fn span(&self) -> Span {
    self.span
  }

  pub fn is_full_parse(&self) -> bool {
    self.full_parse
  }

  pub fn viterbi_score(&self) -> f64 {
    self.viterbi
  }

  pub fn log_inside_score(&self) -> f64 {
    self.log_inside
  }

  /// Only meaningful after the chart's outside pass
  pub fn log_outside_score(&self) -> f64 {
    self.log_outside
  }

  pub fn num_parses(&self) -> u64 {
    self.num_parses
  }

  pub fn num_viterbi_parses(&self) -> u64 {
    self.num_viterbi_parses
  }

  pub fn num_steps(&self) -> usize {
    self.steps.len()
  }

  pub fn steps(&self) -> impl Iterator<Item = &Step<M>> {
    self.steps.keys()
  }

  pub fn steps_with_scores(&self) -> impl Iterator<Item = (&Step<M>, &ChildScores)> {
    self.steps.iter()
  }

  pub fn contains_step(&self, step: &Step<M>) -> bool {
    self.steps.contains_key(step)
  }

  pub fn has_lexical_step(&self) -> bool {
    self.steps().any(Step::is_lexical)
  }

  pub fn prune_key(&self) -> PruneKey {
    PruneKey {
      primary: self.viterbi,
      secondary: self.log_inside,
    }
  }

  /// Steps that reach the Viterbi score, in insertion order
  pub fn viterbi_steps(&self) -> impl Iterator<Item = &Step<M>> {
    let indices = self.viterbi_steps.get_or_init(|| {
      let indices = self
        .steps
        .iter()
        .enumerate()
        .filter(|(_, (step, children))| step.local_score + children.viterbi == self.viterbi)
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
      debug_assert_eq!(indices.len(), self.num_viterbi_steps);
      indices
    });
    indices
      .iter()
      .filter_map(|idx| self.steps.get_index(*idx).map(|(step, _)| step))
  }

  /// Distinct names of the rules that generated this cell
  pub fn rule_names(&self) -> &[RuleName] {
    self.rule_names.get_or_init(|| {
      let mut names = self.steps().map(|s| s.rule.clone()).collect::<Vec<_>>();
      names.sort();
      names.dedup();
      names
    })
  }

  /// Add the steps of `other`, which must share this cell's signature.
  /// Returns true if any added step reaches the (possibly new) Viterbi score.
  pub fn merge(&mut self, other: Cell<M>) -> bool {
    assert!(
      other.span == self.span && other.category == self.category,
      "merging cell {} {} into {} {}",
      other.span,
      other.category,
      self.span,
      self.category
    );
    let mut viterbi_changed = false;
    let mut added = false;
    for (step, children) in other.steps {
      if self.steps.contains_key(&step) {
        trace!(span = %self.span, %step, "step already packed");
        continue;
      }
      viterbi_changed |= self.update_scores(step.local_score, children);
      self.steps.insert(step, children);
      added = true;
    }
    if added {
      self.sum_log_inside();
      self.viterbi_steps = OnceLock::new();
      self.rule_names = OnceLock::new();
    }
    viterbi_changed
  }

  /// Sums step contributions smallest first, so the log-inside score of a
  /// step set is the same whatever order its steps were merged in.
  fn sum_log_inside(&mut self) {
    let mut terms = self
      .steps
      .iter()
      .map(|(step, children)| step.local_score + children.log_inside)
      .collect::<Vec<_>>();
    terms.sort_by(f64::total_cmp);
    self.log_inside = terms.into_iter().fold(f64::NEG_INFINITY, log_sum_exp);
  }

  fn update_scores(&mut self, local_score: f64, children: ChildScores) -> bool {
    let step_viterbi = local_score + children.viterbi;
    self.num_parses = self.num_parses.saturating_add(children.num_parses);

    if step_viterbi == self.viterbi {
      self.num_viterbi_parses = self.num_viterbi_parses.saturating_add(children.num_viterbi_parses);
      self.num_viterbi_steps += 1;
      true
    } else if step_viterbi > self.viterbi {
      self.viterbi = step_viterbi;
      self.num_viterbi_parses = children.num_viterbi_parses;
      self.num_viterbi_steps = 1;
      true
    } else {
      false
    }
  }

  /// Rebuild every score from the step set, given fresh child scores per step
  /// (in step order).
  pub(crate) fn recompute_scores(&mut self, children: Vec<ChildScores>) {
    assert_eq!(children.len(), self.steps.len());
    self.viterbi = f64::NEG_INFINITY;
    self.log_inside = f64::NEG_INFINITY;
    self.num_parses = 0;
    self.num_viterbi_parses = 0;
    self.num_viterbi_steps = 0;
    self.viterbi_steps = OnceLock::new();
    self.rule_names = OnceLock::new();
    for (idx, scores) in children.into_iter().enumerate() {
      let Some((step, stored)) = self.steps.get_index_mut(idx) else {
        continue;
      };
      *stored = scores;
      let local = step.local_score;
      self.update_scores(local, scores);
    }
    self.sum_log_inside();
  }

  /// Re-score each step's local contribution from its features
  pub(crate) fn rescore_steps(&mut self, score: &impl Fn(&FeatureVector) -> f64) {
    let steps = std::mem::take(&mut self.steps);
    self.steps = steps
      .into_iter()
      .map(|(mut step, children)| {
        step.set_local_score(score(&step.features));
        (step, children)
      })
      .collect();
  }

  pub(crate) fn set_log_outside(&mut self, value: f64) {
    self.log_outside = value;
  }

  pub(crate) fn add_log_outside(&mut self, value: f64) {
    self.log_outside = log_sum_exp(self.log_outside, value);
  }
}

impl<M: Semantics> fmt::Display for Cell<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "[{} : {} : viterbi={:.3} : inside={:.3} : parses={} : viterbiParses={} : ",
      self.span, self.category, self.viterbi, self.log_inside, self.num_parses, self.num_viterbi_parses
    )?;
    for (idx, step) in self.viterbi_steps().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", step)?;
    }
    write!(f, "]")
  }
}
