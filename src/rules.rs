use std::fmt;
use std::sync::Arc;

use crate::category::{Category, Semantics, Slash, Syntax};
use crate::span::Span;

pub const APPLICATION_LABEL: &str = "apply";
pub const COMPOSITION_LABEL: &str = "comp";
pub const LEXICAL_LABEL: &str = "lex";
pub const SKIPPING_LABEL: &str = "skip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
  Forward,
  Backward,
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Forward => write!(f, ">"),
      Self::Backward => write!(f, "<"),
    }
  }
}

/// Identity of a rule. Overloaded names record a binary (or lexical) rule
/// immediately followed by a unary rule, folded into a single chart step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleName {
  label: Arc<str>,
  direction: Option<Direction>,
  order: usize,
  unary: Option<Arc<RuleName>>,
}

impl RuleName {
  pub fn new(label: &str, direction: Option<Direction>, order: usize) -> Self {
    Self {
      label: label.into(),
      direction,
      order,
      unary: None,
    }
  }

  pub fn simple(label: &str) -> Self {
    Self::new(label, None, 0)
  }

  pub fn lexical() -> Self {
    Self::simple(LEXICAL_LABEL)
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn direction(&self) -> Option<Direction> {
    self.direction
  }

  pub fn order(&self) -> usize {
    self.order
  }

  pub fn is_lexical(&self) -> bool {
    self.unary.is_none() && &*self.label == LEXICAL_LABEL
  }

  pub fn is_overloaded(&self) -> bool {
    self.unary.is_some()
  }

  /// The unary rule folded into this name, if any
  pub fn unary(&self) -> Option<&RuleName> {
    self.unary.as_deref()
  }

  /// The name without its unary overload
  pub fn base(&self) -> RuleName {
    Self {
      unary: None,
      ..self.clone()
    }
  }

  /// The rule applied last: the unary overload if there is one
  pub fn outermost(&self) -> &RuleName {
    self.unary().unwrap_or(self)
  }

  /// `self` followed by `unary`. Overloading twice is a bug in the caller.
  pub fn overload(&self, unary: &RuleName) -> RuleName {
    assert!(
      !self.is_overloaded() && !unary.is_overloaded(),
      "can't overload {} with {}",
      self,
      unary
    );
    Self {
      unary: Some(Arc::new(unary.clone())),
      ..self.clone()
    }
  }
}

impl fmt::Display for RuleName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(direction) = self.direction {
      write!(f, "{}", direction)?;
    }
    write!(f, "{}", self.label)?;
    if self.order > 0 {
      write!(f, "{}", self.order)?;
    }
    if let Some(unary) = &self.unary {
      write!(f, "+{}", unary)?;
    }
    Ok(())
  }
}

/// What a rule produced: the category and the name to record on the step
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult<M> {
  pub name: RuleName,
  pub category: Category<M>,
}

pub trait BinaryRule<M: Semantics>: Send + Sync {
  fn name(&self) -> &RuleName;

  /// Combine two adjacent categories. `None` means the combination isn't licensed.
  fn apply(&self, left: &Category<M>, right: &Category<M>, span: Span) -> Option<RuleResult<M>>;
}

pub trait UnaryRule<M: Semantics>: Send + Sync {
  fn name(&self) -> &RuleName;

  fn apply(&self, category: &Category<M>, span: Span) -> Option<RuleResult<M>>;

  /// Whether `apply` could accept this category at all
  fn is_valid_argument(&self, category: &Category<M>, span: Span) -> bool;
}

fn combine_semantics<M: Semantics>(
  a: &Option<M>,
  b: &Option<M>,
  op: impl FnOnce(&M, &M) -> Option<M>,
) -> Option<M> {
  match (a, b) {
    (Some(a), Some(b)) => op(a, b),
    _ => None,
  }
}

/// `X/Y Y => X`
pub struct ForwardApplication {
  name: RuleName,
}

impl ForwardApplication {
  pub fn new() -> Self {
    Self {
      name: RuleName::new(APPLICATION_LABEL, Some(Direction::Forward), 0),
    }
  }
}

impl Default for ForwardApplication {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: Semantics> BinaryRule<M> for ForwardApplication {
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(&self, left: &Category<M>, right: &Category<M>, _span: Span) -> Option<RuleResult<M>> {
    let (result, slash, arg) = left.syntax.as_complex()?;
    if slash != Slash::Forward || *arg != right.syntax {
      return None;
    }
    Some(RuleResult {
      name: self.name.clone(),
      category: Category {
        syntax: result.clone(),
        semantics: combine_semantics(&left.semantics, &right.semantics, |f, a| f.apply(a)),
      },
    })
  }
}

/// `Y X\Y => X`
pub struct BackwardApplication {
  name: RuleName,
}

impl BackwardApplication {
  pub fn new() -> Self {
    Self {
      name: RuleName::new(APPLICATION_LABEL, Some(Direction::Backward), 0),
    }
  }
}

impl Default for BackwardApplication {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: Semantics> BinaryRule<M> for BackwardApplication {
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(&self, left: &Category<M>, right: &Category<M>, _span: Span) -> Option<RuleResult<M>> {
    let (result, slash, arg) = right.syntax.as_complex()?;
    if slash != Slash::Backward || *arg != left.syntax {
      return None;
    }
    Some(RuleResult {
      name: self.name.clone(),
      category: Category {
        syntax: result.clone(),
        semantics: combine_semantics(&right.semantics, &left.semantics, |f, a| f.apply(a)),
      },
    })
  }
}

/// `X/Y Y/Z => X/Z`
pub struct ForwardComposition {
  name: RuleName,
}

impl ForwardComposition {
  pub fn new() -> Self {
    Self {
      name: RuleName::new(COMPOSITION_LABEL, Some(Direction::Forward), 0),
    }
  }
}

impl Default for ForwardComposition {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: Semantics> BinaryRule<M> for ForwardComposition {
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(&self, left: &Category<M>, right: &Category<M>, _span: Span) -> Option<RuleResult<M>> {
    let (x, left_slash, y) = left.syntax.as_complex()?;
    let (y2, right_slash, z) = right.syntax.as_complex()?;
    if left_slash != Slash::Forward || right_slash != Slash::Forward || y != y2 {
      return None;
    }
    Some(RuleResult {
      name: self.name.clone(),
      category: Category {
        syntax: Syntax::forward(x.clone(), z.clone()),
        semantics: combine_semantics(&left.semantics, &right.semantics, |f, g| f.compose(g)),
      },
    })
  }
}

/// `Y\Z X\Y => X\Z`
pub struct BackwardComposition {
  name: RuleName,
}

impl BackwardComposition {
  pub fn new() -> Self {
    Self {
      name: RuleName::new(COMPOSITION_LABEL, Some(Direction::Backward), 0),
    }
  }
}

impl Default for BackwardComposition {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: Semantics> BinaryRule<M> for BackwardComposition {
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(&self, left: &Category<M>, right: &Category<M>, _span: Span) -> Option<RuleResult<M>> {
    let (y, left_slash, z) = left.syntax.as_complex()?;
    let (x, right_slash, y2) = right.syntax.as_complex()?;
    if left_slash != Slash::Backward || right_slash != Slash::Backward || y != y2 {
      return None;
    }
    Some(RuleResult {
      name: self.name.clone(),
      category: Category {
        syntax: Syntax::backward(x.clone(), z.clone()),
        semantics: combine_semantics(&right.semantics, &left.semantics, |f, g| f.compose(g)),
      },
    })
  }
}

/// Rewrites one syntactic type into another, optionally applying a semantic
/// function to the argument (`N => NP`, say).
pub struct TypeShift<M> {
  name: RuleName,
  from: Syntax,
  to: Syntax,
  function: Option<M>,
}

impl<M: Semantics> TypeShift<M> {
  pub fn new(label: &str, from: Syntax, to: Syntax) -> Self {
    Self {
      name: RuleName::simple(label),
      from,
      to,
      function: None,
    }
  }

  /// Apply `function` to the argument's semantics instead of passing them through
  pub fn with_function(mut self, function: M) -> Self {
    self.function = Some(function);
    self
  }
}

impl<M: Semantics> UnaryRule<M> for TypeShift<M> {
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(&self, category: &Category<M>, span: Span) -> Option<RuleResult<M>> {
    if !self.is_valid_argument(category, span) {
      return None;
    }
    let semantics = match &self.function {
      Some(function) => category.semantics.as_ref().and_then(|sem| function.apply(sem)),
      None => category.semantics.clone(),
    };
    Some(RuleResult {
      name: self.name.clone(),
      category: Category {
        syntax: self.to.clone(),
        semantics,
      },
    })
  }

  fn is_valid_argument(&self, category: &Category<M>, _span: Span) -> bool {
    category.syntax == self.from
  }
}

/// Drops an `EMPTY` neighbour. Backward skipping is `EMPTY X => X`, forward
/// skipping is `X EMPTY => X`.
pub struct Skipping {
  name: RuleName,
}

impl Skipping {
  pub fn new(direction: Direction) -> Self {
    Self {
      name: RuleName::new(SKIPPING_LABEL, Some(direction), 0),
    }
  }
}

impl<M: Semantics> BinaryRule<M> for Skipping {
  fn name(&self) -> &RuleName {
    &self.name
  }

  fn apply(&self, left: &Category<M>, right: &Category<M>, _span: Span) -> Option<RuleResult<M>> {
    let empty = Category::empty();
    let kept = match self.name.direction() {
      Some(Direction::Backward) if *left == empty => right,
      Some(Direction::Forward) if *right == empty => left,
      _ => return None,
    };
    Some(RuleResult {
      name: self.name.clone(),
      category: kept.clone(),
    })
  }
}
