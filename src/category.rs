use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slash {
  /// `X/Y`: looks for its argument on the right
  Forward,
  /// `X\Y`: looks for its argument on the left
  Backward,
}

impl fmt::Display for Slash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Forward => write!(f, "/"),
      Self::Backward => write!(f, "\\"),
    }
  }
}

/// Syntactic type of a category
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Syntax {
  Atom(Arc<str>),
  Complex {
    result: Arc<Syntax>,
    slash: Slash,
    arg: Arc<Syntax>,
  },
  /// The empty type, which is allowed to carry no semantics
  Empty,
}

impl Syntax {
  pub fn atom(name: &str) -> Self {
    Self::Atom(name.into())
  }

  pub fn complex(result: Syntax, slash: Slash, arg: Syntax) -> Self {
    Self::Complex {
      result: Arc::new(result),
      slash,
      arg: Arc::new(arg),
    }
  }

  pub fn forward(result: Syntax, arg: Syntax) -> Self {
    Self::complex(result, Slash::Forward, arg)
  }

  pub fn backward(result: Syntax, arg: Syntax) -> Self {
    Self::complex(result, Slash::Backward, arg)
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Self::Empty)
  }

  pub fn is_complex(&self) -> bool {
    matches!(self, Self::Complex { .. })
  }

  pub fn as_complex(&self) -> Option<(&Syntax, Slash, &Syntax)> {
    match self {
      Self::Complex { result, slash, arg } => Some((&**result, *slash, &**arg)),
      _ => None,
    }
  }

  fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_complex() {
      write!(f, "({})", self)
    } else {
      write!(f, "{}", self)
    }
  }
}

impl fmt::Display for Syntax {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Atom(name) => write!(f, "{}", name),
      Self::Complex { result, slash, arg } => {
        result.fmt_nested(f)?;
        write!(f, "{}", slash)?;
        arg.fmt_nested(f)
      }
      Self::Empty => write!(f, "EMPTY"),
    }
  }
}

/// A semantic representation the chart can pack on. The parser only ever
/// compares and hashes these; rules build new ones through `apply`/`compose`.
pub trait Semantics: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
  /// Function application, `None` if `self` can't take `arg`
  fn apply(&self, arg: &Self) -> Option<Self>;

  /// Function composition `self ∘ inner`
  fn compose(&self, inner: &Self) -> Option<Self>;
}

/// A small uninterpreted term language, enough to tell derivations apart
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
  Const(Arc<str>),
  App(Arc<Term>, Arc<Term>),
  Compose(Arc<Term>, Arc<Term>),
}

impl Term {
  pub fn constant(name: &str) -> Self {
    Self::Const(name.into())
  }
}

impl Semantics for Term {
  fn apply(&self, arg: &Self) -> Option<Self> {
    Some(Self::App(Arc::new(self.clone()), Arc::new(arg.clone())))
  }

  fn compose(&self, inner: &Self) -> Option<Self> {
    Some(Self::Compose(Arc::new(self.clone()), Arc::new(inner.clone())))
  }
}

impl fmt::Display for Term {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Const(name) => write!(f, "{}", name),
      Self::App(fun, arg) => write!(f, "({} {})", fun, arg),
      Self::Compose(outer, inner) => write!(f, "({} . {})", outer, inner),
    }
  }
}

/// A (syntax, semantics) pair, the unit of packing in the chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category<M> {
  pub syntax: Syntax,
  pub semantics: Option<M>,
}

impl<M> Category<M> {
  pub fn new(syntax: Syntax, semantics: M) -> Self {
    Self {
      syntax,
      semantics: Some(semantics),
    }
  }

  /// A category with no semantic representation
  pub fn bare(syntax: Syntax) -> Self {
    Self {
      syntax,
      semantics: None,
    }
  }

  pub fn empty() -> Self {
    Self::bare(Syntax::Empty)
  }

  /// Categories without semantics are only legal when the syntax is `EMPTY`
  pub fn is_well_formed(&self) -> bool {
    self.semantics.is_some() || self.syntax.is_empty()
  }
}

impl<M: fmt::Display> fmt::Display for Category<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.semantics {
      Some(sem) => write!(f, "{} : {}", self.syntax, sem),
      None => write!(f, "{}", self.syntax),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display() {
    let np = Syntax::atom("NP");
    let s = Syntax::atom("S");
    let tv = Syntax::forward(Syntax::backward(s.clone(), np.clone()), np.clone());
    assert_eq!(tv.to_string(), "(S\\NP)/NP");
    assert_eq!(Syntax::backward(s, np).to_string(), "S\\NP");

    let cat = Category::new(Syntax::atom("N"), Term::constant("dog"));
    assert_eq!(cat.to_string(), "N : dog");

    let app = Term::constant("the").apply(&Term::constant("dog")).unwrap();
    assert_eq!(app.to_string(), "(the dog)");
  }

  #[test]
  fn test_well_formed() {
    assert!(Category::<Term>::empty().is_well_formed());
    assert!(!Category::<Term>::bare(Syntax::atom("N")).is_well_formed());
  }

  #[test]
  fn test_structural_equality() {
    let a = Category::new(Syntax::atom("N"), Term::constant("dog"));
    let b = Category::new(Syntax::atom("N"), Term::constant("dog"));
    assert_eq!(a, b);
    assert_ne!(a, Category::new(Syntax::atom("N"), Term::constant("cat")));
  }
}
