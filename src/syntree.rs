use std::fmt;

use crate::span::Span;

#[derive(Debug, PartialEq, Clone)]
pub struct Constituent<T> {
  pub value: T,
  pub span: Span,
}

impl<T> fmt::Display for Constituent<T>
where
  T: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.span, self.value)
  }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Word<U> {
  pub value: U,
  pub span: Span,
}

impl<U> fmt::Display for Word<U>
where
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.span, self.value)
  }
}

#[derive(Debug, PartialEq, Clone)]
pub enum SynTree<T, U> {
  Branch(Constituent<T>, Vec<SynTree<T, U>>),
  Leaf(Word<U>),
}

impl<T, U> SynTree<T, U> {
  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  pub fn is_branch(&self) -> bool {
    matches!(self, Self::Branch(_, _))
  }

  pub fn span(&self) -> Span {
    match self {
      Self::Branch(c, _) => c.span,
      Self::Leaf(w) => w.span,
    }
  }

  pub fn get_leaf(&self) -> Option<&Word<U>> {
    match self {
      Self::Leaf(w) => Some(w),
      _ => None,
    }
  }

  pub fn get_branch(&self) -> Option<(&Constituent<T>, &Vec<SynTree<T, U>>)> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  pub fn into_branch(self) -> Option<(Constituent<T>, Vec<SynTree<T, U>>)> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  /// Leaves, left to right
  pub fn leaves(&self) -> Vec<&Word<U>> {
    match self {
      Self::Leaf(w) => vec![w],
      Self::Branch(_, children) => children.iter().flat_map(|c| c.leaves()).collect(),
    }
  }

  /// Number of branches on the longest path from the root
  pub fn depth(&self) -> usize {
    match self {
      Self::Leaf(_) => 0,
      Self::Branch(_, children) => 1 + children.iter().map(|c| c.depth()).max().unwrap_or(0),
    }
  }

  pub fn map<V, W>(
    &self,
    map_branch: &impl Fn(&Constituent<T>) -> V,
    map_leaf: &impl Fn(&Word<U>) -> W,
  ) -> SynTree<V, W> {
    match self {
      Self::Branch(t, children) => {
        let children = children
          .iter()
          .map(|c| c.map(map_branch, map_leaf))
          .collect::<Vec<_>>();
        SynTree::Branch(
          Constituent {
            span: t.span,
            value: map_branch(t),
          },
          children,
        )
      }
      Self::Leaf(u) => SynTree::Leaf(Word {
        span: u.span,
        value: map_leaf(u),
      }),
    }
  }
}

impl<T, U> fmt::Display for SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(t) => write!(f, "{}", t),
      Self::Branch(t, ts) => {
        write!(f, "({}", t)?;
        if ts.len() == 1 && ts[0].is_leaf() {
          write!(f, " ({}))", ts[0])
        } else {
          for t in ts.iter() {
            // TODO: is there a nice way to do this that doesn't allocate a String?
            let fmt = format!("{}", t);
            for line in fmt.lines() {
              write!(f, "\n  {}", line)?;
            }
          }
          write!(f, ")")
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn leaf(idx: usize, word: &str) -> SynTree<String, String> {
    SynTree::Leaf(Word {
      value: word.to_string(),
      span: Span::new(idx, idx, 2),
    })
  }

  fn tree() -> SynTree<String, String> {
    let np = SynTree::Branch(
      Constituent {
        value: "NP".to_string(),
        span: Span::new(0, 0, 2),
      },
      vec![leaf(0, "dogs")],
    );
    let vp = SynTree::Branch(
      Constituent {
        value: "S\\NP".to_string(),
        span: Span::new(1, 1, 2),
      },
      vec![leaf(1, "bark")],
    );
    SynTree::Branch(
      Constituent {
        value: "S".to_string(),
        span: Span::new(0, 1, 2),
      },
      vec![np, vp],
    )
  }

  #[test]
  fn test_display() {
    assert_eq!(
      tree().to_string(),
      "(0..1: S\n  (0..0: NP (0..0: dogs))\n  (1..1: S\\NP (1..1: bark)))"
    );
  }

  #[test]
  fn test_walks() {
    let t = tree();
    assert_eq!(t.depth(), 2);
    assert_eq!(
      t.leaves().iter().map(|w| w.value.as_str()).collect::<Vec<_>>(),
      vec!["dogs", "bark"]
    );
    let lengths = t.map(&|c| c.value.len(), &|w| w.value.len());
    assert_eq!(lengths.get_branch().map(|(c, _)| c.value), Some(1));
    assert!(lengths.is_branch());
    assert_eq!(lengths.span(), Span::new(0, 1, 2));
  }
}
