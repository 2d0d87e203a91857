use std::fmt;

/// A contiguous run of tokens, `start..=end`, inside a sentence of `sentence_len` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
  pub start: usize,
  pub end: usize,
  pub sentence_len: usize,
}

impl Span {
  pub fn new(start: usize, end: usize, sentence_len: usize) -> Self {
    assert!(
      start <= end && end < sentence_len,
      "invalid span {}..{} in sentence of length {}",
      start,
      end,
      sentence_len
    );
    Self {
      start,
      end,
      sentence_len,
    }
  }

  /// Number of tokens covered
  pub fn len(&self) -> usize {
    self.end - self.start + 1
  }

  /// Covers the whole sentence
  pub fn is_complete(&self) -> bool {
    self.start == 0 && self.end + 1 == self.sentence_len
  }

  pub fn is_single_token(&self) -> bool {
    self.start == self.end
  }

  /// Number of binary split points inside this span
  pub fn num_splits(&self) -> usize {
    self.end - self.start
  }

  /// The two halves of split `k`: `start..=start+k` and `start+k+1..=end`
  pub fn split(&self, k: usize) -> (Span, Span) {
    assert!(k < self.num_splits(), "split {} out of range for {}", k, self);
    (
      Span::new(self.start, self.start + k, self.sentence_len),
      Span::new(self.start + k + 1, self.end, self.sentence_len),
    )
  }

  /// Whether `right` begins directly after this span ends
  pub fn is_adjacent_to(&self, right: &Span) -> bool {
    self.end + 1 == right.start
  }

  /// The smallest span covering both
  pub fn join(&self, right: &Span) -> Span {
    Span::new(self.start, right.end, self.sentence_len)
  }
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}", self.start, self.end)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_splits() {
    let span = Span::new(1, 3, 5);
    assert_eq!(span.len(), 3);
    assert_eq!(span.num_splits(), 2);
    assert_eq!(span.split(0), (Span::new(1, 1, 5), Span::new(2, 3, 5)));
    assert_eq!(span.split(1), (Span::new(1, 2, 5), Span::new(3, 3, 5)));
    assert!(!span.is_complete());
    assert!(Span::new(0, 4, 5).is_complete());
  }

  #[test]
  #[should_panic]
  fn test_out_of_bounds() {
    Span::new(2, 3, 3);
  }
}
