use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::category::{Category, Semantics};

/// A multi-token lexical item. Equal entries from different sources are kept
/// apart by their `origin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LexicalEntry<M> {
  pub tokens: Vec<String>,
  pub category: Category<M>,
  pub origin: Arc<str>,
}

impl<M> LexicalEntry<M> {
  pub fn new(tokens: &[&str], category: Category<M>, origin: &str) -> Self {
    Self {
      tokens: tokens.iter().map(|t| t.to_string()).collect(),
      category,
      origin: origin.into(),
    }
  }
}

impl<M: fmt::Display> fmt::Display for LexicalEntry<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} :- {} {{{}}}", self.tokens.join(" "), self.category, self.origin)
  }
}

/// Anything that can propose lexical entries for a token sequence
pub trait LexiconSource<M: Semantics>: Send + Sync {
  fn entries_for(&self, tokens: &[String]) -> Vec<Arc<LexicalEntry<M>>>;

  fn size(&self) -> usize;
}

/// A plain table of entries keyed by their tokens
#[derive(Debug, Clone)]
pub struct Lexicon<M: Semantics> {
  entries: IndexMap<Vec<String>, IndexSet<Arc<LexicalEntry<M>>>>,
}

impl<M: Semantics> Default for Lexicon<M> {
  fn default() -> Self {
    Self {
      entries: IndexMap::new(),
    }
  }
}

impl<M: Semantics> Lexicon<M> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns false if the entry was already present
  pub fn add(&mut self, entry: LexicalEntry<M>) -> bool {
    self
      .entries
      .entry(entry.tokens.clone())
      .or_default()
      .insert(Arc::new(entry))
  }

  pub fn len(&self) -> usize {
    self.entries.values().map(IndexSet::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<LexicalEntry<M>>> {
    self.entries.values().flatten()
  }

  /// Longest entry, in tokens
  pub fn max_tokens(&self) -> usize {
    self.entries.keys().map(Vec::len).max().unwrap_or(0)
  }
}

impl<M: Semantics> FromIterator<LexicalEntry<M>> for Lexicon<M> {
  fn from_iter<I: IntoIterator<Item = LexicalEntry<M>>>(iter: I) -> Self {
    let mut lexicon = Self::new();
    for entry in iter {
      lexicon.add(entry);
    }
    lexicon
  }
}

impl<M: Semantics> LexiconSource<M> for Lexicon<M> {
  fn entries_for(&self, tokens: &[String]) -> Vec<Arc<LexicalEntry<M>>> {
    self
      .entries
      .get(tokens)
      .map(|set| set.iter().cloned().collect())
      .unwrap_or_default()
  }

  fn size(&self) -> usize {
    self.len()
  }
}

impl<M: Semantics> fmt::Display for Lexicon<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for entry in self.iter() {
      writeln!(f, "{}", entry)?;
    }
    Ok(())
  }
}

/// Read-only union of several sources. Entries are deduplicated, first source wins the order.
pub struct CompositeLexicon<'a, M: Semantics> {
  sources: Vec<&'a dyn LexiconSource<M>>,
}

impl<'a, M: Semantics> CompositeLexicon<'a, M> {
  pub fn new(sources: Vec<&'a dyn LexiconSource<M>>) -> Self {
    Self { sources }
  }

  pub fn num_sources(&self) -> usize {
    self.sources.len()
  }
}

impl<M: Semantics> LexiconSource<M> for CompositeLexicon<'_, M> {
  fn entries_for(&self, tokens: &[String]) -> Vec<Arc<LexicalEntry<M>>> {
    let mut seen = IndexSet::new();
    for source in self.sources.iter() {
      seen.extend(source.entries_for(tokens));
    }
    seen.into_iter().collect()
  }

  fn size(&self) -> usize {
    self.sources.iter().map(|s| s.size()).sum()
  }
}

/// Builds extra lexical entries from the sentence being parsed
pub trait SentenceLexiconGenerator<M: Semantics>: Send + Sync {
  fn generate(&self, tokens: &[String]) -> Lexicon<M>;
}

/// Lets every token be skipped by giving it the `EMPTY` category. Pair with
/// [`crate::rules::Skipping`] rules.
#[derive(Debug, Clone)]
pub struct SkippingLexiconGenerator {
  origin: Arc<str>,
}

impl SkippingLexiconGenerator {
  pub const ORIGIN: &'static str = "skipping";

  pub fn new() -> Self {
    Self {
      origin: Self::ORIGIN.into(),
    }
  }
}

impl Default for SkippingLexiconGenerator {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: Semantics> SentenceLexiconGenerator<M> for SkippingLexiconGenerator {
  fn generate(&self, tokens: &[String]) -> Lexicon<M> {
    tokens
      .iter()
      .map(|token| LexicalEntry {
        tokens: vec![token.clone()],
        category: Category::empty(),
        origin: self.origin.clone(),
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::category::{Syntax, Term};

  fn entry(tokens: &[&str], syntax: &str, sem: &str, origin: &str) -> LexicalEntry<Term> {
    LexicalEntry::new(
      tokens,
      Category::new(Syntax::atom(syntax), Term::constant(sem)),
      origin,
    )
  }

  fn toks(s: &str) -> Vec<String> {
    s.split(' ').map(String::from).collect()
  }

  #[test]
  fn test_lexicon_lookup() {
    let mut lex = Lexicon::new();
    assert!(lex.add(entry(&["dog"], "N", "dog", "base")));
    assert!(!lex.add(entry(&["dog"], "N", "dog", "base")));
    assert!(lex.add(entry(&["new", "york"], "NP", "ny", "base")));
    assert_eq!(lex.len(), 2);
    assert_eq!(lex.max_tokens(), 2);
    assert_eq!(lex.entries_for(&toks("new york")).len(), 1);
    assert!(lex.entries_for(&toks("york")).is_empty());
  }

  #[test]
  fn test_composite_dedup() {
    let a: Lexicon<Term> = [entry(&["dog"], "N", "dog", "base")].into_iter().collect();
    let b: Lexicon<Term> = [
      entry(&["dog"], "N", "dog", "base"),
      entry(&["dog"], "N", "dog", "aux"),
    ]
    .into_iter()
    .collect();
    let composite = CompositeLexicon::new(vec![&a, &b]);
    let entries = composite.entries_for(&toks("dog"));
    assert_eq!(entries.len(), 2);
    assert_eq!(&*entries[0].origin, "base");
    assert_eq!(&*entries[1].origin, "aux");
  }

  #[test]
  fn test_skipping_generator() {
    let lex: Lexicon<Term> = SkippingLexiconGenerator::new().generate(&toks("a b a"));
    assert_eq!(lex.len(), 2);
    assert!(lex.iter().all(|e| e.category.syntax.is_empty()));
  }
}
