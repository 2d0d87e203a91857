//! Simple recursive-descent parsing of lexicon files. One entry per line:
//!
//! ```text
//! // comment
//! the :- N/N : the
//! new york :- N : ny {gazetteer}
//! , :- EMPTY
//! ```
//!
//! Slashes are left-associative, so `S\NP/NP` is `(S\NP)/NP`. Semantic terms
//! are constants, applications `(f a b)` and compositions `(f . g)`.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::Err;
use crate::category::{Category, Slash, Syntax, Term};
use crate::lexicon::{LexicalEntry, Lexicon};

/// Origin of entries that don't name one
pub const DEFAULT_ORIGIN: &str = "lexicon";

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex at the start of `s`, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => {
      let (_, rest) = s.split_at(m.end());
      (Some(m.as_str()), rest)
    }
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  match optional_re(re, s) {
    (Some(m), rest) if !m.is_empty() => Ok((m, rest)),
    _ => Err(format!("couldn't match {} at {:?}", re, s).into()),
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {:?}", c, s).into())
  }
}

/// Skips spaces and tabs. Entries never span lines.
fn skip_whitespace(s: &str) -> &str {
  s.trim_start_matches([' ', '\t'])
}

fn parse_slash(s: &str) -> Infallible<'_, Option<Slash>> {
  match optional_char('/', s) {
    (Some(_), rest) => (Some(Slash::Forward), rest),
    _ => match optional_char('\\', s) {
      (Some(_), rest) => (Some(Slash::Backward), rest),
      _ => (None, s),
    },
  }
}

/// An atom, `EMPTY`, or a parenthesized category
fn parse_primary(s: &str) -> ParseResult<'_, Syntax> {
  regex_static!(ATOM, r"[a-zA-Z][a-zA-Z0-9_\-\[\]]*");
  if let (Some(_), s) = optional_char('(', s) {
    let (syntax, s) = parse_syntax(skip_whitespace(s))?;
    let (_, s) = needed_char(')', skip_whitespace(s)).map_err(|e| format!("category: {}", e))?;
    return Ok((syntax, s));
  }
  let (name, s) = needed_re(&*ATOM, s).map_err(|e| format!("atom: {}", e))?;
  if name == "EMPTY" {
    Ok((Syntax::Empty, s))
  } else {
    Ok((Syntax::atom(name), s))
  }
}

fn parse_syntax(s: &str) -> ParseResult<'_, Syntax> {
  let (mut syntax, mut rem) = parse_primary(s)?;
  loop {
    let s = skip_whitespace(rem);
    let (slash, s) = parse_slash(s);
    let Some(slash) = slash else {
      return Ok((syntax, rem));
    };
    let (arg, s) = parse_primary(skip_whitespace(s))?;
    syntax = Syntax::complex(syntax, slash, arg);
    rem = s;
  }
}

impl FromStr for Syntax {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (syntax, rest) = parse_syntax(s.trim())?;
    if !rest.is_empty() {
      return Err(format!("trailing input after category: {:?}", rest).into());
    }
    Ok(syntax)
  }
}

/// A constant, `(f a b ...)` applied left to right, or `(f . g)`
fn parse_term(s: &str) -> ParseResult<'_, Term> {
  regex_static!(CONSTANT, r"[^\s(){}.]+");
  let (open, s) = optional_char('(', s);
  if open.is_none() {
    let (name, s) = needed_re(&*CONSTANT, s).map_err(|e| format!("term: {}", e))?;
    return Ok((Term::constant(name), s));
  }

  let (head, s) = parse_term(skip_whitespace(s))?;
  let s = skip_whitespace(s);
  if let (Some(_), s) = optional_char('.', s) {
    let (inner, s) = parse_term(skip_whitespace(s))?;
    let (_, s) = needed_char(')', skip_whitespace(s)).map_err(|e| format!("composition: {}", e))?;
    return Ok((Term::Compose(Arc::new(head), Arc::new(inner)), s));
  }

  let mut term = head;
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char(')', rem) {
      return Ok((term, s));
    }
    if rem.is_empty() {
      return Err("unclosed application".into());
    }
    let (arg, s) = parse_term(rem)?;
    term = Term::App(Arc::new(term), Arc::new(arg));
    rem = s;
  }
}

impl FromStr for Term {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (term, rest) = parse_term(s.trim())?;
    if !rest.is_empty() {
      return Err(format!("trailing input after term: {:?}", rest).into());
    }
    Ok(term)
  }
}

/// Optional `{origin}`
fn parse_origin(s: &str) -> ParseResult<'_, Option<&str>> {
  regex_static!(ORIGIN, r"[^\s{}]+");
  let (open, s) = optional_char('{', s);
  if open.is_none() {
    return Ok((None, s));
  }
  let (name, s) = needed_re(&*ORIGIN, skip_whitespace(s)).map_err(|e| format!("origin: {}", e))?;
  let (_, s) = needed_char('}', skip_whitespace(s))?;
  Ok((Some(name), s))
}

/// `tokens :- syntax [: term] [{origin}]`
fn parse_entry(line: &str) -> Result<LexicalEntry<Term>, Err> {
  let (tokens, rhs) = line
    .split_once(":-")
    .ok_or_else(|| format!("missing ':-' in {:?}", line))?;
  let tokens = tokens.split_whitespace().collect::<Vec<_>>();
  if tokens.is_empty() {
    return Err(format!("no tokens in {:?}", line).into());
  }

  let (syntax, s) = parse_syntax(skip_whitespace(rhs))?;
  let s = skip_whitespace(s);
  let (semantics, s) = match optional_char(':', s) {
    (Some(_), s) => {
      let (term, s) = parse_term(skip_whitespace(s))?;
      (Some(term), s)
    }
    _ => (None, s),
  };
  let (origin, s) = parse_origin(skip_whitespace(s))?;
  let s = skip_whitespace(s);
  if !s.is_empty() {
    return Err(format!("trailing input {:?}", s).into());
  }

  let category = Category { syntax, semantics };
  if !category.is_well_formed() {
    return Err(format!("{} needs semantics", category).into());
  }
  Ok(LexicalEntry::new(&tokens, category, origin.unwrap_or(DEFAULT_ORIGIN)))
}

impl FromStr for Lexicon<Term> {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut lexicon = Lexicon::new();
    for (idx, line) in s.lines().enumerate() {
      let line = match line.find("//") {
        Some(comment) => &line[..comment],
        None => line,
      }
      .trim();
      if line.is_empty() {
        continue;
      }
      let entry = parse_entry(line).map_err(|e| -> Err { format!("line {}: {}", idx + 1, e).into() })?;
      if !lexicon.add(entry) {
        debug!(line = idx + 1, "duplicate lexical entry");
      }
    }
    Ok(lexicon)
  }
}

pub fn read_lexicon(path: impl AsRef<Path>) -> Result<Lexicon<Term>, Err> {
  let path = path.as_ref();
  let lexicon: Lexicon<Term> = fs::read_to_string(path)?.parse()?;
  debug!(path = %path.display(), entries = lexicon.len(), "read lexicon");
  Ok(lexicon)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_syntax() -> Result<(), Err> {
    let tv: Syntax = "(S\\NP)/NP".parse()?;
    assert_eq!(tv.to_string(), "(S\\NP)/NP");
    assert_eq!("S\\NP/NP".parse::<Syntax>()?, tv);
    assert_eq!("S\\(NP/NP)".parse::<Syntax>()?.to_string(), "S\\(NP/NP)");
    assert_eq!("EMPTY".parse::<Syntax>()?, Syntax::Empty);
    assert!("S/".parse::<Syntax>().is_err());
    assert!("(S".parse::<Syntax>().is_err());
    Ok(())
  }

  #[test]
  fn test_parse_term() -> Result<(), Err> {
    let t: Term = "(likes john mary)".parse()?;
    assert_eq!(t.to_string(), "((likes john) mary)");
    let c: Term = "(not . run)".parse()?;
    assert_eq!(c.to_string(), "(not . run)");
    assert!("(f".parse::<Term>().is_err());
    Ok(())
  }

  #[test]
  fn test_parse_lexicon() -> Result<(), Err> {
    let lexicon: Lexicon<Term> = r#"
      // determiners
      the :- N/N : the
      new york :- N : ny {gazetteer}
      , :- EMPTY
      dog :- N : dog // trailing comment
    "#
    .parse()?;
    assert_eq!(lexicon.len(), 4);
    assert_eq!(lexicon.max_tokens(), 2);

    let entries = lexicon.iter().collect::<Vec<_>>();
    assert_eq!(entries[1].tokens, vec!["new", "york"]);
    assert_eq!(&*entries[1].origin, "gazetteer");
    assert_eq!(&*entries[0].origin, DEFAULT_ORIGIN);
    assert_eq!(entries[2].category, Category::empty());
    Ok(())
  }

  #[test]
  fn test_lexicon_errors() {
    let err = "dog :- N".parse::<Lexicon<Term>>().unwrap_err();
    assert!(err.to_string().contains("line 1"));
    assert!(":- N : x".parse::<Lexicon<Term>>().is_err());
    assert!("dog N : dog".parse::<Lexicon<Term>>().is_err());
    assert!("dog :- N : dog extra".parse::<Lexicon<Term>>().is_err());
  }
}
