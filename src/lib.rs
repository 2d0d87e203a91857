//! A chart parser for combinatory categorial grammars. Derivations are packed
//! by (span, category) into cells scored with Viterbi and inside scores; an
//! outside pass over the finished chart gives expected feature values for
//! training.
//!
//! ```
//! use ccg_chart::category::Term;
//! use ccg_chart::lexicon::Lexicon;
//! use ccg_chart::model::LinearModel;
//! use ccg_chart::rules::{BackwardApplication, ForwardApplication};
//! use ccg_chart::{Parser, ParserBuilder};
//!
//! let lexicon: Lexicon<Term> = r"
//!   dogs :- NP : dogs
//!   bark :- S\NP : bark
//! "
//! .parse()
//! .unwrap();
//! let model = LinearModel::with_default_features(lexicon);
//! let parser = ParserBuilder::<Term>::new()
//!   .add_binary_rule(ForwardApplication::new())
//!   .add_binary_rule(BackwardApplication::new())
//!   .build()
//!   .unwrap();
//!
//! let output = parser.parse(&["dogs", "bark"], &model).unwrap();
//! let best = output.best_derivations();
//! assert_eq!(best.len(), 1);
//! assert_eq!(best[0].category().to_string(), "S : (bark dogs)");
//! ```

#[macro_use]
extern crate lazy_static;

pub mod category;
pub mod chart;
pub mod error;
pub mod forest;
pub mod lexicon;
pub mod model;
pub mod normal_form;
pub mod output;
pub mod parse_lexicon;
pub mod parser;
pub mod rules;
pub mod span;
pub mod syntree;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use crate::error::ParserError;
pub use crate::output::{Derivation, ParserOutput, RuleUsage};
pub use crate::parser::{CkyParser, MultiCkyParser, ParseOptions, Parser, ParserBuilder, ParsingOp};
pub use crate::utils::Err;
