//! Dotenv-style configuration text: `KEY=value` lines with comments, single
//! and double quoting, escape sequences and multi-line double-quoted values.
//!
//! The parser does not validate key names. Screening keys before they reach a
//! process environment is the caller's job.

mod parse;
mod stringify;

pub use parse::{parse, ParseError};
pub use stringify::{stringify, stringify_optional};
