//! Generation module - reading the external model's decode output.
//!
//! - `parser`: block-validated reading of the generation log
//! - `accuracy`: exact-match accuracy over the gold ids
//! - `likelihood`: candidate log-likelihood extraction and caching

mod accuracy;
mod likelihood;
mod parser;

pub use accuracy::*;
pub use likelihood::*;
pub use parser::*;

#[cfg(test)]
pub(crate) use parser::tests as test_fixtures;
