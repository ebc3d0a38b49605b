//! Corpus module - gold data in, tokenized model datasets out.

mod loader;
pub mod tokenize;
mod writer;

pub use loader::*;
pub use writer::*;
