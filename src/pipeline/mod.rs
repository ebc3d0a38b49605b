//! Pipeline module - round preparation, external steps and evaluation.

mod round;

pub use round::*;
