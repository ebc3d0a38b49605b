//! External module - the opaque preprocess/train/generate toolkit.

mod driver;

pub use driver::*;
