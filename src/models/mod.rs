//! Core data models for inflect-augment.
//!
//! - `config`: explicit path and augmentation configuration
//! - `error`: the error taxonomy shared by every stage
//! - `example`: examples, splits and generation records

mod config;
mod error;
mod example;

pub use config::*;
pub use error::*;
pub use example::*;
