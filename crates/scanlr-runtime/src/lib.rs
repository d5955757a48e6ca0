//! Recognizer runtime for `scanlr` parser state sets.

pub mod engine;
pub mod scanner;

pub use crate::engine::{AutomatonMode, Config, ParseEngine, ParseError, ParseOutcome};
