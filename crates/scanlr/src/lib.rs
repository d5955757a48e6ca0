//! Automaton construction for scannerless generalised parsing.
//!
//! Grammars are described as a [`RuleSet`](rule_set::RuleSet) and compiled,
//! lazily or eagerly, into a [`ParserStateSet`](automaton::ParserStateSet)
//! whose transitions drive a graph-structured-stack recognizer.

pub mod automaton;
pub mod digraph;
pub mod lookahead;
pub mod rule;
pub mod rule_position;
pub mod rule_set;
pub mod types;
mod util;
