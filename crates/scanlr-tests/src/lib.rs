//! Shared fixtures for the `scanlr` integration tests and benchmarks.

pub mod grammars;

use scanlr::rule_set::{RuleSet, RuleSetDef, RuleSetError};
use std::sync::Arc;

/// Define a rule set from a catalogue entry.
///
/// # Panics
/// Panics if the definition is rejected.
pub fn rule_set<F>(f: F) -> Arc<RuleSet>
where
    F: FnOnce(&mut RuleSetDef) -> Result<(), RuleSetError>,
{
    match RuleSet::define(f) {
        Ok(rule_set) => Arc::new(rule_set),
        Err(err) => panic!("invalid grammar: {}", err),
    }
}

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
