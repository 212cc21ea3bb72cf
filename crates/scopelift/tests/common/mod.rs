//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use indexmap::IndexMap;
use proptest::test_runner::Config as ProptestConfig;
use scopelift::{Collection, Filter, PrngKey, Scope, Value, Variables, dict};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` output to the test writer. The first call wins.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// A fully mutable root scope holding `collections` and a `params` stream.
pub fn root_scope(collections: &[(&str, &[(&str, f64)])]) -> Scope {
    let variables: Variables = collections
        .iter()
        .map(|(col, entries)| {
            let entries = entries.iter().map(|&(name, v)| (name, Value::scalar(v)));
            (col.to_string(), Collection::Mutable(dict(entries)))
        })
        .collect();
    let rngs = IndexMap::from([
        ("params".to_string(), PrngKey::new(0)),
        ("dropout".to_string(), PrngKey::new(1)),
    ]);
    Scope::new(variables, rngs, Filter::All)
}

pub fn scalar(scope: &Scope, collection: &str, name: &str) -> Option<f64> {
    scope.get_variable(collection, name)?.to_f64().ok()
}

/// Property-test config with `cases` cases and no failure persistence.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    config.failure_persistence = None;
    config
}
