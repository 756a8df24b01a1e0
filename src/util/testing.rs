//! Shared test setup: one tracing subscriber per test binary.
//!
//! Call [`init_test_setup`] at the start of a test; repeated calls are free.
//! `RUST_LOG` overrides the default `bizgraph=debug` filter.

use std::sync::Once;

use tracing_subscriber::{filter::filter_fn, fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Crates whose logging would drown the network output.
const QUIET_TARGETS: [&str; 2] = ["config", "toml"];

pub fn init_test_setup() {
    INIT.call_once(|| {
        let quiet = filter_fn(|metadata| {
            !QUIET_TARGETS
                .iter()
                .any(|name| metadata.target().starts_with(name))
        });
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("bizgraph=debug"));

        let layer = fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_filter(quiet)
            .with_filter(filter);

        // another harness may already own the global dispatcher
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            eprintln!("tracing subscriber already installed, keeping it");
        }
        tracing::debug!("test logging ready");
    });
}
