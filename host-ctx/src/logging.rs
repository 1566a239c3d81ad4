//! Tracing subscriber setup, matching the grounding codebase's
//! `linkd-lib::logging` convention: an `EnvFilter` sourced from `RUST_LOG`,
//! falling back to `debug` if unset.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global `tracing` subscriber. Idempotent: a second call is a
/// no-op (logged at `debug`, not panicked on), so tests that call it
/// repeatedly don't need to guard it themselves.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
