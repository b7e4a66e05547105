//! # Observability Setup
//!
//! Structured logging for the whole runtime. Verbosity is controlled via the
//! `RUST_LOG` environment variable; message sends, spawns and exits log at
//! `debug`, lifecycle transitions at `info`.

/// Initializes the global tracing subscriber. Call once at startup.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
