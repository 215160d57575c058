//! Opt-in tracing subscriber setup for binaries that have no subscriber of
//! their own. The library itself only emits events.

/// Install a formatting subscriber honoring `RUST_LOG`.
///
/// Call once at process start; a second call panics inside
/// `tracing-subscriber`, as with any global default.
pub fn init() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
