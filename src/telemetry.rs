use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Structured logging, filtered by `RUST_LOG` when set.
/// Example: RUST_LOG=food_ordering=trace orderctl verify
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,food_ordering=debug"));

    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .try_init();
}
