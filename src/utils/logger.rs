//! Tracing subscriber setup for embedders that want the engine's logging.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive scoped to this crate, so the requested level applies to
/// engine logs without changing the embedding application's.
fn engine_directive(level: &str) -> String {
    format!("backup_engine={level}")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// requested level; fails if a subscriber is already installed.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(engine_directive(level)))
        .unwrap_or_else(|_| EnvFilter::new(engine_directive("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
