//! Tracing bootstrap for binaries and tests.
//!
//! Respects `RUST_LOG` when set and falls back to `info`. Initialization is
//! idempotent per process; a second call reports [`InitError::AlreadyInitialised`]
//! so embedders that already installed a subscriber can ignore it.

use std::io::{stdout, IsTerminal};
use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing already initialised for this process")]
    AlreadyInitialised,
}

/// Install the process-wide subscriber.
pub fn init_tracing() -> Result<(), InitError> {
    if INITIALISED.set(()).is_err() {
        return Err(InitError::AlreadyInitialised);
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_ansi(stdout().is_terminal());
    Registry::default().with(filter).with(fmt_layer).init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialisation_is_reported() {
        // Whichever call wins, the follow-up must fail cleanly.
        let _ = init_tracing();
        assert!(matches!(
            init_tracing(),
            Err(InitError::AlreadyInitialised)
        ));
    }
}
