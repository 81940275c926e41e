//! Logging initialization.
//!
//! The library only emits `tracing` events; applications that want them on
//! stderr call [`init`] once at startup.

#[cfg(test)]
pub(crate) mod test_capture;

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output with debug level
    Development,
    /// JSON structured output with info level
    Production,
}

static INIT_ONCE: Once = Once::new();

/// Install a global subscriber. `RUST_LOG` overrides the profile's default
/// filter. Later calls are no-ops, as is a call after another subscriber was
/// installed elsewhere.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let _ = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("advance_table=debug")),
                )
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("advance_table=info")),
                )
                .finish()
                .try_init(),
        };
    });
}
