#![forbid(unsafe_code)]

//! Logging bootstrap.
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` wins over the
//! configured filter; with the `tracing-json` feature and `json = true` the
//! output is one JSON object per line.
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Malformed filter directive | `SyncError::Config` |
//! | Subscriber already installed | `SyncError::Config` |
//! | `json = true` without `tracing-json` | human-readable output and a warning |

use syncview_core::{Result, SyncError};
use syncview_runtime::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set, `config.filter` otherwise.
///
/// # Errors
///
/// [`SyncError::Config`] for a malformed directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|err| {
            SyncError::config(format!("invalid log filter `{}`: {err}", config.filter))
        }),
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// [`SyncError::Config`] for a malformed filter or when a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    #[cfg(feature = "tracing-json")]
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    #[cfg(not(feature = "tracing-json"))]
    let installed = builder.try_init();

    installed.map_err(|err| SyncError::config(format!("logging already initialized: {err}")))?;

    #[cfg(not(feature = "tracing-json"))]
    if config.json {
        tracing::warn!("JSON log output needs the `tracing-json` feature; using text");
    }
    tracing::debug!(filter = %config.filter, json = config.json, "logging initialized");
    Ok(())
}
