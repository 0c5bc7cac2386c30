#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`SyncConfig`] is plain serde data. Every section defaults independently,
//! so a file only needs the keys it overrides:
//!
//! ```toml
//! suppress_equal_writes = true
//!
//! [plot]
//! whitelist = ["range", "lassoPoints", "x0"]
//!
//! [wire]
//! binary_buffers = false
//!
//! [logging]
//! filter = "syncview=debug"
//! json = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use syncview_core::{Result, SyncError};

/// Default keys kept when filtering nested objects out of plot events.
pub const DEFAULT_PLOT_WHITELIST: [&str; 2] = ["range", "lassoPoints"];

/// Default keys whose value is a list of per-point objects.
pub const DEFAULT_POINT_LIST_KEYS: [&str; 1] = ["points"];

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "syncview=info";

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Skip notification when a write does not change the value.
    pub suppress_equal_writes: bool,
    pub plot: PlotEventConfig,
    pub wire: WireConfig,
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            suppress_equal_writes: true,
            plot: PlotEventConfig::default(),
            wire: WireConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Filtering rules for plot interaction payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotEventConfig {
    /// Nested-object keys that survive filtering.
    pub whitelist: Vec<String>,
    /// Keys holding lists of objects that are filtered element by element.
    pub point_list_keys: Vec<String>,
}

impl Default for PlotEventConfig {
    fn default() -> Self {
        Self {
            whitelist: DEFAULT_PLOT_WHITELIST.into_iter().map(str::to_owned).collect(),
            point_list_keys: DEFAULT_POINT_LIST_KEYS.into_iter().map(str::to_owned).collect(),
        }
    }
}

impl PlotEventConfig {
    #[must_use]
    pub fn is_whitelisted(&self, key: &str) -> bool {
        self.whitelist.iter().any(|k| k == key)
    }

    #[must_use]
    pub fn is_point_list(&self, key: &str) -> bool {
        self.point_list_keys.iter().any(|k| k == key)
    }
}

/// Wire codec options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Move binary payloads into a side buffer table instead of inlining
    /// them as base64.
    pub binary_buffers: bool,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            binary_buffers: true,
        }
    }
}

/// Log output options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_owned(),
            json: false,
        }
    }
}

impl SyncConfig {
    /// Parse TOML.
    ///
    /// # Errors
    ///
    /// [`SyncError::Config`] on malformed input or failed validation.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|err| SyncError::config(format!("invalid TOML: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON.
    ///
    /// # Errors
    ///
    /// [`SyncError::Config`] on malformed input or failed validation.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|err| SyncError::config(format!("invalid JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// [`SyncError::Config`] when the file cannot be read, has another
    /// extension, or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            SyncError::config(format!("failed to read {}: {err}", path.display()))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(SyncError::config(format!(
                "unsupported config extension {other:?} for {}",
                path.display()
            ))),
        }
    }

    /// Reject values that would make the runtime misbehave.
    ///
    /// # Errors
    ///
    /// [`SyncError::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.logging.filter.trim().is_empty() {
            return Err(SyncError::config("logging.filter must not be empty"));
        }
        if let Some(key) = self
            .plot
            .whitelist
            .iter()
            .chain(&self.plot.point_list_keys)
            .find(|k| k.is_empty())
        {
            return Err(SyncError::config(format!(
                "plot keys must not be empty (found {key:?})"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_suppress_equal_writes(mut self, enabled: bool) -> Self {
        self.suppress_equal_writes = enabled;
        self
    }

    #[must_use]
    pub fn with_plot(mut self, plot: PlotEventConfig) -> Self {
        self.plot = plot;
        self
    }

    #[must_use]
    pub fn with_wire(mut self, wire: WireConfig) -> Self {
        self.wire = wire;
        self
    }

    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}
