//! Configuration module for lumagraph
//!
//! The engine configuration is a TOML file with three sections:
//!
//! ```toml
//! [graph]
//! evaluate_globally = false
//! warn_on_cycles = true
//!
//! [runtime]
//! tick_rate_hz = 60.0
//! max_ticks = 600
//!
//! [logging]
//! filter = "info,lumagraph_rs=debug"
//! log_file = "/tmp/lumagraph.log"
//! ```
//!
//! Every field has a default, so a partial file (or none) is fine.
//!
//! # Config Location
//!
//! The default file lives in the platform config directory:
//! - **Linux**: `~/.config/dev.lumagraph.lumagraph-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.lumagraph.lumagraph-rs/config.toml`
//! - **Windows**: `%APPDATA%\dev.lumagraph.lumagraph-rs\config.toml`

use crate::error::{LumaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.lumagraph.lumagraph-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default tick rate in Hz
pub const DEFAULT_TICK_RATE_HZ: f64 = 60.0;

/// Default log filter when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,lumagraph_rs=debug";

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Graph Config ====================

/// Options a [`Graph`](crate::graph::Graph) is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Sort all layers together, following edges between layers
    pub evaluate_globally: bool,

    /// Log connections the evaluation order cannot respect
    pub warn_on_cycles: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            evaluate_globally: false,
            warn_on_cycles: true,
        }
    }
}

// ==================== Runtime Config ====================

/// Settings for driving a graph from the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Evaluation passes per second
    pub tick_rate_hz: f64,

    /// Stop after this many ticks (run forever if unset)
    pub max_ticks: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            max_ticks: None,
        }
    }
}

// ==================== Logging Config ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is not set
    pub filter: String,

    /// Also write logs to this file
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}

// ==================== Engine Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub graph: GraphConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LumaError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            LumaError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default location when `None`, falling back to
    /// defaults if the file is missing or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Self::default(),
            },
        };

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LumaError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| LumaError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| LumaError::Config(format!("Failed to write config: {}", e)))
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        let rate = self.runtime.tick_rate_hz;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(LumaError::Config(format!(
                "tick_rate_hz must be positive, got {}",
                rate
            )));
        }
        Ok(())
    }
}
