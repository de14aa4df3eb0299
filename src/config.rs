//! Configuration file
//!
//! ```toml
//! backend = "spi"
//! count = 8
//! brightness = 255
//! power_budget_ma = 0
//!
//! [spi]
//! bus = 0
//! device = 0
//! speed_hz = 6400000
//! color_order = "GRB"
//!
//! [status.listen]
//! effect = "pulse"
//! color = "#00FF00"
//! delay_ms = 20
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ledstrip_driver::SpiConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::control::LedControl;
use crate::controller::ControllerOptions;
use crate::error::LedError;
use crate::mock::MockLedController;
use crate::status::{IndicatorState, StatusEffect, StatusPalette};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which controller implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// WS2812 strip on spidev
    #[default]
    Spi,
    /// Log-only, no hardware
    Mock,
}

/// Strip configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub backend: Backend,
    /// Number of pixels on the strip
    pub count: usize,
    /// Initial global brightness
    pub brightness: u8,
    /// Frame current limit in mA (0 = unlimited)
    pub power_budget_ma: u32,
    pub spi: SpiConfig,
    /// Per-state overrides of the status palette
    pub status: BTreeMap<String, StatusEffect>,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Spi,
            count: 8,
            brightness: 255,
            power_budget_ma: 0,
            spi: SpiConfig::default(),
            status: BTreeMap::new(),
        }
    }
}

impl LedConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ledstrip")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found.
    ///
    /// The result is not validated; callers apply their overrides first
    /// and then call [`LedConfig::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: LedConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::Invalid("count must be at least 1".into()));
        }
        if self.backend == Backend::Spi && self.count > SpiConfig::MAX_PIXELS {
            return Err(ConfigError::Invalid(format!(
                "{} pixels do not fit in one SPI transfer (max {})",
                self.count,
                SpiConfig::MAX_PIXELS
            )));
        }
        self.palette().map(|_| ())
    }

    /// Default palette with the `[status.*]` overrides applied
    pub fn palette(&self) -> Result<StatusPalette, ConfigError> {
        let mut palette = StatusPalette::default();
        for (name, effect) in &self.status {
            let state: IndicatorState = name.parse().map_err(ConfigError::Invalid)?;
            effect
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("status.{name}: {e}")))?;
            palette.set(state, *effect);
        }
        Ok(palette)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            brightness: self.brightness,
            power_budget_ma: self.power_budget_ma,
        }
    }
}

/// Build the controller selected by `config.backend`.
pub async fn build_led_control(config: &LedConfig) -> Result<Arc<dyn LedControl>, LedError> {
    match config.backend {
        Backend::Mock => Ok(Arc::new(MockLedController::new(config.count))),
        Backend::Spi => open_spi(config).await,
    }
}

#[cfg(target_os = "linux")]
async fn open_spi(config: &LedConfig) -> Result<Arc<dyn LedControl>, LedError> {
    let controller = crate::controller::LedController::open_spi(
        config.count,
        &config.spi,
        config.controller_options(),
    )
    .await?;
    Ok(Arc::new(controller))
}

#[cfg(not(target_os = "linux"))]
async fn open_spi(_config: &LedConfig) -> Result<Arc<dyn LedControl>, LedError> {
    Err(LedError::InvalidCommand(
        "the SPI backend is only available on Linux".into(),
    ))
}
