//! Instrument configuration file.
//!
//! ```toml
//! [encoder]
//! resolution_mm = 0.005
//! auto_zero = true
//!
//! [probes]
//! default_diameter_mm = 30.0
//!
//! [routing]
//! saw_mode = "automatico"
//! ```
//!
//! Every section and field is optional and falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::encoder::EncoderSettings;
use crate::error::ConfigError;
use crate::models::SawMode;
use crate::probe_pair::DEFAULT_DIAMETER_MM;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Diameter given to both circular probes on first boot.
    pub default_diameter_mm: f32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            default_diameter_mm: DEFAULT_DIAMETER_MM,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Saw mode used until one is persisted.
    pub saw_mode: SawMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub encoder: EncoderSettings,
    pub probes: ProbeSettings,
    pub routing: RoutingSettings,
}

impl MeterConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MeterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.as_ref().display(), "Configuration loaded");
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let encoder = &self.encoder;
        if !(encoder.resolution_mm.is_finite() && encoder.resolution_mm > 0.0) {
            return Err(ConfigError::Invalid {
                field: "encoder.resolution_mm",
                reason: format!("must be positive, got {}", encoder.resolution_mm),
            });
        }
        if encoder.low_limit >= 0 || encoder.high_limit <= 0 {
            return Err(ConfigError::Invalid {
                field: "encoder.limits",
                reason: format!(
                    "limits must straddle zero, got {}..{}",
                    encoder.low_limit, encoder.high_limit
                ),
            });
        }
        if !(encoder.auto_zero_window_mm.is_finite() && encoder.auto_zero_window_mm >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "encoder.auto_zero_window_mm",
                reason: format!("must not be negative, got {}", encoder.auto_zero_window_mm),
            });
        }
        let diameter = self.probes.default_diameter_mm;
        if !(diameter.is_finite() && diameter >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "probes.default_diameter_mm",
                reason: format!("must not be negative, got {diameter}"),
            });
        }
        Ok(())
    }
}
