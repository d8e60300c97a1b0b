//! Radar configuration
//!
//! Serial settings plus client tuning, stored as JSON:
//!
//! ```json
//! {
//!   "port": { "name": "/dev/ttyUSB0", "baud_rate": 115200 },
//!   "client": { "max_attempts": 10, "target_layout": { "record_len": 9, "payload_offset": 0 } }
//! }
//! ```
//!
//! Every field is optional and falls back to its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::protocol::{ClientConfig, PortConfig, RadarError};

/// Complete configuration of a radar connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Serial port settings
    pub port: PortConfig,
    /// Command client and stream reader tuning
    pub client: ClientConfig,
}

impl RadarConfig {
    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RadarError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| RadarError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content).map_err(|e| match e {
            RadarError::Config(msg) => RadarError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json_str(content: &str) -> Result<Self, RadarError> {
        let config: RadarConfig =
            serde_json::from_str(content).map_err(|e| RadarError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RadarError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| RadarError::Config(e.to_string()))?;
        let path = path.as_ref();
        fs::write(path, content)
            .map_err(|e| RadarError::Config(format!("{}: {}", path.display(), e)))
    }

    // Target layouts are checked while deserializing
    fn validate(&self) -> Result<(), RadarError> {
        if self.port.baud_rate == 0 {
            return Err(RadarError::Config("baud rate must be non-zero".to_string()));
        }
        Ok(())
    }
}
