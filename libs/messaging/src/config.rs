//! # Messaging Configuration
//!
//! Tuning for the dispatcher, loaded from TOML or built in code. Every key is
//! optional; missing keys take the defaults below.
//!
//! ```toml
//! [messaging]
//! local_short_circuit = true              # self-sends skip the transport
//! max_payload_size = 16777216             # reject larger payloads on send
//! max_consecutive_receive_failures = 8    # then delivery is fatal
//! log_dropped_frames = true               # warn! on dropped frames
//! ```

use crate::error::{MessagingError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub messaging: MessagingConfig,
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Route messages addressed to the local rank through an in-process
    /// queue instead of the transport
    pub local_short_circuit: bool,

    /// Largest payload `send_to` accepts, unlimited when `None`
    pub max_payload_size: Option<usize>,

    /// Receive errors in a row tolerated before delivery gives up
    pub max_consecutive_receive_failures: u32,

    /// Emit `warn!` for dropped frames; `debug!` when false
    pub log_dropped_frames: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            local_short_circuit: true,
            max_payload_size: None,
            max_consecutive_receive_failures: 8,
            log_dropped_frames: true,
        }
    }
}

impl MessagingConfig {
    /// Load configuration from a TOML file with a `[messaging]` table
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MessagingError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string with a `[messaging]` table
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| MessagingError::config(format!("Failed to parse config: {}", e)))?;

        file.messaging.validate()?;
        Ok(file.messaging)
    }

    /// Configuration where every message, including self-sends, crosses
    /// the transport
    pub fn transport_only() -> Self {
        Self {
            local_short_circuit: false,
            ..Self::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_receive_failures == 0 {
            return Err(MessagingError::config(
                "max_consecutive_receive_failures must be > 0",
            ));
        }

        if self.max_payload_size == Some(0) {
            return Err(MessagingError::config("max_payload_size must be > 0"));
        }

        Ok(())
    }
}
