//! Session configuration.
//!
//! [`ReplayConfig`] is consumed once when a scheduler is built. Every field has a
//! default, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! mtu: 20
//! batch_size: 4
//! loop: false
//! pacing:
//!   mode: timestamp
//!   tick_us: 1000
//!   max_delay_ms: 2000
//!   fallback_ms: 50
//! endpoint:
//!   service_id: 12345678-1234-5678-1234-567812345678
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::Encoding;
use crate::transport::Endpoint;
use crate::types::{FRAGMENT_HEADER_LEN, PacingMode};
use crate::{ReplayError, Result};

/// Largest payload per fragment; a whole fragment must fit a `u16` length prefix.
pub const MAX_MTU: usize = u16::MAX as usize - FRAGMENT_HEADER_LEN;

/// Settings for one replay session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Payload bytes per fragment, excluding the fragment header
    pub mtu: usize,

    /// Readings per packet
    pub batch_size: usize,

    /// Rewind and continue at end of input
    #[serde(rename = "loop")]
    pub loop_playback: bool,

    pub pacing: PacingMode,

    pub encoding: Encoding,

    /// Upper bound on a single fragment send
    pub send_timeout_ms: u64,

    /// Delay between fragments of one packet
    pub fragment_gap_ms: u64,

    /// End the session when the peer disconnects instead of waiting for another
    pub stop_on_disconnect: bool,

    pub endpoint: Endpoint,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            mtu: 180,
            batch_size: 10,
            loop_playback: true,
            pacing: PacingMode::default(),
            encoding: Encoding::default(),
            send_timeout_ms: 1_000,
            fragment_gap_ms: 0,
            stop_on_disconnect: false,
            endpoint: Endpoint::default(),
        }
    }
}

impl ReplayConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cleaned = strip_control_chars(yaml);
        if cleaned.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml_ng::from_str(&cleaned)
            .map_err(|e| ReplayError::config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::file_error(path.to_path_buf(), e))?;
        debug!(path = %path.display(), bytes = text.len(), "Loaded replay configuration");
        Self::from_yaml_str(&text)
    }

    /// Check values that would make the pipeline unusable
    pub fn validate(&self) -> Result<()> {
        if self.mtu == 0 {
            return Err(ReplayError::InvalidMtu { mtu: self.mtu });
        }
        if self.mtu > MAX_MTU {
            return Err(ReplayError::config(format!("mtu {} exceeds maximum {}", self.mtu, MAX_MTU)));
        }
        if self.batch_size == 0 {
            return Err(ReplayError::config("batch_size must be at least 1"));
        }
        if self.send_timeout_ms == 0 {
            return Err(ReplayError::config("send_timeout_ms must be greater than zero"));
        }
        if let PacingMode::Timestamp { tick_us: 0, .. } = self.pacing {
            return Err(ReplayError::config("timestamp pacing needs a non-zero tick_us"));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn fragment_gap(&self) -> Duration {
        Duration::from_millis(self.fragment_gap_ms)
    }
}

// Control characters other than whitespace break the YAML scanner; hand-edited
// files sometimes carry them.
fn strip_control_chars(yaml: &str) -> String {
    yaml.chars()
        .filter(|&ch| !ch.is_control() || matches!(ch, '\n' | '\r' | '\t'))
        .filter(|&ch| ch != '\u{feff}')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = ReplayConfig::default();
        assert_eq!(config.mtu, 180);
        assert_eq!(config.batch_size, 10);
        assert!(config.loop_playback);
        assert_eq!(config.pacing, PacingMode::Fixed { interval_ms: 50 });
        assert_eq!(config.encoding, Encoding::Wire);
        assert_eq!(config.send_timeout(), Duration::from_secs(1));
        assert_eq!(config.fragment_gap(), Duration::ZERO);
        assert!(!config.stop_on_disconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
mtu: 20
loop: false
encoding: cbor
pacing:
  mode: timestamp
  tick_us: 500
  max_delay_ms: 100
  fallback_ms: 10
endpoint:
  device_name: bench-rig
"#;
        let config = ReplayConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.mtu, 20);
        assert!(!config.loop_playback);
        assert_eq!(config.encoding, Encoding::Cbor);
        assert_eq!(config.batch_size, 10);
        assert!(config.pacing.is_realistic());
        assert_eq!(config.endpoint.device_name.as_deref(), Some("bench-rig"));
        assert_eq!(config.endpoint.service_id, Endpoint::default().service_id);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(ReplayConfig::from_yaml_str("\u{feff}\n").unwrap(), ReplayConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ReplayConfig::from_yaml_str("mtu: 0").unwrap_err();
        assert!(matches!(err, ReplayError::InvalidMtu { mtu: 0 }));

        let err = ReplayConfig::from_yaml_str("batch_size: 0").unwrap_err();
        assert!(matches!(err, ReplayError::Config { .. }));

        let err = ReplayConfig::from_yaml_str("send_timeout_ms: 0").unwrap_err();
        assert!(matches!(err, ReplayError::Config { .. }));

        let err = ReplayConfig::from_yaml_str("mtu: [1, 2]").unwrap_err();
        assert!(matches!(err, ReplayError::Config { .. }));

        let config = ReplayConfig { mtu: MAX_MTU + 1, ..ReplayConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size: 3\nfragment_gap_ms: 5").unwrap();

        let config = ReplayConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.fragment_gap(), Duration::from_millis(5));

        let missing = ReplayConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(missing, ReplayError::File { .. }));
    }
}
