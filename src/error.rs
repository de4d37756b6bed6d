//! Error types for the replay pipeline.
//!
//! Every stage of the pipeline reports failures through [`ReplayError`]. The
//! variants follow the propagation policy of the scheduler: row- and packet-level
//! failures are counted and skipped, connection-level and pipeline-integrity
//! failures end the session.
//!
//! ## Error Categories
//!
//! - **Source Errors**: malformed rows, CSV schema mismatches, unreadable files
//! - **Packet Errors**: encode/decode failures, invalid MTU
//! - **Delivery Errors**: send timeouts, disconnects, unavailable transports
//! - **Receiver Errors**: reassembly timeouts
//! - **Configuration Errors**: invalid session settings
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use imu_replay::ReplayError;
//!
//! let error = ReplayError::transport_unavailable("bluetooth adapter powered off");
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for replay operations.
pub type Result<T, E = ReplayError> = std::result::Result<T, E>;

/// Main error type for replay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReplayError {
    #[error("Malformed row {row}: field '{field}' {details}")]
    MalformedRow { row: usize, field: String, details: String },

    #[error("CSV schema mismatch: missing columns {missing:?} (found {found:?})")]
    SchemaMismatch { missing: Vec<String>, found: Vec<String> },

    #[error("Invalid MTU {mtu}: at least one payload byte per fragment is required")]
    InvalidMtu { mtu: usize },

    #[error("Failed to encode packet {packet_id}: {details}")]
    Encode { packet_id: u32, details: String },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Send of fragment {sequence_index} of packet {packet_id} timed out after {duration:?}")]
    SendTimeout { packet_id: u32, sequence_index: u16, duration: Duration },

    #[error("Reassembly of packet {packet_id} timed out with {received}/{total} fragments")]
    ReassemblyTimeout { packet_id: u32, received: usize, total: u16 },

    #[error("Transport unavailable: {reason}")]
    TransportUnavailable {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Peer disconnected (connection {connection_id})")]
    Disconnected { connection_id: u64 },

    #[error("Input file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {details}")]
    Config { details: String },
}

impl ReplayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplayError::SendTimeout { .. } => true,
            ReplayError::Disconnected { .. } => true,
            ReplayError::ReassemblyTimeout { .. } => true,
            ReplayError::TransportUnavailable { .. } => false,
            ReplayError::MalformedRow { .. } => false,
            ReplayError::SchemaMismatch { .. } => false,
            ReplayError::InvalidMtu { .. } => false,
            ReplayError::Encode { .. } => false,
            ReplayError::Decode { .. } => false,
            ReplayError::File { .. } => false,
            ReplayError::Config { .. } => false,
        }
    }

    /// Returns whether this error ends a replay session.
    ///
    /// Row- and packet-level failures are absorbed by the scheduler; these are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReplayError::SchemaMismatch { .. }
                | ReplayError::InvalidMtu { .. }
                | ReplayError::TransportUnavailable { .. }
                | ReplayError::File { .. }
                | ReplayError::Config { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ReplayError::MalformedRow { .. } => vec![
                "Check the row for empty or non-numeric values",
                "Remove stray text lines from the recording",
            ],
            ReplayError::SchemaMismatch { .. } => vec![
                "Add the missing columns to the CSV header",
                "Check column names for typos or extra whitespace",
                "Use the timestamp,data serial log layout instead",
            ],
            ReplayError::InvalidMtu { .. } => vec![
                "Set the MTU to at least 1 byte",
                "Use the negotiated ATT MTU minus the fragment header",
            ],
            ReplayError::Encode { .. } => vec![
                "Reduce the batch size",
                "Increase the MTU so the packet needs fewer fragments",
            ],
            ReplayError::Decode { .. } => vec![
                "Check that sender and receiver use the same encoding",
                "Verify the receiver MTU matches the sender",
            ],
            ReplayError::SendTimeout { .. } => vec![
                "Increase the send timeout",
                "Check that the peer is still consuming notifications",
                "Increase the pacing interval",
            ],
            ReplayError::ReassemblyTimeout { .. } => vec![
                "Increase the reassembly timeout",
                "Check the link for dropped notifications",
            ],
            ReplayError::TransportUnavailable { .. } => vec![
                "Ensure the radio or listen address is available",
                "Check permissions for the transport backend",
                "Stop other processes holding the adapter or port",
            ],
            ReplayError::Disconnected { .. } => vec![
                "Reconnect the receiver",
                "Check link range and interference",
            ],
            ReplayError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            ReplayError::Config { .. } => vec![
                "Check configuration values against the documented defaults",
                "Verify the YAML syntax of the configuration file",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        ReplayError::File { path, source }
    }

    /// Helper constructor for malformed rows.
    pub fn malformed_row(row: usize, field: impl Into<String>, details: impl Into<String>) -> Self {
        ReplayError::MalformedRow { row, field: field.into(), details: details.into() }
    }

    /// Helper constructor for encode failures.
    pub fn encode_failed(packet_id: u32, details: impl Into<String>) -> Self {
        ReplayError::Encode { packet_id, details: details.into() }
    }

    /// Helper constructor for decode failures.
    pub fn decode_failed(context: impl Into<String>, details: impl Into<String>) -> Self {
        ReplayError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for transport failures.
    pub fn transport_unavailable(reason: impl Into<String>) -> Self {
        ReplayError::TransportUnavailable { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_unavailable_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ReplayError::TransportUnavailable { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        ReplayError::Config { details: details.into() }
    }
}

impl From<std::io::Error> for ReplayError {
    fn from(err: std::io::Error) -> Self {
        ReplayError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            row in 1usize..100_000usize,
            field in "[a-z_]+",
            packet_id in any::<u32>(),
            sequence_index in any::<u16>(),
            mtu in 0usize..10usize,
            details in ".*"
          ) {
            let row_msg = ReplayError::malformed_row(row, field.clone(), details.clone()).to_string();
            prop_assert!(row_msg.contains(&row.to_string()));
            prop_assert!(row_msg.contains(&field));

            let encode_msg = ReplayError::encode_failed(packet_id, details.clone()).to_string();
            prop_assert!(encode_msg.contains(&packet_id.to_string()));
            prop_assert!(encode_msg.contains(&details));

            let timeout_msg = ReplayError::SendTimeout {
              packet_id,
              sequence_index,
              duration: Duration::from_millis(250),
            }.to_string();
            prop_assert!(timeout_msg.contains(&sequence_index.to_string()));

            let mtu_msg = ReplayError::InvalidMtu { mtu }.to_string();
            prop_assert!(mtu_msg.contains(&mtu.to_string()));
          }

          #[test]
          fn io_errors_convert_to_file_errors(reason in ".*") {
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, reason.clone());
            let converted: ReplayError = io_err.into();
            match converted {
              ReplayError::File { source, .. } => {
                prop_assert_eq!(source.to_string(), reason);
              }
              _ => prop_assert!(false, "Expected File error from io::Error conversion"),
            }
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ReplayError>();

        let error = ReplayError::transport_unavailable("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn taxonomy_classification() {
        assert!(ReplayError::transport_unavailable("radio off").is_fatal());
        assert!(ReplayError::InvalidMtu { mtu: 0 }.is_fatal());
        assert!(ReplayError::SchemaMismatch { missing: vec![], found: vec![] }.is_fatal());

        assert!(!ReplayError::malformed_row(3, "aclr_x", "not a number").is_fatal());
        assert!(!ReplayError::encode_failed(7, "too many readings").is_fatal());
        assert!(!ReplayError::Disconnected { connection_id: 1 }.is_fatal());

        let timeout = ReplayError::SendTimeout {
            packet_id: 1,
            sequence_index: 0,
            duration: Duration::from_millis(10),
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_fatal());
    }

    #[test]
    fn recovery_suggestions_are_descriptive() {
        let errors = [
            ReplayError::file_error(
                PathBuf::from("/test.csv"),
                std::io::Error::new(std::io::ErrorKind::NotFound, "test"),
            ),
            ReplayError::config("batch_size must be at least 1"),
            ReplayError::decode_failed("fragment header", "short buffer"),
            ReplayError::ReassemblyTimeout { packet_id: 4, received: 1, total: 3 },
        ];

        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn transport_source_is_chained() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let error = ReplayError::transport_unavailable_with_source("bind failed", Box::new(io_err));
        let source = std::error::Error::source(&error).expect("source should be preserved");
        assert_eq!(source.to_string(), "port taken");
    }
}
