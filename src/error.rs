//! Error types for jsonrpc-router.
//!
//! Protocol-level failures never surface as Rust errors: the router turns
//! them into JSON-RPC error responses (see [`crate::rpc`]). The errors here
//! cover the hosting binary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// A configuration value is out of range.
    #[error("invalid value for `{key}`: {message}")]
    ValidationError {
        /// Dotted path of the offending setting, e.g. `router.max_batch_size`.
        key: &'static str,
        /// Description of the validation failure.
        message: String,
    },
}
