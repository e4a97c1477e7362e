//! Error types for vpcup.
//!
//! This module defines the error types used throughout vpcup. Provider
//! failures carry the name of the control-plane operation that failed so the
//! log line and the final error message point at the same call.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vpcup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for vpcup.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Provider Errors
    // ========================================================================
    /// A control-plane call failed.
    #[error("{operation} failed: {message}")]
    Provider {
        /// Operation name, e.g. `CreateVpc`
        operation: String,
        /// Error message reported by the provider
        message: String,
    },

    /// A control-plane call succeeded but its response lacked a required field.
    #[error("{operation} returned no {field}")]
    MissingField {
        /// Operation name
        operation: String,
        /// The missing field
        field: String,
    },

    /// A resource that must exist at this point could not be found.
    #[error("{kind} not found: {detail}")]
    NotFound {
        /// Resource kind
        kind: String,
        /// What was searched for
        detail: String,
    },

    /// The selected backend is not available in this build.
    #[error("Backend '{0}' is not available in this build")]
    BackendUnavailable(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Bootstrap Script Errors
    // ========================================================================
    /// The bootstrap script could not be read.
    #[error("Failed to read bootstrap script '{}': {source}", path.display())]
    BootstrapRead {
        /// Script path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The bootstrap script is unusable as instance user data.
    #[error("Invalid bootstrap script '{}': {message}", path.display())]
    BootstrapInvalid {
        /// Script path
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Creates a new provider error.
    pub fn provider(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new missing field error.
    pub fn missing_field(operation: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            operation: operation.into(),
            field: field.into(),
        }
    }

    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error came from the cloud provider.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Error::Provider { .. } | Error::MissingField { .. } | Error::NotFound { .. }
        )
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Provider { .. } | Error::MissingField { .. } | Error::NotFound { .. } => 2,
            Error::Config(_)
            | Error::InvalidConfig { .. }
            | Error::YamlParse(_)
            | Error::JsonParse(_)
            | Error::TomlParse(_) => 3,
            Error::BootstrapRead { .. } | Error::BootstrapInvalid { .. } => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = Error::provider("CreateVpc", "VpcLimitExceeded");
        assert_eq!(err.to_string(), "CreateVpc failed: VpcLimitExceeded");
        assert!(err.is_provider());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Config("bad".into()).exit_code(), 3);
        assert_eq!(
            Error::BootstrapInvalid {
                path: PathBuf::from("boot.sh"),
                message: "empty".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(Error::BackendUnavailable("aws".into()).exit_code(), 1);
    }
}
