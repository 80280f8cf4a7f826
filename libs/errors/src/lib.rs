//! Unified error handling for the ADS client services
//!
//! This crate provides the shared error type, category taxonomy and the
//! retryability classification that the retry layer keys on. Services keep
//! their own domain-specific error types and gain the common interface by
//! implementing [`AdsErrorTrait`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// AdsError - Shared error type
// ============================================================================

/// Shared error type for the ADS client stack
#[derive(Debug, Error)]
pub enum AdsError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid AMS net id '{net_id}': {reason}")]
    InvalidAddress { net_id: String, reason: String },

    // ======================================
    // Protocol & Communication Errors
    // ======================================
    #[error("Protocol error: {protocol}: {message}")]
    Protocol { protocol: String, message: String },

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    // ======================================
    // Variable Access Errors
    // ======================================
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Write verification failed for '{name}': wrote {written}, read back {read_back}")]
    VerificationMismatch {
        name: String,
        written: String,
        read_back: String,
    },

    // ======================================
    // Validation & System Errors
    // ======================================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the shared error
pub type AdsResult<T> = std::result::Result<T, AdsError>;

impl AdsError {
    /// Whether the error is a transient device failure eligible for retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::DeviceBusy(_)
                | Self::ConnectionFailed { .. }
                | Self::Communication(_)
                | Self::VerificationMismatch { .. }
        )
    }

    /// Get error category (for classification/metrics)
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::MissingConfig(_)
            | Self::InvalidAddress { .. } => ErrorCategory::Configuration,

            Self::Protocol { .. } => ErrorCategory::Protocol,

            Self::Communication(_) | Self::ConnectionFailed { .. } | Self::DeviceBusy(_) => {
                ErrorCategory::Connection
            },

            Self::Timeout(_) => ErrorCategory::Timeout,

            Self::SymbolNotFound(_) => ErrorCategory::NotFound,

            Self::VerificationMismatch { .. } => ErrorCategory::Verification,

            Self::Validation(_) => ErrorCategory::Validation,

            Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for AdsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AdsError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::num::ParseIntError> for AdsError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::Validation(format!("Invalid integer: {}", err))
    }
}

// ============================================================================
// Error category and capability trait
// ============================================================================

/// Error category enum - used for classification and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Timeout,

    // Protocol/communication layer
    Protocol,
    Connection,
    Verification,

    // Business logic layer
    Validation,
    NotFound,

    // System level
    Internal,
    Unknown,
}

/// Error capability trait for service-specific error types
///
/// Each service keeps its own domain error type and gains a common interface
/// by implementing this trait. Retryability defaults are category-based; the
/// retry executor only re-issues operations whose error reports retryable.
pub trait AdsErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and monitoring)
    fn error_code(&self) -> &'static str;

    /// Get error category (for classification/metrics)
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Timeout | ErrorCategory::Verification
        )
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal => Level::ERROR,
            ErrorCategory::Connection
            | ErrorCategory::Timeout
            | ErrorCategory::Protocol
            | ErrorCategory::Verification => Level::WARN,
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            _ => Level::WARN,
        }
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::AdsError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::AdsError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::AdsError::Validation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::AdsError::Validation(format!($fmt, $($arg)*))
    };
}
