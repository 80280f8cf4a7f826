//! Error handling for the ADS client service
//!
//! Service-level error type with constructor helpers and conversions into the
//! shared `errors` crate taxonomy. Retry eligibility is decided here: only
//! transient device failures (and write-verification mismatches) report
//! retryable; unknown symbols and configuration problems never do.

use errors::{AdsError, AdsErrorTrait, ErrorCategory};
use thiserror::Error;

/// ADS client service error type
#[derive(Error, Debug, Clone)]
pub enum AdsClientError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// AMS net id validation errors
    #[error("Invalid AMS net id: {0}")]
    AddressError(String),

    /// Connection establishment and link lifecycle errors
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Protocol communication errors from the device-link provider
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Operation timeout errors
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Device momentarily busy or unreachable
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Variable name rejected by the device
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Write-then-read-back comparison failed
    #[error("Verification failed: {0}")]
    VerificationError(String),

    /// Data handling errors (type mismatch, transform output)
    #[error("Data error: {0}")]
    DataError(String),

    /// Retry budget exhausted for an operation
    #[error("Operation failed after {attempts} attempts: {context}")]
    RetryExhausted { context: String, attempts: u32 },

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the ADS client service
pub type Result<T> = std::result::Result<T, AdsClientError>;

impl AdsClientError {
    pub fn config(msg: impl Into<String>) -> Self {
        AdsClientError::ConfigError(msg.into())
    }

    pub fn address(msg: impl Into<String>) -> Self {
        AdsClientError::AddressError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        AdsClientError::ConnectionError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        AdsClientError::ProtocolError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        AdsClientError::TimeoutError(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        AdsClientError::DeviceBusy(msg.into())
    }

    pub fn symbol_not_found(name: impl std::fmt::Display) -> Self {
        AdsClientError::SymbolNotFound(name.to_string())
    }

    pub fn verification(msg: impl Into<String>) -> Self {
        AdsClientError::VerificationError(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        AdsClientError::DataError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AdsClientError::InternalError(msg.into())
    }

    /// Whether this failure belongs to the transient class the retry
    /// executor may re-issue
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::TimeoutError(_)
                | Self::DeviceBusy(_)
                | Self::VerificationError(_)
        )
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for AdsClientError {
    fn from(err: std::io::Error) -> Self {
        AdsClientError::ConnectionError(err.to_string())
    }
}

impl From<serde_yaml::Error> for AdsClientError {
    fn from(err: serde_yaml::Error) -> Self {
        AdsClientError::DataError(format!("YAML: {err}"))
    }
}

impl From<serde_json::Error> for AdsClientError {
    fn from(err: serde_json::Error) -> Self {
        AdsClientError::DataError(format!("JSON: {err}"))
    }
}

impl From<figment::Error> for AdsClientError {
    fn from(err: figment::Error) -> Self {
        AdsClientError::ConfigError(err.to_string())
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn connection_error(self, msg: &str) -> Result<T>;
    fn protocol_error(self, msg: &str) -> Result<T>;
    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| AdsClientError::ConfigError(format!("{msg}: {e}")))
    }

    fn connection_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| AdsClientError::ConnectionError(format!("{msg}: {e}")))
    }

    fn protocol_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| AdsClientError::ProtocolError(format!("{msg}: {e}")))
    }

    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| AdsClientError::InternalError(format!("{msg}: {e}")))
    }
}

// ============================================================================
// Conversion to the shared AdsError for cross-service boundaries
// ============================================================================

impl From<AdsClientError> for AdsError {
    fn from(err: AdsClientError) -> Self {
        match err {
            AdsClientError::ConfigError(msg) => AdsError::Configuration(msg),
            AdsClientError::AddressError(msg) => AdsError::InvalidAddress {
                net_id: String::new(),
                reason: msg,
            },
            AdsClientError::ConnectionError(msg) => AdsError::Communication(msg),
            AdsClientError::ProtocolError(msg) => AdsError::Protocol {
                protocol: "ads".to_string(),
                message: msg,
            },
            AdsClientError::TimeoutError(msg) => AdsError::Timeout(msg),
            AdsClientError::DeviceBusy(msg) => AdsError::DeviceBusy(msg),
            AdsClientError::SymbolNotFound(name) => AdsError::SymbolNotFound(name),
            AdsClientError::VerificationError(msg) => AdsError::VerificationMismatch {
                name: msg,
                written: String::new(),
                read_back: String::new(),
            },
            AdsClientError::DataError(msg) => AdsError::Validation(msg),
            AdsClientError::RetryExhausted { context, attempts } => {
                AdsError::Internal(format!("{context} (after {attempts} attempts)"))
            },
            AdsClientError::InternalError(msg) => AdsError::Internal(msg),
        }
    }
}

impl AdsErrorTrait for AdsClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "ADSSRV_CONFIG_ERROR",
            Self::AddressError(_) => "ADSSRV_ADDRESS_ERROR",
            Self::ConnectionError(_) => "ADSSRV_CONNECTION_ERROR",
            Self::ProtocolError(_) => "ADSSRV_PROTOCOL_ERROR",
            Self::TimeoutError(_) => "ADSSRV_TIMEOUT",
            Self::DeviceBusy(_) => "ADSSRV_DEVICE_BUSY",
            Self::SymbolNotFound(_) => "ADSSRV_SYMBOL_NOT_FOUND",
            Self::VerificationError(_) => "ADSSRV_VERIFICATION_ERROR",
            Self::DataError(_) => "ADSSRV_DATA_ERROR",
            Self::RetryExhausted { .. } => "ADSSRV_RETRY_EXHAUSTED",
            Self::InternalError(_) => "ADSSRV_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError(_) | Self::AddressError(_) => ErrorCategory::Configuration,
            Self::ConnectionError(_) | Self::DeviceBusy(_) => ErrorCategory::Connection,
            Self::ProtocolError(_) => ErrorCategory::Protocol,
            Self::TimeoutError(_) => ErrorCategory::Timeout,
            Self::SymbolNotFound(_) => ErrorCategory::NotFound,
            Self::VerificationError(_) => ErrorCategory::Verification,
            Self::DataError(_) => ErrorCategory::Validation,
            Self::RetryExhausted { .. } | Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    fn is_retryable(&self) -> bool {
        AdsClientError::is_retryable(self)
    }
}
