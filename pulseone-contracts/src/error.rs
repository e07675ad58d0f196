use chrono::{DateTime, Utc};
use thiserror::Error;

/// Closed set of error kinds a driver can report (§4.1 "Errors").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DriverErrorKind {
    ConnectionFailed,
    ConnectionTimeout,
    ConnectionRefused,
    ConnectionLost,
    AuthenticationFailed,
    ProtocolError,
    InvalidMessageFormat,
    UnsupportedFunction,
    ChecksumError,
    DeviceNotFound,
    DeviceBusy,
    RegisterNotFound,
    InvalidAddress,
    DataTypeMismatch,
    DataOutOfRange,
    BufferOverflow,
    ConfigurationError,
    NotConnected,
    DeadlineExceeded,
    FatalInternalError,
}

impl DriverErrorKind {
    /// §7 error classes.
    pub fn class(&self) -> ErrorClass {
        use DriverErrorKind::*;
        match self {
            ConnectionLost | ConnectionTimeout | ConnectionRefused | NotConnected => {
                ErrorClass::RecoverableTransport
            }
            DataTypeMismatch | InvalidAddress | RegisterNotFound | DataOutOfRange
            | BufferOverflow | UnsupportedFunction | ChecksumError | InvalidMessageFormat
            | DeadlineExceeded => ErrorClass::PerOperation,
            ConfigurationError | AuthenticationFailed | ConnectionFailed | DeviceNotFound
            | DeviceBusy | ProtocolError => ErrorClass::Configuration,
            FatalInternalError => ErrorClass::Fatal,
        }
    }
}

/// §7 error classes, determining who handles the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RecoverableTransport,
    PerOperation,
    Configuration,
    Fatal,
}

/// A failure reported by a driver (§4.1 "Errors").
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    pub context: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
