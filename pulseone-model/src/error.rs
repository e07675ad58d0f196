use thiserror::Error;

/// Errors produced by model constructors and validation routines.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("value out of range for `{field}`: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("unknown enum spelling for `{field}`: {spelling}")]
    UnknownVariant { field: &'static str, spelling: String },

    #[cfg(feature = "serde")]
    #[error("malformed structured document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
