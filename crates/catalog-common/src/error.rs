//! Error types shared across the catalog workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while setting up the ambient stack
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidSetting { key: String, value: String },

    #[error("Logging initialisation failed: {0}")]
    Logging(String),
}

impl CommonError {
    /// Create an invalid setting error
    pub fn invalid_setting(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            value: value.into(),
        }
    }
}
