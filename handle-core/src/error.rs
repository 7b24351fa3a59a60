//! Error types for Handle server administration

use thiserror::Error;

/// Core error type for handle operations
#[derive(Error, Debug)]
pub enum HandleError {
    /// Missing or unreadable credentials, or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session could not be created or authorized
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The handle does not exist on the server
    #[error("Handle not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status
    #[error("HTTP {status} error at {endpoint}: {body}")]
    Http {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// Connection, timeout, or body decoding failure
    #[error("Request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    /// Malformed response or input row
    #[error("Parse error: {0}")]
    Parse(String),

    /// Reading the driver file failed
    #[error("CSV error: {0}")]
    Csv(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operator cancelled the run
    #[error("Interrupted by user")]
    Interrupted,
}

impl HandleError {
    /// Process exit status for this error.
    ///
    /// An interrupt uses the conventional `128 + SIGINT`.
    pub fn exit_code(&self) -> i32 {
        match self {
            HandleError::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Result type alias for handle operations
pub type Result<T> = std::result::Result<T, HandleError>;

impl From<serde_json::Error> for HandleError {
    fn from(err: serde_json::Error) -> Self {
        HandleError::Parse(err.to_string())
    }
}
