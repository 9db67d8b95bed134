//! Unified error handling for the walking-tour library.
//!
//! Operations whose contract is "absent on failure" (cache lookups, path
//! computation) return `Option` and log the cause. The seams below them
//! (storage backends, directions providers) report failures through
//! [`TourError`] and [`StorageError`].

use thiserror::Error;

/// Errors raised by a key-value storage backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// The backend refused the write because it is full.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// Any other backend failure (I/O, locked database, ...).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Unified error type for walking-tour operations.
#[derive(Debug, Clone, Error)]
pub enum TourError {
    /// Too few waypoints to compute a path
    #[error("{count} waypoints given, minimum {minimum} required")]
    InsufficientWaypoints { count: usize, minimum: usize },

    /// A coordinate outside the valid latitude/longitude range
    #[error("invalid coordinates: {message}")]
    InvalidCoordinates { message: String },

    /// Cache storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The directions provider answered, but without a usable route
    #[error("directions provider error ({code}): {message}")]
    Provider { code: String, message: String },

    /// Transport-level failure talking to the directions provider
    #[error("{}", http_message(.message, .status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Response body or geometry could not be decoded
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config { message: String },
}

fn http_message(message: &str, status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!("HTTP error ({}): {}", code, message),
        None => format!("HTTP error: {}", message),
    }
}

/// Result type alias for walking-tour operations.
pub type Result<T> = std::result::Result<T, TourError>;

/// Extension trait for converting Option to TourError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an insufficient waypoints error.
    fn ok_or_insufficient_waypoints(self, count: usize, minimum: usize) -> Result<T>;

    /// Convert Option to Result with a provider error.
    fn ok_or_provider(self, code: &str, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_waypoints(self, count: usize, minimum: usize) -> Result<T> {
        self.ok_or(TourError::InsufficientWaypoints { count, minimum })
    }

    fn ok_or_provider(self, code: &str, message: &str) -> Result<T> {
        self.ok_or_else(|| TourError::Provider {
            code: code.to_string(),
            message: message.to_string(),
        })
    }
}
