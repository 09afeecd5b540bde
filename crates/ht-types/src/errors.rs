use thiserror::Error;

/// Main error type for the hypertune pipeline
#[derive(Error, Debug)]
pub enum HtError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Dataset loading and partitioning errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data source not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },

    #[error("Split ratio must be in (0, 1), got {ratio}")]
    InvalidRatio { ratio: f64 },
}

/// Remote object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error("Upload to {path} failed: {message}")]
    UploadFailed { path: String, message: String },

    #[error("Upload to {path} not confirmed: expected {expected} bytes, found {found:?}")]
    NotConfirmed {
        path: String,
        expected: u64,
        found: Option<u64>,
    },

    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

/// Errors raised while talking to the tuning service
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Tuning job name already in use: {name}")]
    NameCollision { name: String },

    #[error("Tuning job not found: {name}")]
    NotFound { name: String },

    #[error("Malformed request: {message}")]
    Malformed { message: String },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Missing credentials: {message}")]
    MissingCredentials { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },
}

impl SubmitError {
    /// Whether the remote side rejected the request itself (as opposed to
    /// the request never reaching it).
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::MissingCredentials { .. } | Self::Network { .. })
    }
}

/// Result type alias for hypertune operations
pub type HtResult<T> = Result<T, HtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::HtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HtError::Config(format!($($arg)*))
    };
}
