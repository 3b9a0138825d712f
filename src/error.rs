use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Event rejected by the incident state machine
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Tag text is not of the form `key=value`
    #[error("Malformed tag: {0}")]
    MalformedTag(String),

    /// Tag already attached to the incident
    #[error("Duplicate tag: {0}")]
    DuplicateTag(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness constraint violated
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a host transport should surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Internal,
}

impl AppError {
    /// Classify this error for the calling transport
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MalformedTag(_) | AppError::Validation(_) => ErrorKind::Validation,
            AppError::InvalidTransition(_)
            | AppError::DuplicateTag(_)
            | AppError::DuplicateName(_) => ErrorKind::Conflict,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Configuration(_)
            | AppError::Storage(_)
            | AppError::Serialization(_)
            | AppError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::MalformedTag(_) => "MALFORMED_TAG",
            AppError::DuplicateTag(_) => "DUPLICATE_TAG",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateName(_) => "DUPLICATE_NAME",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
