use std::fmt;

/// Application-specific error types.
///
/// Absence of an entity is a business outcome, not an error: lookups return
/// `Option`/empty collections instead of a `NotFound` variant.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Unexpected fault from the keyed store.
    Storage(String),
    /// A conditional write lost its precondition (concurrent writer won).
    PreconditionFailed(String),
    /// Operating on configuration that does not exist (e.g. unknown OEM).
    Configuration(String),
    /// A lifecycle transition was attempted out of order.
    InvalidTransition(String),
    /// Error interacting with an external API.
    ExternalApi(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::PreconditionFailed(msg) => write!(f, "Precondition failed: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::InvalidTransition(msg) => write!(f, "Invalid transition: {}", msg),
            AppError::ExternalApi(msg) => write!(f, "External API error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApi(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
