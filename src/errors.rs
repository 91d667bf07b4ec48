use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Invalid or missing configuration.
    Config(String),
    /// Transport-level failure talking to the CRM (connect, timeout, body read).
    Http(String),
    /// The CRM answered with a non-success HTTP status.
    UnexpectedStatus {
        /// HTTP status code returned by the CRM.
        status: u16,
        /// Response body, if it could be read.
        body: String,
    },
    /// The CRM accepted the request but reported an allocation error.
    AllocationRejected(String),
    /// The lead list markup could not be processed.
    Markup(String),
    /// The login flow did not yield a session.
    Login(String),
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
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Http(msg) => write!(f, "HTTP error: {}", msg),
            AppError::UnexpectedStatus { status, body } => {
                write!(f, "CRM returned status {}: {}", status, body)
            }
            AppError::AllocationRejected(msg) => write!(f, "Allocation rejected: {}", msg),
            AppError::Markup(msg) => write!(f, "Markup error: {}", msg),
            AppError::Login(msg) => write!(f, "Login failed: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_message() {
        let result: Result<(), AppError> = Err(AppError::Http("connection reset".to_string()));
        let err = result.context("Fetching lead list").unwrap_err();

        assert_eq!(
            err.to_string(),
            "Fetching lead list: HTTP error: connection reset"
        );
    }

    #[test]
    fn test_root_unwraps_nested_context() {
        let result: Result<(), AppError> =
            Err(AppError::AllocationRejected("quota exceeded".to_string()));
        let err = result
            .context("inner")
            .context("outer")
            .unwrap_err();

        assert!(matches!(err.root(), AppError::AllocationRejected(msg) if msg == "quota exceeded"));
    }

    #[test]
    fn test_unexpected_status_display() {
        let err = AppError::UnexpectedStatus {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(err.to_string(), "CRM returned status 502: Bad Gateway");
    }
}
