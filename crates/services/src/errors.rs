use domain::{ErrorCode, ErrorDetails};

/// A service-layer failure, already carrying the wire error code it should
/// be reported under. Every public service method returns `Result<_, ServiceError>`
/// so the API layer only has one error shape to translate into an `ErrorEnvelope`.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<ErrorDetails>,
    /// Overrides `code`'s static `default_retry_after()` with a value the
    /// caller actually knows, e.g. a rate limiter's own window length.
    pub retry_after: Option<u64>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

impl From<persistence::PersistenceError> for ServiceError {
    fn from(err: persistence::PersistenceError) -> Self {
        ServiceError::new(ErrorCode::SystemInternalError, err.to_string())
    }
}
