use thiserror::Error;

/// Application-wide error types for Larder.
///
/// Entity parse failures are deliberately NOT represented here: the
/// extraction layer degrades to `None` / shortened lists so that batch
/// reads survive partially broken markup. Only transport, session, and
/// mutation-discovery failures are typed errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// The fixed-window request budget is exhausted. Local and immediate;
    /// the transport never queues or sleeps on it.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error (connect, reset, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}")]
    HttpStatus { status: u16, body: String },

    /// Form discovery found a form but no anti-forgery token. Fatal for
    /// the specific mutation attempt.
    #[error("Anti-forgery token missing from discovered form")]
    CsrfTokenMissing,

    /// No form on the reference page matched the requested intent.
    #[error("No form found for intent: {0}")]
    FormNotFound(String),

    /// An authenticated operation was attempted without a valid session.
    /// Raised by calling services, never by the session store itself.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if this error is transient infrastructure trouble
    /// rather than a business/validation outcome. 4xx statuses are
    /// business failures; 5xx are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::RateLimitExceeded | AppError::Timeout(_) | AppError::NetworkError(_) => true,
            AppError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(AppError::RateLimitExceeded.is_transient());
        assert!(AppError::Timeout(30).is_transient());
        assert!(AppError::NetworkError("reset".into()).is_transient());
        assert!(
            AppError::HttpStatus {
                status: 503,
                body: String::new(),
            }
            .is_transient()
        );
    }

    #[test]
    fn business_errors_are_not_transient() {
        assert!(
            !AppError::HttpStatus {
                status: 400,
                body: "bad quantity".into(),
            }
            .is_transient()
        );
        assert!(!AppError::CsrfTokenMissing.is_transient());
        assert!(!AppError::AuthenticationRequired.is_transient());
        assert!(!AppError::FormNotFound("checkout".into()).is_transient());
    }
}
