// Error types for the Trellis runtime

use http::StatusCode;
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed failure raised by hooks, producers and user handlers.
pub type HookError = Box<dyn StdError + Send + Sync>;

/// Result type for initialization hooks and producer methods.
pub type HookResult<T = ()> = Result<T, HookError>;

#[derive(Error, Debug)]
pub enum Error {
    /// Resolution reached a full pass without registering anything.
    #[error(
        "Unsatisfied dependency: `{component}` requires `{requirement}`, but no registered component provides it"
    )]
    UnsatisfiedDependency {
        component: String,
        requirement: String,
    },

    /// A routable method has no parameter able to carry the request context.
    #[error(
        "Malformed registration: can't create endpoint for `{component}::{method}({parameters})`, no parameter can carry the request context"
    )]
    MalformedRegistration {
        component: String,
        method: String,
        parameters: String,
    },

    #[error("Dependency injection error: {0}")]
    DependencyInjection(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Not Acceptable: {0}")]
    NotAcceptable(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A configuration value the runtime can't use.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure raised from inside a routed handler or front filter.
    #[error("{0}")]
    Handler(#[source] HookError),
}

impl Error {
    /// Wrap an application error raised by a handler.
    pub fn handler<E: Into<HookError>>(error: E) -> Self {
        Error::Handler(error.into())
    }

    /// The failure an exception mapping is matched against.
    ///
    /// Handler failures expose the wrapped error; every other variant is its own cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        match self {
            Error::Handler(inner) => inner.as_ref(),
            other => other,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Error::BadRequest(_) | Error::Deserialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Numeric form of [`Error::status`]
    pub fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Whether this failure aborts startup rather than a single request.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Error::UnsatisfiedDependency { .. } | Error::MalformedRegistration { .. }
        )
    }
}

impl From<HookError> for Error {
    fn from(error: HookError) -> Self {
        Error::Handler(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct OutOfStock;

    impl std::fmt::Display for OutOfStock {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "out of stock")
        }
    }

    impl StdError for OutOfStock {}

    #[test]
    fn test_handler_cause_is_inner_error() {
        let err = Error::handler(OutOfStock);
        assert!(err.cause().is::<OutOfStock>());
        assert_eq!(err.to_string(), "out of stock");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_framework_error_is_own_cause() {
        let err = Error::BadRequest("bad".to_string());
        assert!(err.cause().is::<Error>());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_startup_failures() {
        let err = Error::UnsatisfiedDependency {
            component: "Service".to_string(),
            requirement: "Repo".to_string(),
        };
        assert!(err.is_startup_failure());
        assert!(err.to_string().contains("`Service` requires `Repo`"));
        assert!(!Error::Internal("x".to_string()).is_startup_failure());
    }
}
