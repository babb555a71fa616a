//! Error types for the Yandex XML client.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single rejected query field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Per-field validation failures, one entry per rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    /// Messages recorded for a field.
    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&joined.join("; "))
    }
}

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unusable credentials/settings. Not retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid query: {0}")]
    Validation(FieldErrors),

    /// The HTTP layer reported a non-success status.
    #[error("HTTP error {status} for {request}")]
    Remote { status: u16, request: String },

    /// The provider answered with an `<error>` element.
    #[error("Provider error{}: {message}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
    Provider { code: Option<i64>, message: String },

    #[error("XML parse error: {0}")]
    Parse(String),

    /// No quota period covers the current time.
    #[error("No quota period matches {0}")]
    Lookup(String),

    /// The request never produced a status (DNS, TLS, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// True for failures that may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Remote { .. } | Error::Transport(_) | Error::Store(_) | Error::Lookup(_)
        )
    }

    /// Field errors, when this is a validation failure.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Error::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = Error::Provider {
            code: Some(15),
            message: "Sorry, there are no results".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider error 15: Sorry, there are no results"
        );

        let err = Error::Provider {
            code: None,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Provider error: boom");
    }

    #[test]
    fn test_field_errors() {
        let errors = FieldErrors(vec![
            FieldError::new("lang", "not available"),
            FieldError::new("limit", "must be at most 100"),
        ]);
        assert!(errors.has("lang"));
        assert!(!errors.has("page"));
        assert_eq!(errors.for_field("limit"), vec!["must be at most 100"]);
        assert_eq!(
            errors.to_string(),
            "lang: not available; limit: must be at most 100"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(Error::Remote {
            status: 503,
            request: "GET /".to_string()
        }
        .is_transient());
        assert!(!Error::Configuration("login".to_string()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }
}
