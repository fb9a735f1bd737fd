use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by stores, transactions and social actions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Target document was absent when the operation needed it.
    #[error("document not found: {path}")]
    NotFound { path: String },

    /// A create targeted a document that already exists.
    #[error("document already exists: {path}")]
    AlreadyExists { path: String },

    /// Optimistic concurrency retries were exhausted.
    #[error("transaction on {path} gave up after {attempts} conflicting attempts")]
    Conflict { path: String, attempts: u32 },

    /// Validation failed for one or more fields.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input supplied to a store or mutation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Errors the backend may recover from on its own (dropped connection, timeout).
    ///
    /// The transaction runner retries these within its attempt budget; everything else is
    /// reported to the caller immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Redis(err) => err.is_io_error() || err.is_timeout() || err.is_connection_dropped(),
            _ => false,
        }
    }
}

/// Collection of validation issues encountered while preparing a mutation.
#[derive(Debug, Error)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-field validation error.
    pub fn single(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether any issue was reported for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

/// Detailed validation failure for a single field or logical path.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Failure to load `hearth.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {name} referenced in config is not set")]
    MissingVariable { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_failures_are_transient() {
        let io = redis::RedisError::from(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        assert!(StoreError::from(io).is_transient());
        assert!(!StoreError::not_found("posts/p1").is_transient());
        assert!(
            !StoreError::Conflict {
                path: "posts/p1".into(),
                attempts: 5
            }
            .is_transient()
        );
    }

    #[test]
    fn validation_error_reports_fields() {
        let err = ValidationError::single("content", "validation.empty", "post must not be empty");
        assert!(err.has_field("content"));
        assert!(!err.has_field("images"));
    }
}
