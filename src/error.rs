//! Error types
//!
//! One enum per concern. Errors that may succeed with a different
//! credential expose `is_rotatable()`, which is all the rotation policy
//! in [`crate::retry`] needs to know about them.

use thiserror::Error;

/// Credential pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Credential pool is empty")]
    EmptyPool,

    #[error("No credentials found in environment (expected {0}_1, {0}_2, ... or {0})")]
    NotFound(String),
}

/// Typed errors for the Tavily search API
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Usage quota exceeded ({0})")]
    QuotaExceeded(u16),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl SearchError {
    /// Whether a different credential might succeed where this one failed
    pub fn is_rotatable(&self) -> bool {
        matches!(
            self,
            SearchError::RateLimited | SearchError::QuotaExceeded(_) | SearchError::Unauthorized
        )
    }
}

/// Completion call errors
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Quota or rate limit reached: {0}")]
    QuotaExceeded(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Model output is not valid JSON: {0}")]
    InvalidOutput(String),

    #[error("Model output does not match schema '{schema}': {reason}")]
    SchemaViolation { schema: String, reason: String },

    #[error("All {attempts} credentials exhausted: {last}")]
    CredentialsExhausted { attempts: usize, last: String },
}

impl CompletionError {
    /// Only quota/rate-limit failures are worth a different credential
    pub fn is_rotatable(&self) -> bool {
        matches!(self, CompletionError::QuotaExceeded(_))
    }
}

/// Output store errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Fatal per-target failures, caught at the batch task boundary
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Target identifier is empty")]
    EmptyTarget,

    #[error("Research task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_error_rotatable() {
        assert!(SearchError::RateLimited.is_rotatable());
        assert!(SearchError::QuotaExceeded(432).is_rotatable());
        assert!(SearchError::Unauthorized.is_rotatable());

        assert!(!SearchError::Timeout.is_rotatable());
        assert!(!SearchError::BadRequest("bad".to_string()).is_rotatable());
        assert!(!SearchError::ServerError(500, String::new()).is_rotatable());
    }

    #[test]
    fn test_completion_error_rotatable() {
        assert!(CompletionError::QuotaExceeded("429".to_string()).is_rotatable());
        assert!(!CompletionError::Provider("boom".to_string()).is_rotatable());
        assert!(!CompletionError::InvalidOutput("x".to_string()).is_rotatable());
    }

    #[test]
    fn test_research_error_messages() {
        assert_eq!(ResearchError::EmptyTarget.to_string(), "Target identifier is empty");
        assert!(ResearchError::Task("panicked".to_string()).to_string().contains("panicked"));
    }
}
