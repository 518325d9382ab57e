/*!
 * Error types for the gnosis pipeline.
 *
 * Each layer gets its own enum so callers can tell a malformed input file
 * apart from a misbehaving agent or a misaligned merge, using the thiserror
 * crate for ergonomic error definitions.
 */

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The HTTP request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),
}

/// Malformed subtitle structure. Never retried; fails the file it came from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A block index line is not followed by a timestamp line
    #[error("line {line}: block is missing its timestamp line")]
    MissingTimestamp {
        /// 1-based line number of the index line
        line: usize,
    },

    /// A timestamp line could not be parsed
    #[error("line {line}: unparsable timestamp '{content}'")]
    InvalidTimestamp {
        /// 1-based line number
        line: usize,
        /// Offending line content
        content: String,
    },

    /// The line in index position is not a positive integer
    #[error("line {line}: expected a cue index, found '{content}'")]
    InvalidIndex {
        /// 1-based line number
        line: usize,
        /// Offending line content
        content: String,
    },

    /// The cue ends at or before its start
    #[error("line {line}: cue end time must be after its start time")]
    InvalidTimeRange {
        /// 1-based line number of the timestamp line
        line: usize,
    },
}

/// Classification of a failed agent call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentErrorKind {
    /// The call did not finish within the per-call timeout
    Timeout,
    /// The service refused the call because of rate limiting
    RateLimited,
    /// The agent answered, but not in the expected shape
    MalformedResponse,
    /// Network, authentication or server failure
    TransportFailure,
}

impl AgentErrorKind {
    /// Whether the call site should try again after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited)
    }

    /// Extra wait on top of the exponential backoff
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimited => Duration::from_millis(500),
            _ => Duration::ZERO,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::MalformedResponse => "malformed_response",
            Self::TransportFailure => "transport_failure",
        }
    }
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed capability call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("agent error ({kind}): {message}")]
pub struct AgentError {
    /// What went wrong
    pub kind: AgentErrorKind,
    /// Human readable detail
    pub message: String,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(AgentErrorKind::Timeout, format!("no response after {:?}", after))
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::RateLimited, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::MalformedResponse, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::TransportFailure, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<ProviderError> for AgentError {
    fn from(error: ProviderError) -> Self {
        let message = error.to_string();
        match error {
            ProviderError::RateLimitExceeded(_) => Self::rate_limited(message),
            ProviderError::ApiError { status_code: 429, .. } => Self::rate_limited(message),
            ProviderError::ParseError(_) => Self::malformed(message),
            ProviderError::Timeout(_) => Self::new(AgentErrorKind::Timeout, message),
            ProviderError::RequestFailed(_)
            | ProviderError::ApiError { .. }
            | ProviderError::ConnectionError(_)
            | ProviderError::AuthenticationError(_) => Self::transport(message),
        }
    }
}

/// Post-processing misalignment between a chunk's output and its records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// The agent output does not carry one line per record
    #[error("chunk {chunk_id}: expected {expected} lines, got {actual}")]
    LineCountMismatch {
        /// Position of the chunk in its file
        chunk_id: usize,
        /// Number of records in the chunk
        expected: usize,
        /// Number of lines the agent produced
        actual: usize,
    },
}

/// Error that stops one file from being processed
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Malformed subtitle input
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

impl AppError {
    /// Short label for reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "io",
            Self::Format(_) => "format",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
