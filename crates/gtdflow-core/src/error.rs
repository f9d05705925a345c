//! Error types for gtdflow.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using gtdflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for gtdflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// AI service call failed after retry/fallback handling
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Model output could not be extracted or validated
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Managed region in a target document is malformed
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// Cache store operation failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Document read/write failed
    #[error("Document error: {0}")]
    Document(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation was cancelled before it completed
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// =============================================================================
// TRANSPORT ERRORS
// =============================================================================

/// Classification of a failed call to the AI service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Connection failure or undecodable response.
    Network,
    /// Request exceeded its deadline.
    Timeout,
    /// Service signalled throttling (429 / ThrottlingException).
    Throttle,
    /// Upstream 5xx-equivalent.
    Server,
    /// Credentials rejected.
    Auth,
    /// Request rejected as malformed.
    InvalidRequest,
}

impl TransportErrorKind {
    /// Whether failures of this kind are retried with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Throttle | Self::Server
        )
    }

    /// Stable lowercase label for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Throttle => "throttle",
            Self::Server => "server",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a [`Transport`](crate::Transport) or the retrying client.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// HTTP status when the service answered at all.
    pub status: Option<u16>,
    /// Server-provided delay hint for throttling responses.
    pub retry_after: Option<Duration>,
    /// The transport could not speak to the service at the protocol level.
    /// Only these failures trigger a switch to the secondary transport.
    pub protocol_level: bool,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
            protocol_level: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    /// Network failure at the protocol level (unreachable endpoint, foreign wire format).
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message).with_protocol_level(true)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn throttle(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Throttle, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Server, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidRequest, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn with_protocol_level(mut self, protocol_level: bool) -> Self {
        self.protocol_level = protocol_level;
        self
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retriable()
    }

    /// Retriable and the service was not reachable through this transport.
    pub fn warrants_fallback(&self) -> bool {
        self.is_retriable() && self.protocol_level
    }
}

// =============================================================================
// PARSE ERRORS
// =============================================================================

/// A single schema violation located by JSON path (e.g. `$.next_actions[2]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Failure to turn a model response into a validated payload.
///
/// `NoJson` (nothing to parse) is kept distinct from the shape errors so
/// callers can decide whether a stricter re-prompt is worthwhile.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no JSON object or array found in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("schema '{schema}' violated: {}", format_violations(.violations))]
    Validation {
        schema: String,
        violations: Vec<Violation>,
    },

    #[error("payload does not match target type: {0}")]
    Deserialize(String),
}

impl ParseError {
    /// Field-level violations, empty for non-validation failures.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ParseError::Validation { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// REGION ERRORS
// =============================================================================

/// Malformed managed region in a target document.
///
/// The merger refuses to write when any of these are detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("region '{region}' has a start marker without a matching end marker")]
    MissingEnd { region: String },

    #[error("region '{region}' has an end marker without a matching start marker")]
    MissingStart { region: String },

    #[error("region '{region}' markers appear more than once ({starts} start, {ends} end)")]
    Duplicated {
        region: String,
        starts: usize,
        ends: usize,
    },

    #[error("region '{region}' end marker precedes its start marker")]
    OutOfOrder { region: String },

    #[error("region '{region}' contains another region marker: {marker}")]
    Nested { region: String, marker: String },

    #[error("new content for region '{region}' contains a region marker")]
    ContentContainsMarker { region: String },
}
