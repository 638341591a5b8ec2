//! Tagged error type shared across every fallible operation in the crate.

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScanError>;

/// The pipeline phase a failure occurred in, used for progress reporting
/// and for deciding whether a retry is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Robots/fetch resolution.
    Fetching,
    /// CSS tokenization and observation extraction.
    Parsing,
    /// Consensus clustering into canonical tokens.
    Analyzing,
    /// Layout profiling (runs alongside `Parsing`/`Analyzing`).
    Profiling,
    /// Version diff and persistence.
    Diffing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Fetching => "fetching",
            Phase::Parsing => "parsing",
            Phase::Analyzing => "analyzing",
            Phase::Profiling => "profiling",
            Phase::Diffing => "diffing",
        };
        f.write_str(s)
    }
}

/// The error kinds defined in the spec's error handling design, each with
/// its own recovery and HTTP-status mapping.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Caller supplied an invalid request (bad query, bad regex, bad URL).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// robots.txt disallows the requested path.
    #[error("robots.txt disallows scanning this URL")]
    RobotsDenied,

    /// The target host or resource could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// A phase exceeded its deadline.
    #[error("{phase} exceeded its deadline")]
    Timeout {
        /// Phase that timed out.
        phase: Phase,
    },

    /// A size or memory cap was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),

    /// No CSS bytes were produced by any source.
    #[error("no CSS content was found")]
    EmptyCss,

    /// One or more sources failed to parse; the scan continues with the rest.
    #[error("{0} source(s) failed to parse")]
    ParseFailure(usize),

    /// A write conflicted with a concurrent writer and should be retried once.
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    /// The scan was canceled by its caller.
    #[error("scan canceled")]
    Canceled,

    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Underlying JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying HTTP client failure.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ScanError {
    /// The HTTP status code a caller should see for this error, per spec §7.
    pub fn status_code(&self) -> u16 {
        match self {
            ScanError::BadRequest(_) => 400,
            ScanError::RobotsDenied => 403,
            ScanError::Unreachable(_) | ScanError::Http(_) => 502,
            ScanError::Timeout { .. } => 504,
            ScanError::ResourceExceeded(_) => 413,
            ScanError::EmptyCss => 422,
            ScanError::ParseFailure(_) => 200,
            ScanError::StorageConflict(_) => 500,
            ScanError::Canceled => 499,
            ScanError::Internal(_) | ScanError::Io(_) | ScanError::Storage(_) | ScanError::Json(_) => {
                500
            }
        }
    }

    /// The CLI exit code for this error, per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::BadRequest(_) => 2,
            ScanError::Storage(_) | ScanError::Io(_) => 3,
            _ => 4,
        }
    }

    /// Whether this error kind may be retried within a phase (spec §4.7).
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::Unreachable(_) | ScanError::Http(_))
    }
}
