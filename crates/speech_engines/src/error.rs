//! Speech synthesis and playback errors

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors a single engine attempt can produce
///
/// None of these escape the orchestrator on their own: each one is recorded
/// as a [`FailedAttempt`] and the next candidate is tried.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Required secret absent from the request; no network call was made
    #[error("Missing credential '{key}' for engine {engine}")]
    MissingCredential {
        /// Engine that needed the credential
        engine: String,
        /// Credential key that was looked up
        key: String,
    },

    /// Probe or connection failure
    #[error("Engine unreachable: {0}")]
    Unreachable(String),

    /// Backend returned an auth-failure status
    #[error("Authentication rejected with HTTP {status}")]
    AuthRejected {
        /// HTTP status code returned by the backend
        status: u16,
    },

    /// Non-JSON body or missing expected fields
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Backend reported success but produced no audio
    #[error("Engine returned no audio")]
    EmptyResult,

    /// Non-zero exit or empty output file
    #[error("Subprocess failed: {0}")]
    SubprocessFailure(String),

    /// Bounded timeout elapsed
    #[error("Synthesis timeout after {0}ms")]
    Timeout(u64),

    /// Backend answered with a non-success status that is not an auth failure
    #[error("Request failed with HTTP {status}: {body}")]
    RequestFailed {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Local filesystem error while writing the artifact
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Every tier of a multi-tier engine failed
    #[error("All tiers failed: {}", FailureList(.0))]
    TiersExhausted(Vec<FailedAttempt>),
}

impl SynthesisError {
    /// Classify a non-success HTTP status
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthRejected {
                status: status.as_u16(),
            },
            code => Self::RequestFailed {
                status: code,
                body: truncate_body(body),
            },
        }
    }

    /// Map a transport error, reporting timeouts against the budget that elapsed
    pub(crate) fn http(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            #[allow(clippy::cast_possible_truncation)]
            Self::Timeout(timeout.as_millis() as u64)
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::RequestFailed {
                status: err.status().map_or(0, |s| s.as_u16()),
                body: err.to_string(),
            }
        }
    }
}

fn truncate_body(mut body: String) -> String {
    const MAX_BODY: usize = 256;
    if body.len() > MAX_BODY {
        let mut cut = MAX_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}

/// One failed attempt in a fallback pass
///
/// Used by the outer orchestrator (one per engine) and by multi-tier engines
/// (one per tier), so both report failures the same way.
#[derive(Debug)]
pub struct FailedAttempt {
    /// Engine id, or tier name inside a multi-tier engine
    pub source: String,
    /// Why the attempt failed or was skipped
    pub error: SynthesisError,
}

impl FailedAttempt {
    /// Create a new failed attempt record
    pub fn new(source: impl Into<String>, error: SynthesisError) -> Self {
        Self {
            source: source.into(),
            error,
        }
    }
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

struct FailureList<'a>(&'a [FailedAttempt]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{attempt}")?;
        }
        Ok(())
    }
}

/// Terminal failure: every candidate engine was tried or skipped
#[derive(Debug, Error)]
#[error("All speech engines failed ({} attempted): {}", .attempts.len(), FailureList(.attempts))]
pub struct ExhaustedError {
    /// Per-engine failures in candidate order
    pub attempts: Vec<FailedAttempt>,
}

impl ExhaustedError {
    /// Engine ids in the order they were attempted
    pub fn engine_ids(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.source.as_str()).collect()
    }
}

/// Rejected synthesis request
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    /// Text is empty or whitespace only
    #[error("Text cannot be empty")]
    EmptyText,

    /// Speed must be a positive finite multiplier
    #[error("Speed must be a positive number, got {0}")]
    InvalidSpeed(f32),
}

/// Engine construction failure
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Invalid(String),

    /// HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Per-clip playback failure
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Player executable could not be started
    #[error("Player '{player}' could not be started: {reason}")]
    Spawn {
        /// Player program name
        player: String,
        /// Underlying spawn error
        reason: String,
    },

    /// Player exited with a failure status
    #[error("Player '{player}' exited with {status}")]
    Exit {
        /// Player program name
        player: String,
        /// Exit status description
        status: String,
    },

    /// Player ran longer than the configured timeout
    #[error("Player '{0}' timed out")]
    Timeout(String),
}
