//! Public error taxonomy.
//!
//! Every public `async fn` on [`crate::transport::Transport`],
//! [`crate::player::Player`] and [`crate::group::Group`] returns
//! `Result<T, Error>`. The seven kinds below are the full taxonomy the core
//! exposes; callers are expected to match on them rather than on error text.

use std::fmt;

/// Context identifying which device an error is about, carried on every
/// connection-shaped error so log lines and UI surfaces never have to ask
/// "which speaker?" twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceContext {
    pub host: String,
    pub model: String,
    pub firmware: String,
}

impl fmt::Display for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} fw {})", self.host, self.model, self.firmware)
    }
}

/// What actually went wrong establishing a `ConnectionFailure`. Usually a
/// socket/TLS-level `reqwest::Error`, but a caller-pinned protocol/port
/// probe (spec.md §4.2: "try exactly that combination; on failure, raise
/// `Connection` error") can also fail by returning a response that isn't
/// parseable as a status body — still a connection-establishment failure
/// from the library's point of view, just one with no underlying
/// `reqwest::Error` to carry.
#[derive(Debug)]
pub enum ConnectionFailureCause {
    Transport(reqwest::Error),
    NonParseableProbeResponse { body_excerpt: String },
}

impl fmt::Display for ConnectionFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::NonParseableProbeResponse { body_excerpt } => {
                write!(f, "probe response not parseable as status or \"OK\": {body_excerpt:?}")
            }
        }
    }
}

impl std::error::Error for ConnectionFailureCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::NonParseableProbeResponse { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ConnectionFailureCause {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("connection to {ctx} failed while calling {endpoint}: {source}")]
    ConnectionFailure {
        ctx: DeviceContext,
        endpoint: String,
        #[source]
        source: ConnectionFailureCause,
    },

    #[error("request to {endpoint} on {ctx} timed out after {attempts} attempt(s)")]
    Timeout {
        ctx: DeviceContext,
        endpoint: String,
        attempts: u32,
    },

    #[error("response from {endpoint} on {ctx} was not valid JSON and is not on the non-JSON allow-list: {body_excerpt:?}")]
    ResponseMalformed {
        ctx: DeviceContext,
        endpoint: String,
        body_excerpt: String,
    },

    #[error("unsupported operation {operation}: {reason}")]
    UnsupportedOperation { operation: String, reason: String },

    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    #[error("precondition failed for {operation}: {reason}")]
    PreconditionFailure { operation: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn precondition(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::PreconditionFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn inconsistent(reason: impl Into<String>) -> Self {
        Error::InconsistentState(reason.into())
    }

    /// True for errors that §4.2 says are worth retrying (transient
    /// connection/timeout failures), false for semantic errors the core
    /// must never silently retry or downgrade.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ConnectionFailure { .. } | Error::Timeout { .. })
    }
}
