//! Error values for source fetches and collection runs.
//!
//! Failures are tagged values rather than a type hierarchy: adapters return a
//! [`FetchError`] carrying a [`FailureKind`], and the orchestrator surfaces
//! [`CollectError`] to callers. Both can be matched on directly.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ProjectStatus;

/// Classification an adapter attaches to every failed call.
///
/// The retry policy decides purely on this tag, so adapters are responsible
/// for classifying their own failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Credentials were rejected. Never retried.
    AuthFailure,
    /// The source throttled us (HTTP 429 or equivalent).
    RateLimited,
    /// Connection reset, timeout, 5xx and similar blips.
    TransientNetwork,
    /// Malformed query, unparseable response, anything retrying will not fix.
    Permanent,
}

impl FailureKind {
    /// Whether a failure of this kind may resolve on its own.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::TransientNetwork)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::AuthFailure => "authentication failure",
            FailureKind::RateLimited => "rate limited",
            FailureKind::TransientNetwork => "transient network error",
            FailureKind::Permanent => "permanent error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed adapter call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AuthFailure, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientNetwork, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }
}

/// Errors returned synchronously by orchestrator operations.
///
/// Per-source fetch failures never appear here: they are recorded as skipped
/// sources in the run summary. Only precondition violations and persistence
/// failures fail a call.
#[derive(Error, Debug)]
pub enum CollectError {
    /// No project with this id exists.
    #[error("project not found: {0}")]
    ProjectNotFound(Uuid),

    /// The requested lifecycle transition is not allowed from the current status.
    #[error("cannot {operation} project {project} while it is {status}")]
    StateConflict {
        project: Uuid,
        status: ProjectStatus,
        operation: &'static str,
    },

    /// `start` was called while a run for this project is still live.
    #[error("project {0} already has an active collection run")]
    RunAlreadyActive(Uuid),

    /// `resume`/`cancel` was called but this process has no live run for the project.
    #[error("project {0} has no active collection run")]
    NoActiveRun(Uuid),

    /// Project attributes failed validation.
    #[error("invalid project: {0}")]
    Validation(String),

    /// A store read or write failed. Fatal to the run.
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

impl CollectError {
    pub(crate) fn conflict(project: Uuid, status: ProjectStatus, operation: &'static str) -> Self {
        CollectError::StateConflict {
            project,
            status,
            operation,
        }
    }

    /// True for the conflict family (illegal transition or run ownership).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CollectError::StateConflict { .. }
                | CollectError::RunAlreadyActive(_)
                | CollectError::NoActiveRun(_)
        )
    }
}

impl From<anyhow::Error> for CollectError {
    fn from(err: anyhow::Error) -> Self {
        CollectError::Persistence(err)
    }
}
