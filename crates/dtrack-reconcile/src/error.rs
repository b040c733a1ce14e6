//! Reconciliation errors.

use dtrack_api::ApiError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::EntityKind;

/// Errors raised while planning or applying a reconciliation.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Remote state could not be read.
    #[error("failed to read remote state: {0}")]
    Transport(#[source] ApiError),

    /// A referenced entity exists neither remotely nor in the plan.
    #[error("{kind} '{name}' does not exist and is not going to be created")]
    UnresolvedReference { kind: EntityKind, name: String },

    /// The project hierarchy contains a cycle.
    #[error("project parents form a cycle: {}", format_cycle(.cycle))]
    CyclicParent { cycle: Vec<String> },

    /// A project scheduled for deletion still has children that stay.
    #[error("project '{project}' cannot be deleted while it has children: {}", .children.join(", "))]
    DanglingChild {
        project: String,
        children: Vec<String>,
    },

    /// A team declares a permission outside the known vocabulary.
    #[error("team '{team}' declares unknown permission '{permission}'")]
    UnknownPermission { team: String, permission: String },

    /// A portfolio grant does not satisfy its verification rule.
    #[error("portfolio access verification failed for team '{team}': {message}")]
    VerificationFailed { team: String, message: String },

    /// An API call made while applying the plan failed.
    #[error("{operation} failed for {entity}: {cause}")]
    Api {
        operation: String,
        entity: String,
        #[source]
        cause: ApiError,
    },

    /// The desired state is malformed.
    #[error("invalid desired state: {0}")]
    InvalidDesiredState(String),
}

/// Result alias for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    TransportError,
    UnresolvedReferenceError,
    CyclicParentError,
    DanglingChildError,
    UnknownPermissionError,
    VerificationFailedError,
    ApiError,
    InvalidDesiredState,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::TransportError => "TransportError",
            ErrorKind::UnresolvedReferenceError => "UnresolvedReferenceError",
            ErrorKind::CyclicParentError => "CyclicParentError",
            ErrorKind::DanglingChildError => "DanglingChildError",
            ErrorKind::UnknownPermissionError => "UnknownPermissionError",
            ErrorKind::VerificationFailedError => "VerificationFailedError",
            ErrorKind::ApiError => "ApiError",
            ErrorKind::InvalidDesiredState => "InvalidDesiredState",
        };
        f.write_str(name)
    }
}

impl ReconcileError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Transport(_) => ErrorKind::TransportError,
            ReconcileError::UnresolvedReference { .. } => ErrorKind::UnresolvedReferenceError,
            ReconcileError::CyclicParent { .. } => ErrorKind::CyclicParentError,
            ReconcileError::DanglingChild { .. } => ErrorKind::DanglingChildError,
            ReconcileError::UnknownPermission { .. } => ErrorKind::UnknownPermissionError,
            ReconcileError::VerificationFailed { .. } => ErrorKind::VerificationFailedError,
            ReconcileError::Api { .. } => ErrorKind::ApiError,
            ReconcileError::InvalidDesiredState(_) => ErrorKind::InvalidDesiredState,
        }
    }

    /// The underlying API error, if any.
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ReconcileError::Transport(e) | ReconcileError::Api { cause: e, .. } => Some(e),
            _ => None,
        }
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {first}", cycle.join(" -> ")),
        None => String::new(),
    }
}
