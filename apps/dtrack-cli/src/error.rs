//! CLI error types and exit codes

use dtrack_api::ApiError;
use dtrack_reconcile::ReconcileError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 2: Authentication failed
/// - 3: Network error
/// - 4: Validation or planning error
/// - 5: Server or apply error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid desired state: {0}")]
    Validation(String),

    #[error("Planning failed ({kind}): {message}")]
    Plan { kind: String, message: String },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Apply failed: {failed} operation(s) failed, {skipped} skipped. First error ({kind}): {message}")]
    Apply {
        failed: u32,
        skipped: u32,
        kind: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::AuthenticationFailed(_) => 2,
            CliError::Network(_) => 3,
            CliError::Validation(_) | CliError::Plan { .. } => 4,
            CliError::Server(_) | CliError::Apply { .. } => 5,
            CliError::Config(_) | CliError::Io(_) => 1,
        }
    }

    /// Print error to stderr
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::AuthenticationFailed(_) => {
                Some("Check DTRACK_API_KEY and the permissions of its team.")
            }
            CliError::Network(_) => Some("Check DTRACK_URL and that the server is reachable."),
            CliError::Config(_) => Some("Set DTRACK_URL and DTRACK_API_KEY, or pass --url and --api-key."),
            CliError::Plan { .. } => Some("Run 'dtrack plan' to inspect the computed changes."),
            _ => None,
        }
    }
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        match &e {
            ApiError::Unauthorized { .. } => CliError::AuthenticationFailed(e.to_string()),
            ApiError::InvalidConfig(msg) => CliError::Config(msg.clone()),
            ApiError::Server { .. } => CliError::Server(e.to_string()),
            _ if e.is_transport() => CliError::Network(e.to_string()),
            _ => CliError::Server(e.to_string()),
        }
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Transport(cause) => cause.into(),
            ReconcileError::InvalidDesiredState(msg) => CliError::Validation(msg),
            other => CliError::Plan {
                kind: other.kind().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("Failed to serialize output: {e}"))
    }
}
