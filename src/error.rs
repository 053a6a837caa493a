//! Unified error type for pyscout.
//!
//! Every fallible path in the root crate returns [`PyscoutError`], and the
//! CLI maps each error to a stable process exit code through [`CliExitCode`].
//!
//! ## Exit Code Mapping
//!
//! - `2`: Invalid arguments (bad command line or configuration input)
//! - `3`: Missing resource (interpreter, file, project)
//! - `4`: Transport failure (worker socket or pool gone)
//! - `10`: Internal errors (worker-reported failures, bugs)
//!
//! Exit codes are part of the tool's contract with editor integrations and
//! must not be renumbered.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use pyscout_core::frame::FrameError;

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit codes reported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CliExitCode {
    Success = 0,
    /// Bad command line or configuration input.
    InvalidArguments = 2,
    /// A required resource (interpreter, file, project) was not found.
    MissingResource = 3,
    /// The worker transport failed or the pool is gone.
    TransportFailure = 4,
    /// Unclassified internal failure.
    InternalError = 10,
}

impl CliExitCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for CliExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

pub type PyscoutResult<T> = Result<T, PyscoutError>;

#[derive(Debug, Error)]
pub enum PyscoutError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("no usable Python interpreter: {detail}")]
    PythonNotFound { detail: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker transport failed: {message}")]
    Transport { message: String },

    #[error("worker pool is shut down")]
    PoolClosed,

    /// The request was accepted but its reply can no longer arrive, usually
    /// because the worker crashed or the pool shut down.
    #[error("request dropped before a response arrived")]
    ReplyLost,

    /// The worker answered with an `error` payload.
    #[error("worker error: {message}")]
    Worker { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl PyscoutError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        PyscoutError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PyscoutError::Config {
            message: message.into(),
        }
    }

    pub fn python_not_found(detail: impl Into<String>) -> Self {
        PyscoutError::PythonNotFound {
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PyscoutError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        PyscoutError::Transport {
            message: message.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        PyscoutError::Worker {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PyscoutError::Internal {
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> CliExitCode {
        CliExitCode::from(self)
    }
}

impl From<&PyscoutError> for CliExitCode {
    fn from(error: &PyscoutError) -> Self {
        match error {
            PyscoutError::InvalidArguments { .. } | PyscoutError::Config { .. } => {
                CliExitCode::InvalidArguments
            }
            PyscoutError::PythonNotFound { .. } | PyscoutError::Io { .. } => {
                CliExitCode::MissingResource
            }
            PyscoutError::Transport { .. }
            | PyscoutError::PoolClosed
            | PyscoutError::ReplyLost => CliExitCode::TransportFailure,
            PyscoutError::Worker { .. } | PyscoutError::Internal { .. } => {
                CliExitCode::InternalError
            }
        }
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<FrameError> for PyscoutError {
    fn from(error: FrameError) -> Self {
        PyscoutError::transport(error.to_string())
    }
}

impl From<serde_json::Error> for PyscoutError {
    fn from(error: serde_json::Error) -> Self {
        PyscoutError::transport(format!("payload encoding failed: {error}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
