//! Error taxonomy for deployment assembly.
//!
//! Every resolver returns [`DeployError`] and the assembler propagates it
//! unchanged, so the variant that reaches the caller names the step that
//! failed.

use std::path::PathBuf;

use thiserror::Error;

/// Which part of `https://github.com/<owner>/<name>.git` a remote URL failed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Prefix,
    Suffix,
    OwnerName,
}

impl std::fmt::Display for Expected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expected::Prefix => write!(f, "prefix {:?}", crate::git::GITHUB_PREFIX),
            Expected::Suffix => write!(f, "suffix {:?}", crate::git::GIT_SUFFIX),
            Expected::OwnerName => write!(f, "an \"owner/name\" path"),
        }
    }
}

/// Why a subprocess did not produce usable output.
#[derive(Error, Debug)]
pub enum ExecFailure {
    #[error("failed to start: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("exited with {}: {stderr}", .code.map(|c| format!("status {c}")).unwrap_or_else(|| "signal".to_string()))]
    Status { code: Option<i32>, stderr: String },

    #[error("output is not valid UTF-8")]
    NonUtf8,

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Main error type for deployment assembly.
#[derive(Error, Debug)]
pub enum DeployError {
    /// A subprocess failed to start, exited non-zero, or was aborted.
    #[error("`{program}` failed: {cause}")]
    Exec {
        program: String,
        #[source]
        cause: ExecFailure,
    },

    /// The origin remote URL is not a GitHub HTTPS clone URL.
    #[error("failed to find the current GitHub repo: missing {expected}, found {got:?}")]
    Parse { expected: Expected, got: String },

    /// The hosting-service response is not JSON of the expected shape.
    #[error("failed to decode repository metadata: {0}")]
    Decode(#[from] serde_json::Error),

    /// A directory listing failed during the ascent.
    #[error("failed to list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ascent reached the filesystem root without finding `.git`.
    #[error("{} is not inside a git repository", start.display())]
    NotInRepository { start: PathBuf },

    /// The cancellation token fired between steps.
    #[error("operation cancelled")]
    Cancelled,

    /// The deployment service rejected the registration request.
    #[error("deployment service error: {message}")]
    Service {
        status: Option<u16>,
        message: String,
    },

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl DeployError {
    pub fn exec(program: impl Into<String>, cause: ExecFailure) -> Self {
        DeployError::Exec {
            program: program.into(),
            cause,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        DeployError::Config {
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, DeployError>`.
pub type Result<T> = std::result::Result<T, DeployError>;
