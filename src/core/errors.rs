//! LMK-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, LmkError>;

/// How a spawn attempt for an external binary failed.
///
/// The distinction feeds user-facing remediation text: a missing binary, a
/// permission problem, and a loader mismatch (the binary exists but the OS
/// reports "no such file or directory" for its interpreter) each call for a
/// different fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchErrorKind {
    /// The executable does not exist at the given path.
    NotFound,
    /// The executable exists but cannot be executed by this user.
    PermissionDenied,
    /// The executable exists but its loader/ABI layer is missing
    /// (old FlexLM builds that require LSB).
    LoaderCompat,
    /// Anything else the OS reported.
    Other,
}

impl LaunchErrorKind {
    /// Remediation guidance shown alongside the raw OS error.
    #[must_use]
    pub const fn remediation(self) -> &'static str {
        match self {
            Self::NotFound => "check that the configured path points at the real binary",
            Self::PermissionDenied => "check execute permissions on the binary",
            Self::LoaderCompat => {
                "this FlexLM build likely requires LSB; install LSB or obtain a newer \
                 build that does not require it"
            }
            Self::Other => "check the server log and the binary for problems",
        }
    }
}

/// Top-level error type for lmkeeper.
#[derive(Debug, Error)]
pub enum LmkError {
    #[error("[LMK-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[LMK-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[LMK-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[LMK-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[LMK-2001] {role} not found at the configured path: {path}")]
    MissingFile { role: &'static str, path: PathBuf },

    #[error("[LMK-2101] failed to launch {path}: {details}")]
    Launch {
        path: PathBuf,
        kind: LaunchErrorKind,
        details: String,
    },

    #[error("[LMK-2102] {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("[LMK-2201] log file {path} is open in another program")]
    LogBusy { path: PathBuf },

    #[error("[LMK-2901] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[LMK-3001] administrator privileges are required to {action}")]
    PermissionDenied { action: &'static str },

    #[error("[LMK-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[LMK-3101] service control failure for \"{service}\": {details}")]
    ServiceControl { service: String, details: String },

    #[error("[LMK-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl LmkError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "LMK-1001",
            Self::MissingConfig { .. } => "LMK-1002",
            Self::ConfigParse { .. } => "LMK-1003",
            Self::UnsupportedPlatform { .. } => "LMK-1101",
            Self::MissingFile { .. } => "LMK-2001",
            Self::Launch { .. } => "LMK-2101",
            Self::CommandFailed { .. } => "LMK-2102",
            Self::LogBusy { .. } => "LMK-2201",
            Self::Serialization { .. } => "LMK-2901",
            Self::PermissionDenied { .. } => "LMK-3001",
            Self::Io { .. } => "LMK-3002",
            Self::ServiceControl { .. } => "LMK-3101",
            Self::Runtime { .. } => "LMK-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::LogBusy { .. }
                | Self::CommandFailed { .. }
                | Self::ServiceControl { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for LmkError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for LmkError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
