//! Host-OS detection and elevation checks.
//!
//! FlexLM ships per-OS binaries and each OS wants a different supervision
//! strategy (Windows SCM service vs. a bare daemon on Linux/macOS), so the
//! rest of the crate branches on [`HostOs`] instead of sprinkling `cfg!`
//! everywhere. Unsupported platforms are gated here, once.

use serde::Serialize;

use crate::core::errors::{LmkError, Result};

/// Operating systems the supervisor knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Windows,
    Linux,
    MacOs,
}

impl HostOs {
    /// Whether lmgrd on this OS is expected to run under the OS service
    /// manager rather than as a bare child process.
    #[must_use]
    pub const fn uses_service_manager(self) -> bool {
        matches!(self, Self::Windows)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
        }
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect the host OS, rejecting anything lmkeeper cannot supervise on.
pub fn detect_host_os() -> Result<HostOs> {
    match std::env::consts::OS {
        "windows" => Ok(HostOs::Windows),
        "linux" => Ok(HostOs::Linux),
        "macos" => Ok(HostOs::MacOs),
        other => Err(LmkError::UnsupportedPlatform {
            details: format!("no lmgrd supervision strategy for {other}"),
        }),
    }
}

/// Whether the current process has the privileges needed to drive the OS
/// service manager.
///
/// On Unix this is an effective-uid check. On Windows there is no cheap
/// stdlib equivalent, so we probe: writing under the system directory only
/// succeeds elevated.
#[must_use]
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(windows)]
    {
        let probe = std::path::Path::new(r"C:\Windows\System32\config");
        std::fs::read_dir(probe).is_ok()
    }
    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_a_supported_os() {
        // CI runs on one of the three supported platforms.
        let os = detect_host_os().expect("host OS should be supported");
        assert!(matches!(os, HostOs::Windows | HostOs::Linux | HostOs::MacOs));
    }

    #[test]
    fn only_windows_uses_the_service_manager() {
        assert!(HostOs::Windows.uses_service_manager());
        assert!(!HostOs::Linux.uses_service_manager());
        assert!(!HostOs::MacOs.uses_service_manager());
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(HostOs::Windows.to_string(), "windows");
        assert_eq!(HostOs::Linux.to_string(), "linux");
        assert_eq!(HostOs::MacOs.to_string(), "macos");
    }

    #[test]
    fn elevation_check_does_not_panic() {
        let _ = is_elevated();
    }
}
