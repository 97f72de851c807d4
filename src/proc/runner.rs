//! Spawning and supervising the external FlexLM binaries.
//!
//! Two launch shapes cover everything lmkeeper does:
//!
//! - [`run_to_completion`]: blocking run with captured output (`lmutil
//!   lmstat`/`lmdown`, `sc.exe`). The caller gets stdout/stderr/exit code
//!   regardless of exit status and decides what a non-zero exit means.
//! - [`dispatch_with_grace`]: for `lmgrd`, which daemonizes and never exits
//!   on success. The child is raced against a grace window; surviving the
//!   window counts as a successful dispatch, exiting inside it surfaces the
//!   captured output as a launch failure for the caller to diagnose.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};

use crate::core::errors::{LaunchErrorKind, LmkError, Result};

/// Captured result of a completed external process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr concatenated; lmgrd scatters diagnostics across both.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Outcome of a grace-raced daemon dispatch.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// The child outlived the grace window; treat the daemon as launched.
    Dispatched,
    /// The child exited inside the grace window.
    Exited(CommandOutput),
}

/// Run a binary to completion and capture its output.
///
/// Non-zero exit is not an error here; callers inspect `exit_code` because
/// `lmutil` uses non-zero exits for conditions we classify, not fail on.
pub fn run_to_completion<I, S>(program: &Path, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| classify_launch_error(program, &source))?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Spawn a daemon binary and race its exit against `grace`.
///
/// The collector thread owns the child; when the grace window wins the race
/// the thread keeps running detached until the daemon eventually exits, so
/// no zombie is left behind on Unix.
pub fn dispatch_with_grace<I, S>(program: &Path, args: I, grace: Duration) -> Result<Dispatch>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| classify_launch_error(program, &source))?;

    let (sender, receiver) = bounded::<std::io::Result<std::process::Output>>(1);
    thread::spawn(move || {
        // Receiver may be long gone when the daemon finally exits.
        let _ = sender.send(child.wait_with_output());
    });

    match receiver.recv_timeout(grace) {
        Err(RecvTimeoutError::Timeout) => Ok(Dispatch::Dispatched),
        Err(RecvTimeoutError::Disconnected) => Err(LmkError::Runtime {
            details: format!(
                "output collector for {} vanished before reporting",
                program.display()
            ),
        }),
        Ok(Err(source)) => Err(LmkError::io(program, source)),
        Ok(Ok(output)) => Ok(Dispatch::Exited(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })),
    }
}

/// Map a spawn failure onto a [`LaunchErrorKind`].
///
/// `NotFound` for a file that demonstrably exists means the loader rejected
/// it: FlexLM builds from the LSB era report exactly this on modern distros.
fn classify_launch_error(program: &Path, source: &std::io::Error) -> LmkError {
    let kind = match source.kind() {
        std::io::ErrorKind::NotFound => {
            if program.is_file() {
                LaunchErrorKind::LoaderCompat
            } else {
                LaunchErrorKind::NotFound
            }
        }
        std::io::ErrorKind::PermissionDenied => LaunchErrorKind::PermissionDenied,
        _ => LaunchErrorKind::Other,
    };
    LmkError::Launch {
        path: program.to_path_buf(),
        kind,
        details: format!("{source}; {}", kind.remediation()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_joins_streams() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "line one".to_string(),
            stderr: "line two".to_string(),
        };
        assert_eq!(output.combined(), "line one\nline two");

        let stdout_only = CommandOutput {
            exit_code: 0,
            stdout: "just stdout\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(stdout_only.combined(), "just stdout\n");
    }

    #[test]
    fn missing_binary_classified_not_found() {
        let err = run_to_completion(Path::new("/nonexistent/flexlm/lmutil"), ["lmstat"])
            .expect_err("spawn must fail");
        match err {
            LmkError::Launch { kind, .. } => assert_eq!(kind, LaunchErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn blocking_run_captures_exit_and_output() {
        let output = run_to_completion(Path::new("/bin/sh"), ["-c", "echo out; echo err >&2; exit 3"])
            .expect("sh should run");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn long_running_child_counts_as_dispatched() {
        let dispatch = dispatch_with_grace(
            Path::new("/bin/sh"),
            ["-c", "sleep 5"],
            Duration::from_millis(100),
        )
        .expect("sh should spawn");
        assert!(matches!(dispatch, Dispatch::Dispatched));
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_surfaces_captured_output() {
        let dispatch = dispatch_with_grace(
            Path::new("/bin/sh"),
            ["-c", "echo boot failure; exit 1"],
            Duration::from_secs(5),
        )
        .expect("sh should spawn");
        match dispatch {
            Dispatch::Exited(output) => {
                assert_eq!(output.exit_code, 1);
                assert!(output.stdout.contains("boot failure"));
            }
            Dispatch::Dispatched => panic!("child exited immediately, must not be Dispatched"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn unexecutable_file_classified_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lmgrd");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        // No execute bit.
        let err = run_to_completion(&path, Vec::<&str>::new()).expect_err("spawn must fail");
        match err {
            LmkError::Launch { kind, .. } => {
                assert_eq!(kind, LaunchErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
