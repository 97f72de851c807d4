//! Bounded tail reads of the lmgrd debug log.
//!
//! The log is append-only, owned by the daemon, and read fresh on every
//! status check; nothing about it is cached. On Windows another reader can
//! hold the file exclusively, which surfaces as a sharing violation (OS
//! error 32) and must be reported as a recoverable condition, not a crash.

use std::fs;
use std::path::Path;

use crate::core::errors::{LmkError, Result};

/// Windows ERROR_SHARING_VIOLATION.
const SHARING_VIOLATION: i32 = 32;

/// Read the last `n` non-empty lines of `path`.
///
/// A missing log is not an error: lmgrd may simply not have created it yet,
/// so the tail is empty and classification proceeds on stdout alone.
pub fn last_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Vec::new());
        }
        Err(source) if source.raw_os_error() == Some(SHARING_VIOLATION) => {
            return Err(LmkError::LogBusy {
                path: path.to_path_buf(),
            });
        }
        Err(source) => return Err(LmkError::io(path, source)),
    };

    Ok(tail_of(&raw, n))
}

/// Read every non-empty line of `path`, with the same missing-file and
/// sharing-violation handling as [`last_lines`]. Root-cause scans need log
/// history that a bounded tail would cut off.
pub fn all_lines(path: &Path) -> Result<Vec<String>> {
    last_lines(path, usize::MAX)
}

/// Last `n` non-empty lines of a raw log body. lmgrd writes CRLF on Windows
/// and LF elsewhere; both are handled by splitting on either.
#[must_use]
pub fn tail_of(raw: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = raw
        .split(['\r', '\n'])
        .filter(|line| !line.trim().is_empty())
        .collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].iter().map(ToString::to_string).collect()
}
