//! Log-path resolution: find the debug log the running lmgrd actually
//! writes, which is not necessarily the one we would hand it ourselves.
//!
//! Ordered fallback chain, first hit wins:
//! 1. `-l` flag in a detected service's image path (relative paths resolve
//!    against the service executable's directory);
//! 2. `-l` flag in any running lmgrd process's command line;
//! 3. `lmlog.txt` co-located with the lmgrd binary, when it is the only log
//!    or the more recently written one;
//! 4. the configured default log path, existing or not.

use std::path::{Path, PathBuf};

use crate::platform::pal::HostOs;
use crate::proc::cmdline::{extract_executable, extract_log_flag};
use crate::proc::enumerate::lmgrd_command_lines;
use crate::service::scm::ServiceHandle;

/// Resolve against live OS state.
#[must_use]
pub fn resolve(
    service: Option<&ServiceHandle>,
    lmgrd_path: &Path,
    default_log: &Path,
    os: HostOs,
) -> PathBuf {
    let cmdlines = lmgrd_command_lines(os);
    resolve_from_sources(
        service.map(|handle| handle.image_path.as_str()),
        &cmdlines,
        lmgrd_path,
        default_log,
    )
}

/// Pure resolution over pre-collected inputs.
#[must_use]
pub fn resolve_from_sources(
    service_image: Option<&str>,
    process_cmdlines: &[String],
    lmgrd_path: &Path,
    default_log: &Path,
) -> PathBuf {
    // 1. Service registration names the log explicitly.
    if let Some(image) = service_image
        && let Some(flagged) = extract_log_flag(image)
    {
        let candidate = resolve_relative_to_executable(&flagged, image);
        if candidate.is_file() {
            return candidate;
        }
    }

    // 2. A live process command line names it.
    for cmdline in process_cmdlines {
        if let Some(flagged) = extract_log_flag(cmdline) {
            let candidate = PathBuf::from(flagged);
            if candidate.is_file() {
                return candidate;
            }
        }
    }

    // 3. lmlog.txt next to the binary, if it looks like the active one.
    if let Some(dir) = lmgrd_path.parent() {
        let co_located = dir.join("lmlog.txt");
        if co_located.is_file() {
            if !default_log.is_file() {
                return co_located;
            }
            if is_newer(&co_located, default_log) {
                return co_located;
            }
        }
    }

    // 4. The fixed default, which may not exist yet.
    default_log.to_path_buf()
}

/// Resolve a possibly-relative `-l` value against the directory of the
/// executable named in the same image path.
fn resolve_relative_to_executable(log_value: &str, image_path: &str) -> PathBuf {
    let log = PathBuf::from(log_value);
    if log.is_absolute() {
        return log;
    }
    extract_executable(image_path)
        .and_then(|exe| PathBuf::from(exe).parent().map(Path::to_path_buf))
        .map_or(log.clone(), |dir| dir.join(log))
}

fn is_newer(candidate: &Path, reference: &Path) -> bool {
    match (modified(candidate), modified(reference)) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

fn modified(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
