//! Shared path utilities and per-OS default locations.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Per-user application directory (config file and default server log).
///
/// Windows keeps it under `%LOCALAPPDATA%`, everything else under
/// `~/.config`, matching where users of the predecessor tooling expect
/// the server log to land when nothing better is configured.
#[must_use]
pub fn app_dir() -> PathBuf {
    if cfg!(windows) {
        env::var_os("LOCALAPPDATA").map_or_else(|| PathBuf::from("."), PathBuf::from)
    } else {
        env::var_os("HOME").map_or_else(
            || {
                eprintln!("[lmkeeper] WARNING: HOME not set, falling back to current directory");
                PathBuf::from(".")
            },
            |home| PathBuf::from(home).join(".config"),
        )
    }
    .join("lmkeeper")
}

/// Default configuration file location.
#[must_use]
pub fn default_config_path() -> PathBuf {
    app_dir().join("config.toml")
}

/// Default debug-log location handed to `lmgrd -l` when no log path is
/// configured, and the last resort of the log-path resolution chain.
#[must_use]
pub fn default_log_path() -> PathBuf {
    app_dir().join("lmlog.txt")
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    // Try filesystem resolution first (handles symlinks).
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    // Fallback: syntactic normalization.
    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Case-insensitive textual comparison of two paths after normalization.
///
/// FlexLM installations on Windows routinely mix path casing between the
/// service image path and the configured binary path, so path equality here
/// is always case-insensitive.
#[must_use]
pub fn paths_match(a: &Path, b: &Path) -> bool {
    let left = resolve_absolute_path(a).to_string_lossy().to_lowercase();
    let right = resolve_absolute_path(b).to_string_lossy().to_lowercase();
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(resolved, std::fs::canonicalize(&cwd).unwrap());
    }

    #[test]
    fn normalizes_nonexistent_path_syntactically() {
        // /nonexistent/foo/../bar -> /nonexistent/bar
        // Note: we assume /nonexistent doesn't exist.
        #[cfg(unix)]
        let root = Path::new("/");
        #[cfg(windows)]
        let root = Path::new("C:");

        let input = root.join("nonexistent").join("foo").join("..").join("bar");
        let expected = root.join("nonexistent").join("bar");

        // Ensure input doesn't exist so we trigger fallback
        assert!(std::fs::canonicalize(&input).is_err());

        let resolved = resolve_absolute_path(&input);
        assert_eq!(resolved, expected);
    }

    #[test]
    fn handles_parent_at_root() {
        #[cfg(unix)]
        {
            let input = Path::new("/../foo");
            let resolved = normalize_syntactic(input);
            assert_eq!(resolved, Path::new("/foo"));
        }
    }

    #[test]
    fn paths_match_ignores_case() {
        assert!(paths_match(
            Path::new("/nonexistent/FlexLM/lmgrd"),
            Path::new("/nonexistent/flexlm/LMGRD"),
        ));
        assert!(!paths_match(
            Path::new("/nonexistent/flexlm/lmgrd"),
            Path::new("/nonexistent/flexlm/lmutil"),
        ));
    }

    #[test]
    fn paths_match_normalizes_components() {
        assert!(paths_match(
            Path::new("/nonexistent/flexlm/./bin/../lmgrd"),
            Path::new("/nonexistent/flexlm/lmgrd"),
        ));
    }

    #[test]
    fn default_paths_share_the_app_dir() {
        let dir = app_dir();
        assert!(default_config_path().starts_with(&dir));
        assert!(default_log_path().starts_with(&dir));
        assert_eq!(default_log_path().file_name().unwrap(), "lmlog.txt");
    }
}
