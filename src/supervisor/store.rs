//! On-disk persistence for the session flags.
//!
//! Each CLI invocation is a new process, but the stop cooldown and the
//! "was this down expected" flags describe the server's lifecycle, which
//! spans invocations. They are kept in a small JSON state file under the
//! app dir. The state is advisory: a missing or unreadable file degrades
//! to a fresh session instead of blocking the command.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{LmkError, Result};
use crate::core::paths;
use crate::supervisor::session::{SessionSnapshot, SupervisorSession};

/// File-backed store for [`SupervisorSession`] state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store in the default per-user app directory.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(paths::app_dir().join("session.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session, or a fresh one when no usable state
    /// exists.
    #[must_use]
    pub fn load(&self) -> SupervisorSession {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return SupervisorSession::new();
        };
        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(snapshot) => SupervisorSession::restore(&snapshot),
            Err(error) => {
                eprintln!(
                    "[lmkeeper] WARNING: ignoring unreadable session state at {}: {error}",
                    self.path.display()
                );
                SupervisorSession::new()
            }
        }
    }

    /// Persist the session using an atomic rename.
    pub fn save(&self, session: &SupervisorSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LmkError::io(parent, e))?;
        }
        let data = serde_json::to_vec_pretty(&session.snapshot())?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, data).map_err(|e| LmkError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| LmkError::io(&self.path, e))?;
        Ok(())
    }

    /// Remove the state file if present.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(LmkError::io(&self.path, error)),
        }
    }
}
