//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{LmkError, Result};
use crate::core::paths;

/// Full lmkeeper configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub endpoints: EndpointsConfig,
    pub timing: TimingConfig,
    pub service: ServiceConfig,
    pub paths: PathsConfig,
}

/// The three FlexLM endpoint files everything else operates on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct EndpointsConfig {
    /// Path to the `lmgrd` license-server daemon binary.
    pub lmgrd_path: PathBuf,
    /// Path to the `lmutil` query/control binary.
    pub lmutil_path: PathBuf,
    /// Path to the license file handed to both via `-c`.
    pub license_path: PathBuf,
}

/// Timing knobs for process and service control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a freshly dispatched `lmgrd` may run before we declare it
    /// launched rather than failed.
    pub start_grace_ms: u64,
    /// Settle delay before each `lmstat` query; lmgrd needs a moment after
    /// start/stop or it answers with `-16,287` transients.
    pub status_settle_ms: u64,
    /// How long start/stop actions stay disabled after a deliberate stop,
    /// giving the vendor daemon time to release its port.
    pub stop_cooldown_secs: u64,
    /// Deadline for a service-manager start/stop to reach its target state.
    pub service_wait_secs: u64,
    /// Poll stride while waiting on the service manager.
    pub service_poll_ms: u64,
}

/// Managed-service identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name used when registering lmgrd as an OS service, and the first
    /// candidate during service detection.
    pub name: String,
}

/// Filesystem paths used by lmkeeper itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Debug log handed to `lmgrd -l` when starting the server ourselves.
    pub server_log: PathBuf,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            start_grace_ms: 3_000,
            status_settle_ms: 1_500,
            // Windows services release the port quickly; bare lmgrd on Unix
            // can hold it for most of a minute.
            stop_cooldown_secs: if cfg!(windows) { 5 } else { 60 },
            service_wait_secs: 20,
            service_poll_ms: 500,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "lmgrd-flexlm".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: paths::default_config_path(),
            server_log: paths::default_log_path(),
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub const fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace_ms)
    }

    #[must_use]
    pub const fn status_settle(&self) -> Duration {
        Duration::from_millis(self.status_settle_ms)
    }

    #[must_use]
    pub const fn stop_cooldown(&self) -> Duration {
        Duration::from_secs(self.stop_cooldown_secs)
    }

    #[must_use]
    pub const fn service_wait(&self) -> Duration {
        Duration::from_secs(self.service_wait_secs)
    }

    #[must_use]
    pub const fn service_poll(&self) -> Duration {
        Duration::from_millis(self.service_poll_ms)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        paths::default_config_path()
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| LmkError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(LmkError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // endpoints
        set_env_path("LMK_LMGRD_PATH", &mut self.endpoints.lmgrd_path);
        set_env_path("LMK_LMUTIL_PATH", &mut self.endpoints.lmutil_path);
        set_env_path("LMK_LICENSE_PATH", &mut self.endpoints.license_path);

        // timing
        set_env_u64("LMK_START_GRACE_MS", &mut self.timing.start_grace_ms)?;
        set_env_u64("LMK_STATUS_SETTLE_MS", &mut self.timing.status_settle_ms)?;
        set_env_u64(
            "LMK_STOP_COOLDOWN_SECS",
            &mut self.timing.stop_cooldown_secs,
        )?;
        set_env_u64("LMK_SERVICE_WAIT_SECS", &mut self.timing.service_wait_secs)?;
        set_env_u64("LMK_SERVICE_POLL_MS", &mut self.timing.service_poll_ms)?;

        // service
        if let Some(raw) = env_var("LMK_SERVICE_NAME") {
            self.service.name = raw;
        }

        // paths
        set_env_path("LMK_SERVER_LOG", &mut self.paths.server_log);

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.timing.start_grace_ms == 0 {
            return Err(LmkError::InvalidConfig {
                details: "timing.start_grace_ms must be > 0".to_string(),
            });
        }
        if self.timing.service_wait_secs == 0 {
            return Err(LmkError::InvalidConfig {
                details: "timing.service_wait_secs must be > 0".to_string(),
            });
        }
        if self.timing.service_poll_ms == 0 {
            return Err(LmkError::InvalidConfig {
                details: "timing.service_poll_ms must be > 0".to_string(),
            });
        }
        if self.timing.service_poll_ms > self.timing.service_wait_secs.saturating_mul(1_000) {
            return Err(LmkError::InvalidConfig {
                details: format!(
                    "timing.service_poll_ms ({}) must not exceed the service wait deadline ({} s)",
                    self.timing.service_poll_ms, self.timing.service_wait_secs
                ),
            });
        }
        if self.service.name.trim().is_empty() {
            return Err(LmkError::InvalidConfig {
                details: "service.name must not be empty".to_string(),
            });
        }
        if self
            .service
            .name
            .chars()
            .any(|c| c.is_whitespace() || c == '"')
        {
            return Err(LmkError::InvalidConfig {
                details: format!(
                    "service.name {:?} must not contain whitespace or quotes",
                    self.service.name
                ),
            });
        }
        Ok(())
    }

    /// Boundary checks for the three endpoint files before any operation.
    ///
    /// Never inspects file contents; existence is the whole contract.
    pub fn validate_endpoints(&self) -> Result<()> {
        for (role, path) in [
            ("lmgrd binary", &self.endpoints.lmgrd_path),
            ("lmutil binary", &self.endpoints.lmutil_path),
            ("license file", &self.endpoints.license_path),
        ] {
            if path.as_os_str().is_empty() || !path.is_file() {
                return Err(LmkError::MissingFile {
                    role,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// True when all three endpoint files exist; used for action gating
    /// where an error report would be noise.
    #[must_use]
    pub fn endpoints_present(&self) -> bool {
        self.validate_endpoints().is_ok()
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_path(name: &str, slot: &mut PathBuf) {
    if let Some(raw) = env_var(name) {
        *slot = PathBuf::from(raw);
    }
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| LmkError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
