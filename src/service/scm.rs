//! Service-manager bridge: detecting and driving an lmgrd OS service.
//!
//! When lmgrd was registered as a Windows service, starting it ourselves
//! would just collide with the Service Control Manager, so start/stop/status
//! are redirected through the SCM instead. Detection re-queries the registry
//! on every call; a service can appear or vanish between two button presses.
//!
//! `sc.exe` is the control surface. Its output parsing lives in pure
//! functions so the bridge logic is testable on any host.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::errors::{LmkError, Result};
use crate::core::paths::paths_match;
use crate::proc::cmdline::extract_executable;

/// State of an OS-managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
    Starting,
    Stopping,
    Unknown,
}

/// A service discovered in the OS registry.
///
/// Never cached across supervisor calls; external tooling can reconfigure
/// services at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHandle {
    pub name: String,
    pub display_name: String,
    /// Raw image path / command line the service was registered with.
    pub image_path: String,
}

/// Raw registry entry, before lmgrd matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub display_name: String,
    pub image_path: String,
}

/// Pick the lmgrd service out of the registry listing.
///
/// An exact (normalized, case-insensitive) match between the service's
/// backing executable and the configured lmgrd path always wins; failing
/// that, the first service whose executable mentions "lmgrd" is taken.
#[must_use]
pub fn detect_service(entries: &[ServiceEntry], lmgrd_path: Option<&Path>) -> Option<ServiceHandle> {
    let mut fallback: Option<ServiceHandle> = None;

    for entry in entries {
        let Some(executable) = extract_executable(&entry.image_path) else {
            continue;
        };

        if let Some(configured) = lmgrd_path
            && paths_match(Path::new(&executable), configured)
        {
            return Some(ServiceHandle {
                name: entry.name.clone(),
                display_name: entry.display_name.clone(),
                image_path: entry.image_path.clone(),
            });
        }

        if fallback.is_none() && executable.to_lowercase().contains("lmgrd") {
            fallback = Some(ServiceHandle {
                name: entry.name.clone(),
                display_name: entry.display_name.clone(),
                image_path: entry.image_path.clone(),
            });
        }
    }

    fallback
}

/// Low-level service-manager operations, separated for testability.
pub trait ServiceControl {
    /// List every registered service with its backing image path.
    fn list_services(&self) -> Result<Vec<ServiceEntry>>;
    /// Current state of a named service.
    fn query_state(&self, name: &str) -> Result<ServiceState>;
    /// Ask the manager to start the service (does not wait).
    fn request_start(&self, name: &str) -> Result<()>;
    /// Ask the manager to stop the service (does not wait).
    fn request_stop(&self, name: &str) -> Result<()>;
}

/// Real `sc.exe` implementation.
#[derive(Debug, Default, Clone)]
pub struct ScExe;

impl ScExe {
    fn run(args: &[&str]) -> Result<String> {
        let output = Command::new("sc")
            .args(args)
            .output()
            .map_err(|source| LmkError::Io {
                path: PathBuf::from("sc"),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(LmkError::CommandFailed {
                command: format!("sc {}", args.join(" ")),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                },
            })
        }
    }
}

impl ServiceControl for ScExe {
    fn list_services(&self) -> Result<Vec<ServiceEntry>> {
        let listing = Self::run(&["query", "type=", "service", "state=", "all"])?;
        let mut entries = Vec::new();
        for (name, display_name) in parse_sc_query_names(&listing) {
            // qc can fail for services we lack query rights on; skip those.
            let Ok(qc) = Self::run(&["qc", &name]) else {
                continue;
            };
            let Some(image_path) = parse_sc_qc_image_path(&qc) else {
                continue;
            };
            entries.push(ServiceEntry {
                name,
                display_name,
                image_path,
            });
        }
        Ok(entries)
    }

    fn query_state(&self, name: &str) -> Result<ServiceState> {
        let output = Self::run(&["query", name])?;
        Ok(parse_sc_query_state(&output))
    }

    fn request_start(&self, name: &str) -> Result<()> {
        Self::run(&["start", name]).map(drop)
    }

    fn request_stop(&self, name: &str) -> Result<()> {
        Self::run(&["stop", name]).map(drop)
    }
}

/// `SERVICE_NAME:`/`DISPLAY_NAME:` pairs from an `sc query` listing.
fn parse_sc_query_names(listing: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current: Option<String> = None;
    for line in listing.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("SERVICE_NAME:") {
            current = Some(name.trim().to_string());
        } else if let Some(display) = trimmed.strip_prefix("DISPLAY_NAME:")
            && let Some(name) = current.take()
        {
            pairs.push((name, display.trim().to_string()));
        }
    }
    // A trailing SERVICE_NAME without DISPLAY_NAME still counts.
    if let Some(name) = current {
        pairs.push((name.clone(), name));
    }
    pairs
}

/// `BINARY_PATH_NAME : ...` from `sc qc` output.
fn parse_sc_qc_image_path(output: &str) -> Option<String> {
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("BINARY_PATH_NAME") {
            let value = rest.trim_start().strip_prefix(':')?.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Map the `STATE` line of `sc query` output.
fn parse_sc_query_state(output: &str) -> ServiceState {
    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("STATE") {
            continue;
        }
        if trimmed.contains("RUNNING") {
            return ServiceState::Running;
        }
        if trimmed.contains("START_PENDING") {
            return ServiceState::Starting;
        }
        if trimmed.contains("STOP_PENDING") {
            return ServiceState::Stopping;
        }
        if trimmed.contains("STOPPED") {
            return ServiceState::Stopped;
        }
    }
    ServiceState::Unknown
}

/// Bridge that applies idempotency, elevation gating, and the bounded wait
/// on top of a [`ServiceControl`] backend.
#[derive(Debug)]
pub struct ScmBridge<C> {
    control: C,
    elevated: bool,
    wait: Duration,
    poll: Duration,
}

impl<C: ServiceControl> ScmBridge<C> {
    #[must_use]
    pub const fn new(control: C, elevated: bool, wait: Duration, poll: Duration) -> Self {
        Self {
            control,
            elevated,
            wait,
            poll,
        }
    }

    /// Discover the lmgrd service, if any is registered.
    pub fn detect(&self, lmgrd_path: Option<&Path>) -> Result<Option<ServiceHandle>> {
        let entries = self.control.list_services()?;
        Ok(detect_service(&entries, lmgrd_path))
    }

    pub fn query(&self, handle: &ServiceHandle) -> Result<ServiceState> {
        self.control.query_state(&handle.name)
    }

    /// Start the service and wait for it to reach `Running`.
    ///
    /// Already-running is success; a pending transition is waited out
    /// without issuing a second start request.
    pub fn start(&self, handle: &ServiceHandle) -> Result<()> {
        self.require_elevation("start the license server service")?;
        match self.control.query_state(&handle.name)? {
            ServiceState::Running => Ok(()),
            ServiceState::Starting => self.wait_for(handle, ServiceState::Running),
            _ => {
                self.control.request_start(&handle.name)?;
                self.wait_for(handle, ServiceState::Running)
            }
        }
    }

    /// Stop the service and wait for it to reach `Stopped`.
    pub fn stop(&self, handle: &ServiceHandle) -> Result<()> {
        self.require_elevation("stop the license server service")?;
        match self.control.query_state(&handle.name)? {
            ServiceState::Stopped => Ok(()),
            ServiceState::Stopping => self.wait_for(handle, ServiceState::Stopped),
            _ => {
                self.control.request_stop(&handle.name)?;
                self.wait_for(handle, ServiceState::Stopped)
            }
        }
    }

    fn require_elevation(&self, action: &'static str) -> Result<()> {
        if self.elevated {
            Ok(())
        } else {
            Err(LmkError::PermissionDenied { action })
        }
    }

    // sc has no blocking wait verb, so this is the bounded equivalent of a
    // single OS wait-for-status call.
    fn wait_for(&self, handle: &ServiceHandle, target: ServiceState) -> Result<()> {
        let deadline = Instant::now() + self.wait;
        loop {
            let state = self.control.query_state(&handle.name)?;
            if state == target {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(LmkError::ServiceControl {
                    service: handle.name.clone(),
                    details: format!(
                        "did not reach {target:?} within {} s (last state {state:?})",
                        self.wait.as_secs()
                    ),
                });
            }
            std::thread::sleep(self.poll);
        }
    }
}
