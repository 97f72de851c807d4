//! Managed-service registration: systemd unit / launchd plist / `sc.exe create`.
//!
//! Generates the registration from configuration, installs it in the correct
//! system directory, and drives `systemctl` / `launchctl` / `sc` for the
//! lifecycle. The registered command line always runs lmgrd in foreground
//! mode (`-z`) with `-reuseaddr`, since the service manager is the one doing
//! the daemonizing.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::core::errors::{LmkError, Result};
use crate::platform::pal::{HostOs, is_elevated};

/// Parameters for a service registration.
#[derive(Debug, Clone)]
pub struct ServiceSetup {
    /// Service / unit / plist-label name.
    pub service_name: String,
    pub lmgrd_path: PathBuf,
    pub license_path: PathBuf,
    pub log_path: PathBuf,
    /// Whether the service starts at boot (systemd enable, launchd
    /// RunAtLoad, `sc start= auto`).
    pub start_on_boot: bool,
}

/// Structured result of a register/unregister operation, for CLI output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SetupActionResult {
    pub action: &'static str,
    pub service_type: &'static str,
    pub service_name: String,
    /// Unit/plist path where applicable; `sc.exe` has no file on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_path: Option<PathBuf>,
}

impl ServiceSetup {
    /// Path of the unit/plist this registration owns, when the OS keeps one.
    #[must_use]
    pub fn registration_path(&self, os: HostOs) -> Option<PathBuf> {
        match os {
            HostOs::Linux => Some(PathBuf::from(format!(
                "/etc/systemd/system/{}.service",
                self.service_name
            ))),
            HostOs::MacOs => Some(PathBuf::from(format!(
                "/Library/LaunchDaemons/{}.plist",
                self.service_name
            ))),
            HostOs::Windows => None,
        }
    }

    /// Generate the full systemd unit file content.
    #[must_use]
    pub fn generate_systemd_unit(&self) -> String {
        let lmgrd = self.lmgrd_path.display();
        let license = self.license_path.display();
        let log = self.log_path.display();

        let mut unit = String::with_capacity(512);
        writeln!(unit, "[Unit]").ok();
        writeln!(unit, "Description=FlexLM License Manager (lmgrd)").ok();
        writeln!(unit, "After=network.target").ok();
        writeln!(unit).ok();
        writeln!(unit, "[Service]").ok();
        writeln!(unit, "Type=simple").ok();
        writeln!(
            unit,
            "ExecStart={lmgrd} -z -c \"{license}\" -l +\"{log}\" -reuseaddr"
        )
        .ok();
        writeln!(unit, "Restart=on-failure").ok();
        writeln!(unit, "RestartSec=10").ok();
        writeln!(unit).ok();
        writeln!(unit, "[Install]").ok();
        writeln!(unit, "WantedBy=multi-user.target").ok();
        unit
    }

    /// Generate the launchd plist XML content.
    #[must_use]
    pub fn generate_launchd_plist(&self) -> String {
        let label = escape_xml(&self.service_name);
        let lmgrd = escape_xml(&self.lmgrd_path.to_string_lossy());
        let license = escape_xml(&self.license_path.to_string_lossy());
        let log = escape_xml(&self.log_path.to_string_lossy());
        let run_at_load = if self.start_on_boot {
            "    <key>RunAtLoad</key>\n    <true/>\n"
        } else {
            ""
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{lmgrd}</string>
        <string>-z</string>
        <string>-c</string>
        <string>{license}</string>
        <string>-l</string>
        <string>+{log}</string>
        <string>-reuseaddr</string>
    </array>
{run_at_load}    <key>KeepAlive</key>
    <dict>
        <key>SuccessfulExit</key>
        <false/>
    </dict>
</dict>
</plist>
"#
        )
    }

    /// Arguments for `sc create`, with the quoted inner command line the SCM
    /// expects inside `binPath=`.
    #[must_use]
    pub fn sc_create_args(&self) -> Vec<String> {
        let bin_path = format!(
            "\"{}\" -c \"{}\" -l +\"{}\"",
            self.lmgrd_path.display(),
            self.license_path.display(),
            self.log_path.display()
        );
        let start_type = if self.start_on_boot { "auto" } else { "demand" };
        vec![
            "create".to_string(),
            self.service_name.clone(),
            "binPath=".to_string(),
            bin_path,
            "start=".to_string(),
            start_type.to_string(),
            "DisplayName=".to_string(),
            "FlexLM License Manager".to_string(),
        ]
    }

    /// Whether a registration with this name already exists.
    #[must_use]
    pub fn exists(&self, os: HostOs) -> bool {
        match self.registration_path(os) {
            Some(path) => path.exists(),
            // Windows: ask the SCM.
            None => run_lenient("sc", &["query", &self.service_name]).is_some(),
        }
    }

    /// Install the registration for the host OS.
    pub fn install(&self, os: HostOs) -> Result<SetupActionResult> {
        if !is_elevated() {
            return Err(LmkError::PermissionDenied {
                action: "register the license server service",
            });
        }

        let service_type = match os {
            HostOs::Linux => {
                let unit_path = self
                    .registration_path(os)
                    .ok_or_else(|| unreachable_registration(os))?;
                fs::write(&unit_path, self.generate_systemd_unit()).map_err(|source| {
                    LmkError::Io {
                        path: unit_path.clone(),
                        source,
                    }
                })?;
                run_strict("systemctl", &["daemon-reload"])?;
                if self.start_on_boot {
                    run_strict("systemctl", &["enable", &self.service_name])?;
                }
                "systemd"
            }
            HostOs::MacOs => {
                let plist_path = self
                    .registration_path(os)
                    .ok_or_else(|| unreachable_registration(os))?;
                fs::write(&plist_path, self.generate_launchd_plist()).map_err(|source| {
                    LmkError::Io {
                        path: plist_path.clone(),
                        source,
                    }
                })?;
                let plist = plist_path.to_string_lossy().to_string();
                run_strict("launchctl", &["load", &plist])?;
                "launchd"
            }
            HostOs::Windows => {
                let args = self.sc_create_args();
                let refs: Vec<&str> = args.iter().map(String::as_str).collect();
                run_strict("sc", &refs)?;
                "scm"
            }
        };

        Ok(SetupActionResult {
            action: "register",
            service_type,
            service_name: self.service_name.clone(),
            unit_path: self.registration_path(os),
        })
    }

    /// Remove the registration. Stop/disable steps are lenient because the
    /// service may already be stopped, disabled, or half-removed.
    pub fn uninstall(&self, os: HostOs) -> Result<SetupActionResult> {
        if !is_elevated() {
            return Err(LmkError::PermissionDenied {
                action: "unregister the license server service",
            });
        }

        let service_type = match os {
            HostOs::Linux => {
                run_lenient("systemctl", &["stop", &self.service_name]);
                run_lenient("systemctl", &["disable", &self.service_name]);
                self.remove_registration_file(os)?;
                run_strict("systemctl", &["daemon-reload"])?;
                "systemd"
            }
            HostOs::MacOs => {
                if let Some(plist_path) = self.registration_path(os) {
                    let plist = plist_path.to_string_lossy().to_string();
                    run_lenient("launchctl", &["unload", &plist]);
                }
                self.remove_registration_file(os)?;
                "launchd"
            }
            HostOs::Windows => {
                run_lenient("sc", &["stop", &self.service_name]);
                run_strict("sc", &["delete", &self.service_name])?;
                "scm"
            }
        };

        Ok(SetupActionResult {
            action: "unregister",
            service_type,
            service_name: self.service_name.clone(),
            unit_path: self.registration_path(os),
        })
    }

    fn remove_registration_file(&self, os: HostOs) -> Result<()> {
        if let Some(path) = self.registration_path(os)
            && path.exists()
        {
            fs::remove_file(&path).map_err(|source| LmkError::Io { path, source })?;
        }
        Ok(())
    }
}

fn unreachable_registration(os: HostOs) -> LmkError {
    LmkError::Runtime {
        details: format!("no registration file path for {os}"),
    }
}

fn run_strict(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| LmkError::Io {
            path: PathBuf::from(program),
            source,
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if output.status.success() {
        Ok(stdout.trim().to_string())
    } else {
        Err(LmkError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            exit_code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Run a tool but tolerate failure (`None` when it could not run or exited
/// non-zero).
fn run_lenient(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
