//! The supervisor itself: start, stop, and status over one lmgrd/MLM pair.
//!
//! Every operation re-validates the endpoint files and re-detects the OS
//! service before touching anything; nothing about the server is assumed to
//! survive between two calls. Lifecycle goes through the service manager
//! when the server is registered there and through the FlexLM binaries
//! directly otherwise.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{LmkError, Result};
use crate::logwatch::{resolve, tail};
use crate::platform::pal::{self, HostOs};
use crate::proc::runner::{self, CommandOutput, Dispatch};
use crate::service::scm::{ScExe, ScmBridge, ServiceHandle};
use crate::status::classifier::{self, Classification, OperationalState};
use crate::status::usage::{self, UsageReport};
use crate::supervisor::machine::{self, ActionPermissions, UiState};
use crate::supervisor::session::SupervisorSession;
use crate::supervisor::store::SessionStore;

/// How many log lines feed the classifier. Diagnoses key off the shutdown or
/// startup burst; older lines describe a previous run.
const CLASSIFIER_TAIL_LINES: usize = 20;

/// Outcome of a start or stop request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The request was carried out (for stop: issued; lmdown's exit code is
    /// not trustworthy, the next status check is the real confirmation).
    Completed,
    /// A recent stop is still cooling down; nothing was attempted.
    CoolingDown { remaining_secs: u64 },
    /// lmgrd exited inside the grace window instead of daemonizing.
    LaunchFailed { exit_code: i32, output: String },
}

/// Report for one start/stop request.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub timestamp: DateTime<Local>,
    pub action: &'static str,
    /// Name of the OS service driven, when the service path was taken.
    pub via_service: Option<String>,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

/// Report for one status check.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub timestamp: DateTime<Local>,
    pub state: OperationalState,
    pub ui_state: UiState,
    pub permissions: ActionPermissions,
    pub summary: String,
    pub alarming: bool,
    /// The log file was locked by another reader; the diagnosis ran on
    /// the query output alone.
    pub log_busy: bool,
    /// A refused stop was retried once with `-force` during this check.
    pub forced_stop_retried: bool,
    pub usage: Option<UsageReport>,
    pub log_path: PathBuf,
    pub service: Option<ServiceHandle>,
}

/// Resolved log location plus its tail, for display.
#[derive(Debug, Clone, Serialize)]
pub struct LogReport {
    pub path: PathBuf,
    pub exists: bool,
    pub lines: Vec<String>,
}

/// Arguments for `lmgrd` when starting the server directly. The `+` prefix
/// tells lmgrd to append to the log instead of truncating it.
fn start_args(license: &Path, log: &Path) -> Vec<OsString> {
    let mut log_arg = OsString::from("+");
    log_arg.push(log.as_os_str());
    vec![
        OsString::from("-c"),
        license.as_os_str().to_os_string(),
        OsString::from("-l"),
        log_arg,
    ]
}

/// Arguments for `lmutil lmdown`. `-q` suppresses the interactive prompt;
/// `-force` overrides a borrowed-license refusal.
fn stop_args(license: &Path, force: bool) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("lmdown"),
        OsString::from("-c"),
        license.as_os_str().to_os_string(),
        OsString::from("-q"),
    ];
    if force {
        args.push(OsString::from("-force"));
    }
    args
}

/// Arguments for `lmutil lmstat -a`.
fn status_args(license: &Path) -> Vec<OsString> {
    vec![
        OsString::from("lmstat"),
        OsString::from("-c"),
        license.as_os_str().to_os_string(),
        OsString::from("-a"),
    ]
}

/// What one tail read produced for the classifier.
#[derive(Debug)]
struct TailRead {
    /// A log exists and its lines (possibly none) were read.
    available: bool,
    /// Another reader holds the log exclusively; lines are empty.
    busy: bool,
    lines: Vec<String>,
}

impl TailRead {
    /// A busy log (exclusive reader elsewhere) is recoverable: the check
    /// proceeds on stdout alone and the condition is reported. A missing
    /// log is an empty tail. Anything else is a real failure.
    fn from_result(result: Result<Vec<String>>, file_exists: bool) -> Result<Self> {
        match result {
            Ok(lines) => Ok(Self {
                available: file_exists,
                busy: false,
                lines,
            }),
            Err(LmkError::LogBusy { .. }) => Ok(Self {
                available: false,
                busy: true,
                lines: Vec::new(),
            }),
            Err(other) => Err(other),
        }
    }
}

/// One supervisor over one configured server.
///
/// The session flags outlive the process through the store; a supervisor
/// built with [`Supervisor::new`] picks up where the previous invocation
/// left off, so a stop issued by one command still explains the down state
/// and the cooldown seen by the next.
#[derive(Debug)]
pub struct Supervisor {
    config: Config,
    os: HostOs,
    session: SupervisorSession,
    store: Option<SessionStore>,
}

impl Supervisor {
    /// Build a supervisor for the current host, restoring the persisted
    /// session state.
    pub fn new(config: Config) -> Result<Self> {
        let os = pal::detect_host_os()?;
        Ok(Self::with_store(config, os, SessionStore::default_location()))
    }

    /// A supervisor whose session lives only as long as this value.
    #[must_use]
    pub fn with_os(config: Config, os: HostOs) -> Self {
        Self {
            config,
            os,
            session: SupervisorSession::new(),
            store: None,
        }
    }

    #[must_use]
    pub fn with_store(config: Config, os: HostOs, store: SessionStore) -> Self {
        Self {
            config,
            os,
            session: store.load(),
            store: Some(store),
        }
    }

    /// Session-state persistence is best effort; a failed save costs one
    /// suppressed-alarm window, not the command.
    fn persist_session(&self) {
        if let Some(store) = &self.store
            && let Err(error) = store.save(&self.session)
        {
            eprintln!("[lmkeeper] WARNING: could not persist session state: {error}");
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn bridge(&self) -> ScmBridge<ScExe> {
        ScmBridge::new(
            ScExe,
            pal::is_elevated(),
            self.config.timing.service_wait(),
            self.config.timing.service_poll(),
        )
    }

    /// Fresh service detection. A listing failure means "no service found";
    /// the direct lifecycle path still works without the service manager.
    fn detect_service(&self) -> Option<ServiceHandle> {
        if !self.os.uses_service_manager() {
            return None;
        }
        self.bridge()
            .detect(Some(&self.config.endpoints.lmgrd_path))
            .ok()
            .flatten()
    }

    fn cooldown_refusal(&self, action: &'static str) -> Option<ActionReport> {
        self.session.cooldown_remaining().map(|remaining| {
            ActionReport {
                timestamp: Local::now(),
                action,
                via_service: None,
                outcome: ActionOutcome::CoolingDown {
                    remaining_secs: remaining.as_secs().max(1),
                },
            }
        })
    }

    /// Start the license server.
    pub fn start(&self) -> Result<ActionReport> {
        self.config.validate_endpoints()?;
        if let Some(refusal) = self.cooldown_refusal("start") {
            return Ok(refusal);
        }

        if let Some(handle) = self.detect_service() {
            self.bridge().start(&handle)?;
            self.session.note_start_requested();
            self.persist_session();
            return Ok(ActionReport {
                timestamp: Local::now(),
                action: "start",
                via_service: Some(handle.name),
                outcome: ActionOutcome::Completed,
            });
        }

        let dispatch = runner::dispatch_with_grace(
            &self.config.endpoints.lmgrd_path,
            start_args(
                &self.config.endpoints.license_path,
                &self.config.paths.server_log,
            ),
            self.config.timing.start_grace(),
        )?;

        let outcome = match dispatch {
            Dispatch::Dispatched => {
                self.session.note_start_requested();
                self.persist_session();
                ActionOutcome::Completed
            }
            // lmgrd daemonizing never exits this quickly; any exit inside
            // the grace window is a failed launch.
            Dispatch::Exited(output) => ActionOutcome::LaunchFailed {
                exit_code: output.exit_code,
                output: output.combined(),
            },
        };

        Ok(ActionReport {
            timestamp: Local::now(),
            action: "start",
            via_service: None,
            outcome,
        })
    }

    /// Stop the license server and begin the cooldown window.
    pub fn stop(&self) -> Result<ActionReport> {
        self.config.validate_endpoints()?;
        if let Some(refusal) = self.cooldown_refusal("stop") {
            return Ok(refusal);
        }

        let via_service = if let Some(handle) = self.detect_service() {
            self.bridge().stop(&handle)?;
            Some(handle.name)
        } else {
            self.run_lmdown(false)?;
            None
        };

        self.session
            .note_stop_requested(self.config.timing.stop_cooldown());
        self.persist_session();

        Ok(ActionReport {
            timestamp: Local::now(),
            action: "stop",
            via_service,
            outcome: ActionOutcome::Completed,
        })
    }

    fn run_lmdown(&self, force: bool) -> Result<CommandOutput> {
        runner::run_to_completion(
            &self.config.endpoints.lmutil_path,
            stop_args(&self.config.endpoints.license_path, force),
        )
    }

    fn run_lmstat(&self) -> Result<CommandOutput> {
        thread::sleep(self.config.timing.status_settle());
        runner::run_to_completion(
            &self.config.endpoints.lmutil_path,
            status_args(&self.config.endpoints.license_path),
        )
    }

    /// Check the server and report what it is doing and what can be done
    /// about it. May issue one forced stop when a prior stop was refused
    /// over borrowed licenses.
    pub fn status(&self) -> Result<StatusReport> {
        self.config.validate_endpoints()?;

        let service = self.detect_service();
        let log_path = resolve::resolve(
            service.as_ref(),
            &self.config.endpoints.lmgrd_path,
            &self.config.paths.server_log,
            self.os,
        );

        let mut query = self.run_lmstat()?;
        let mut tail = self.read_tail(&log_path)?;
        let mut classification =
            classifier::classify(&query, tail.available, &tail.lines, self.session.signals());

        let mut forced_stop_retried = false;
        if classification.wants_forced_stop && self.session.spend_forced_retry() {
            forced_stop_retried = true;
            self.run_lmdown(true)?;
            self.session
                .note_stop_requested(self.config.timing.stop_cooldown());
            query = self.run_lmstat()?;
            tail = self.read_tail(&log_path)?;
            classification =
                classifier::classify(&query, tail.available, &tail.lines, self.session.signals());
        }

        let usage = self.usage_for(&classification, &query, &log_path);

        self.session.note_status_completed(classification.state);
        self.persist_session();
        let ui_state = machine::ui_state(&classification, self.session.in_cooldown());
        let mut permissions = machine::permissions(ui_state, self.config.endpoints_present());
        if service.is_some() && !pal::is_elevated() {
            // A service-managed server can only be driven with elevation;
            // the status query itself needed none.
            permissions.can_start = false;
            permissions.can_stop = false;
        }

        Ok(StatusReport {
            timestamp: Local::now(),
            state: classification.state,
            ui_state,
            permissions,
            summary: classification.summary,
            alarming: classification.alarming,
            log_busy: tail.busy,
            forced_stop_retried,
            usage,
            log_path,
            service,
        })
    }

    fn read_tail(&self, log_path: &Path) -> Result<TailRead> {
        TailRead::from_result(
            tail::last_lines(log_path, CLASSIFIER_TAIL_LINES),
            log_path.is_file(),
        )
    }

    fn usage_for(
        &self,
        classification: &Classification,
        query: &CommandOutput,
        log_path: &Path,
    ) -> Option<UsageReport> {
        if classification.state != OperationalState::Up {
            return None;
        }
        let log_lines = tail::all_lines(log_path).unwrap_or_default();
        Some(usage::report(&query.stdout, &log_lines))
    }

    /// Resolved log location and its last `n` lines.
    pub fn log_report(&self, n: usize) -> Result<LogReport> {
        let service = self.detect_service();
        let path = resolve::resolve(
            service.as_ref(),
            &self.config.endpoints.lmgrd_path,
            &self.config.paths.server_log,
            self.os,
        );
        let lines = tail::last_lines(&path, n)?;
        Ok(LogReport {
            exists: path.is_file(),
            path,
            lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn os_strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn start_args_append_to_the_log() {
        let args = start_args(Path::new("/opt/flexlm/lic.dat"), Path::new("/var/log/lm.txt"));
        assert_eq!(
            os_strings(&args),
            vec!["-c", "/opt/flexlm/lic.dat", "-l", "+/var/log/lm.txt"]
        );
    }

    #[test]
    fn stop_args_are_quiet_and_optionally_forced() {
        let plain = stop_args(Path::new("lic.dat"), false);
        assert_eq!(os_strings(&plain), vec!["lmdown", "-c", "lic.dat", "-q"]);

        let forced = stop_args(Path::new("lic.dat"), true);
        assert_eq!(
            os_strings(&forced),
            vec!["lmdown", "-c", "lic.dat", "-q", "-force"]
        );
    }

    #[test]
    fn status_args_query_all_features() {
        let args = status_args(Path::new("lic.dat"));
        assert_eq!(os_strings(&args), vec!["lmstat", "-c", "lic.dat", "-a"]);
    }

    #[test]
    fn operations_refuse_with_missing_endpoints() {
        let supervisor = Supervisor::with_os(Config::default(), HostOs::Linux);
        for result in [
            supervisor.start().map(|_| ()),
            supervisor.stop().map(|_| ()),
            supervisor.status().map(|_| ()),
        ] {
            let err = result.expect_err("blank endpoints must refuse");
            assert!(matches!(err, LmkError::MissingFile { .. }));
        }
    }

    #[test]
    fn cooldown_refuses_start_and_stop_without_touching_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        for (slot, name) in [
            (&mut config.endpoints.lmgrd_path, "lmgrd"),
            (&mut config.endpoints.lmutil_path, "lmutil"),
            (&mut config.endpoints.license_path, "license.dat"),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"").unwrap();
            *slot = path;
        }

        let supervisor = Supervisor::with_os(config, HostOs::Linux);
        supervisor
            .session
            .note_stop_requested(Duration::from_secs(60));

        let report = supervisor.start().expect("cooldown is not an error");
        assert!(matches!(
            report.outcome,
            ActionOutcome::CoolingDown { remaining_secs } if remaining_secs > 0
        ));

        let report = supervisor.stop().expect("cooldown is not an error");
        assert!(matches!(report.outcome, ActionOutcome::CoolingDown { .. }));
    }

    #[test]
    fn linux_host_never_consults_the_service_manager() {
        let supervisor = Supervisor::with_os(Config::default(), HostOs::Linux);
        assert!(supervisor.detect_service().is_none());
    }

    #[test]
    fn persisted_cooldown_survives_a_rebuilt_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        for (slot, name) in [
            (&mut config.endpoints.lmgrd_path, "lmgrd"),
            (&mut config.endpoints.lmutil_path, "lmutil"),
            (&mut config.endpoints.license_path, "license.dat"),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"").unwrap();
            *slot = path;
        }
        let store = SessionStore::new(dir.path().join("session.json"));

        // One invocation stops the server and saves the session.
        let session = SupervisorSession::new();
        session.note_stop_requested(Duration::from_secs(60));
        store.save(&session).unwrap();

        // The next invocation is a new process with a new supervisor; the
        // cooldown still holds.
        let supervisor = Supervisor::with_store(config, HostOs::Linux, store);
        let report = supervisor.start().expect("cooldown is not an error");
        assert!(matches!(report.outcome, ActionOutcome::CoolingDown { .. }));
    }

    #[test]
    fn busy_log_is_reported_without_failing_the_read() {
        let busy = TailRead::from_result(
            Err(LmkError::LogBusy {
                path: PathBuf::from("lmlog.txt"),
            }),
            true,
        )
        .expect("a busy log is recoverable");
        assert!(busy.busy);
        assert!(!busy.available);
        assert!(busy.lines.is_empty());

        let read = TailRead::from_result(Ok(vec!["line".to_string()]), true)
            .expect("a readable log is fine");
        assert!(!read.busy);
        assert!(read.available);

        let other = TailRead::from_result(
            Err(LmkError::Runtime {
                details: String::new(),
            }),
            true,
        );
        assert!(other.is_err(), "real failures still propagate");
    }
}
