//! Ordered classification of lmstat output plus the log tail.
//!
//! The decision procedure is a top-to-bottom ladder; rule order encodes
//! precedence of diagnosis specificity over generality and must not be
//! reshuffled. Everything here is a pure function of the query outcome, the
//! last 20 log lines, and the transient session flags.

use serde::Serialize;

use crate::proc::runner::CommandOutput;
use crate::status::patterns;

/// What state the license server is actually in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalState {
    /// lmgrd and the vendor daemon are both serving.
    Up,
    /// Nothing is serving.
    Down,
    /// lmgrd is up but the vendor daemon is not.
    PartiallyUp,
    /// The signals contradict each other or the query itself failed.
    Unknown,
}

/// Session flags the classifier consumes, extracted from the supervisor's
/// session so this module stays pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSignals {
    /// The supervisor session just began; expected "down" states are benign.
    pub just_launched: bool,
    /// A deliberate stop was just requested.
    pub stop_requested: bool,
    /// The one-shot forced-stop retry has not been spent yet.
    pub force_retry_armed: bool,
}

/// Result of one classification pass.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub state: OperationalState,
    /// Human-readable diagnosis.
    pub summary: String,
    /// Whether the condition warrants an alert rather than plain status text.
    pub alarming: bool,
    /// The prior stop failed on borrowed licenses; the supervisor should
    /// re-issue the stop once with `-force` before reporting.
    pub wants_forced_stop: bool,
    /// lmgrd is holding its port-retry loop; the server may come up on its
    /// own within minutes, so actions should stay disabled.
    pub self_restarting: bool,
}

impl Classification {
    fn plain(state: OperationalState, summary: impl Into<String>) -> Self {
        Self {
            state,
            summary: summary.into(),
            alarming: false,
            wants_forced_stop: false,
            self_restarting: false,
        }
    }

    fn alarm(state: OperationalState, summary: impl Into<String>) -> Self {
        Self {
            alarming: true,
            ..Self::plain(state, summary)
        }
    }
}

fn tail_has(tail: &[String], needle: &str) -> bool {
    tail.iter().any(|line| line.contains(needle))
}

/// Classify one status query.
///
/// `log_available` distinguishes "the log exists but its tail matched
/// nothing" from "there is no log to consult" — the latter suppresses the
/// log-specific diagnoses entirely.
#[must_use]
pub fn classify(
    query: &CommandOutput,
    log_available: bool,
    tail: &[String],
    signals: SessionSignals,
) -> Classification {
    if !query.success() {
        return classify_failed_query(log_available, tail, signals);
    }

    let stdout = &query.stdout;

    if stdout.contains(patterns::NOT_RUNNING) {
        // A -16,287 read failure can accompany this marker right after a
        // lifecycle action; the settle delay makes it benign, so it is
        // recognized here and deliberately not acted on.
        return classify_down(log_available, tail, signals);
    }

    if stdout.contains(patterns::SERVER_UP_MASTER) && stdout.contains(patterns::VENDOR_UP) {
        if tail_has(tail, patterns::REDO_LMDOWN_FORCE)
            && tail_has(tail, patterns::LICENSES_BORROWED)
            && signals.stop_requested
            && signals.force_retry_armed
        {
            let mut c = Classification::plain(
                OperationalState::Up,
                "The previous stop was refused because licenses are borrowed; retrying the stop with -force.",
            );
            c.wants_forced_stop = true;
            return c;
        }
        return Classification::plain(OperationalState::Up, "The license server is up.");
    }

    if stdout.contains(patterns::SERVER_UP_MASTER) && !stdout.contains(patterns::VENDOR_UP) {
        return classify_partial(stdout, tail);
    }

    Classification::plain(
        OperationalState::Unknown,
        "The license server's status could not be determined from the query output.",
    )
}

fn classify_failed_query(
    log_available: bool,
    tail: &[String],
    signals: SessionSignals,
) -> Classification {
    if signals.just_launched {
        // Expected transient right after the supervisor starts.
        return Classification::plain(
            OperationalState::Unknown,
            "The status check could not run yet.",
        );
    }

    if log_available && tail_has(tail, patterns::INVALID_LICENSE_SYNTAX) {
        return Classification::alarm(
            OperationalState::Down,
            "The status check failed: your license file is improperly formatted. Check the \
             SERVER and DAEMON lines for formatting errors, and make sure you have permission \
             to execute lmgrd, MLM, and lmutil.",
        );
    }

    Classification::alarm(
        OperationalState::Unknown,
        "The status check command failed. Check your license and log file for errors, such as \
         a missing or misformatted SERVER line, and make sure you have permission to execute \
         lmgrd, MLM, and lmutil.",
    )
}

fn classify_down(log_available: bool, tail: &[String], signals: SessionSignals) -> Classification {
    if !log_available {
        if signals.stop_requested || signals.just_launched {
            return Classification::plain(OperationalState::Down, "The license server is down.");
        }
        return Classification::alarm(
            OperationalState::Down,
            "The license server is down. Check the log file for more information.",
        );
    }

    if signals.just_launched {
        return Classification::plain(OperationalState::Down, "The license server is down.");
    }

    if tail_has(tail, patterns::PORT_OPEN_FAILED) {
        return Classification::alarm(
            OperationalState::Down,
            "The license server is down. lmgrd's port could not be opened. You either just \
             recently shut down the server and the port has not freed yet, don't have \
             permission to open the port, or it's being used by something else. Waiting \
             longer often suffices; on Linux, TCP port 27011 is a good alternative.",
        );
    }

    if tail_has(tail, patterns::INVALID_HOSTNAME)
        || (tail_has(tail, patterns::UNKNOWN_HOSTNAME)
            && tail_has(tail, patterns::HOSTNAME_NOT_IN_DATABASE))
    {
        return Classification::alarm(
            OperationalState::Down,
            "The license server is down. The hostname in your license file's SERVER line is invalid.",
        );
    }

    if tail_has(tail, patterns::MISSING_DAEMON_LINE) {
        return Classification::alarm(
            OperationalState::Down,
            "The license server did not start because the DAEMON line is missing from your license file.",
        );
    }

    if tail_has(tail, patterns::PORT_IN_USE_PREFIX) && tail_has(tail, patterns::PORT_IN_USE_SUFFIX)
    {
        return Classification::alarm(
            OperationalState::Down,
            "The license server is down. The primary port number is still in use, most likely \
             because it has not yet been freed from the previous run. Try starting the server \
             again in 30 seconds.",
        );
    }

    if tail_has(tail, patterns::LISTENER_RUNNING) {
        // The vendor daemon says it is listening while lmstat says nothing
        // runs; the host likely cannot resolve its own hostname.
        return Classification::alarm(
            OperationalState::Unknown,
            "The license server may be running, but the status query reports it as down. Your \
             network is likely misconfigured in a way that prevents this computer from \
             resolving its own hostname or IP address. See the log file for details.",
        );
    }

    let clean_shutdown = tail_has(tail, patterns::EXITING_SIGNAL_15)
        && tail_has(tail, patterns::VENDOR_SHUTDOWN_REQUESTED);
    if signals.stop_requested || signals.just_launched || clean_shutdown {
        return Classification::plain(OperationalState::Down, "The license server is down.");
    }

    Classification::alarm(
        OperationalState::Down,
        "The license server is down. Check the log file for more information.",
    )
}

fn classify_partial(stdout: &str, tail: &[String]) -> Classification {
    if stdout.contains(patterns::VENDOR_NO_SOCKET) {
        if tail_has(tail, patterns::PORT_IN_USE_PREFIX)
            && tail_has(tail, patterns::PORT_IN_USE_SUFFIX)
            && tail_has(tail, patterns::RETRYING_FIVE_MINUTES)
        {
            let mut c = Classification::alarm(
                OperationalState::PartiallyUp,
                "The license server is down. The primary port number is still in use; lmgrd has \
                 recognized this and will keep retrying the launch for about 5 minutes. Check \
                 the status again in 30 seconds.",
            );
            c.self_restarting = true;
            return c;
        }

        if tail_has(tail, patterns::PORT_OPEN_FAILED) {
            return Classification::plain(
                OperationalState::PartiallyUp,
                "lmgrd was able to start, but MLM could not: lmgrd's port could not be opened. \
                 You either just recently shut down the server and the port has not freed yet, \
                 don't have permission to open the port, or it's being used by something else.",
            );
        }

        if tail_has(tail, patterns::VENDOR_EXIT_STATUS_36) {
            return Classification::plain(
                OperationalState::PartiallyUp,
                "lmgrd was able to start, but MLM could not: none of the products in your \
                 license file are valid (are you using a license for a different computer?). \
                 Check the log file for specifics.",
            );
        }

        if tail_has(tail, patterns::VENDOR_EXIT_STATUS_27) {
            return Classification::plain(
                OperationalState::PartiallyUp,
                "lmgrd was able to start, but MLM could not. This can be caused by a syntax \
                 error in the license file, MLM's port being used by another MLM instance, an \
                 expired license file or wrong system clock, pointing at an individual license \
                 by mistake, or mixing incompatible license manager installations in one folder.",
            );
        }

        if tail_has(tail, patterns::VENDOR_EXIT_CORRUPT) {
            return Classification::plain(
                OperationalState::PartiallyUp,
                "lmgrd was able to start, but MLM could not: MLM is likely corrupted. Obtain a \
                 fresh copy; on Linux, extract archives with 'unzip' rather than a GUI tool.",
            );
        }

        if tail_has(tail, patterns::VENDOR_DEFAULT_LICENSE) {
            return Classification::plain(
                OperationalState::PartiallyUp,
                "MLM attempted to use its compiled-in default license file, which does not \
                 exist. Place MLM in a directory this program can access, such as next to your \
                 license file.",
            );
        }
    }

    Classification::plain(
        OperationalState::PartiallyUp,
        "lmgrd was able to start, but MLM could not. Stop the server or end the process manually.",
    )
}
