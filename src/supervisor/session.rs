//! Per-session supervisor flags.
//!
//! The classifier needs to know whether an apparently-bad server state was
//! actually provoked by us: a server that is down because we just asked it
//! to stop is not an incident. Each flag is cleared once the state it
//! explains has been observed. The flags survive between invocations through
//! [`SessionSnapshot`] and the session store; the supervisor spans as many
//! process runs as the server lifecycle it is tracking.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::status::classifier::{OperationalState, SessionSignals};

#[derive(Debug)]
struct Flags {
    /// True until the first status check completes; failures and down states
    /// seen before then are expected, not alarming.
    just_launched: bool,
    /// Set by a deliberate stop; cleared by the next start or by the first
    /// Down classification that the stop explains.
    stop_requested: bool,
    /// The one forced `-force` stop retry this server run is allowed.
    forced_stop_spent: bool,
    /// Start/stop actions stay refused until this wall-clock second.
    cooldown_until_unix: Option<u64>,
}

/// Serializable image of the session flags, for the on-disk session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub first_check_done: bool,
    pub stop_requested: bool,
    pub forced_stop_spent: bool,
    pub cooldown_until_unix_secs: Option<u64>,
}

/// Shared, thread-safe session state.
#[derive(Debug)]
pub struct SupervisorSession {
    flags: Mutex<Flags>,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

impl Default for SupervisorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                just_launched: true,
                stop_requested: false,
                forced_stop_spent: false,
                cooldown_until_unix: None,
            }),
        }
    }

    /// Rebuild a session from a stored snapshot.
    #[must_use]
    pub fn restore(snapshot: &SessionSnapshot) -> Self {
        Self {
            flags: Mutex::new(Flags {
                just_launched: !snapshot.first_check_done,
                stop_requested: snapshot.stop_requested,
                forced_stop_spent: snapshot.forced_stop_spent,
                cooldown_until_unix: snapshot.cooldown_until_unix_secs,
            }),
        }
    }

    /// Image of the current flags for the session store.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let flags = self.flags.lock();
        SessionSnapshot {
            first_check_done: !flags.just_launched,
            stop_requested: flags.stop_requested,
            forced_stop_spent: flags.forced_stop_spent,
            cooldown_until_unix_secs: flags.cooldown_until_unix,
        }
    }

    /// Snapshot for the classifier.
    #[must_use]
    pub fn signals(&self) -> SessionSignals {
        let flags = self.flags.lock();
        SessionSignals {
            just_launched: flags.just_launched,
            stop_requested: flags.stop_requested,
            force_retry_armed: !flags.forced_stop_spent,
        }
    }

    /// A start was issued; any prior stop no longer explains a down server,
    /// and the new server run gets a fresh one-shot forced-stop retry.
    pub fn note_start_requested(&self) {
        let mut flags = self.flags.lock();
        flags.stop_requested = false;
        flags.forced_stop_spent = false;
    }

    /// A deliberate stop was issued; begin the cooldown window.
    pub fn note_stop_requested(&self, cooldown: Duration) {
        let mut flags = self.flags.lock();
        flags.stop_requested = true;
        flags.cooldown_until_unix = Some(now_unix().saturating_add(cooldown.as_secs()));
    }

    /// A status check ran to completion and classified the server as
    /// `observed`. The first completed check ends the launch window; the
    /// first observed Down is the one a prior deliberate stop explains, so
    /// the stop flag is spent on it. A later unexplained Down must alarm.
    pub fn note_status_completed(&self, observed: OperationalState) {
        let mut flags = self.flags.lock();
        flags.just_launched = false;
        if observed == OperationalState::Down {
            flags.stop_requested = false;
        }
    }

    /// Consume the one forced-stop retry. Returns false if already spent.
    pub fn spend_forced_retry(&self) -> bool {
        let mut flags = self.flags.lock();
        if flags.forced_stop_spent {
            false
        } else {
            flags.forced_stop_spent = true;
            true
        }
    }

    /// Remaining cooldown, if any is still in effect.
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let until = self.flags.lock().cooldown_until_unix?;
        let now = now_unix();
        (until > now).then(|| Duration::from_secs(until - now))
    }

    #[must_use]
    pub fn in_cooldown(&self) -> bool {
        self.cooldown_remaining().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_just_launched_with_retry_armed() {
        let session = SupervisorSession::new();
        let signals = session.signals();
        assert!(signals.just_launched);
        assert!(!signals.stop_requested);
        assert!(signals.force_retry_armed);
        assert!(!session.in_cooldown());
    }

    #[test]
    fn first_completed_status_clears_just_launched() {
        let session = SupervisorSession::new();
        session.note_status_completed(OperationalState::Up);
        assert!(!session.signals().just_launched);
    }

    #[test]
    fn start_clears_a_prior_stop_request() {
        let session = SupervisorSession::new();
        session.note_stop_requested(Duration::ZERO);
        assert!(session.signals().stop_requested);
        session.note_start_requested();
        assert!(!session.signals().stop_requested);
    }

    #[test]
    fn observing_down_once_spends_the_stop_request() {
        let session = SupervisorSession::new();
        session.note_status_completed(OperationalState::Up);
        session.note_stop_requested(Duration::ZERO);
        assert!(session.signals().stop_requested);

        // The Down the stop explains: flag consumed.
        session.note_status_completed(OperationalState::Down);
        assert!(!session.signals().stop_requested);
    }

    #[test]
    fn non_down_states_leave_the_stop_request_in_place() {
        let session = SupervisorSession::new();
        session.note_stop_requested(Duration::ZERO);
        for state in [
            OperationalState::Up,
            OperationalState::PartiallyUp,
            OperationalState::Unknown,
        ] {
            session.note_status_completed(state);
            assert!(session.signals().stop_requested, "after {state:?}");
        }
    }

    #[test]
    fn forced_retry_is_one_shot_until_the_next_start() {
        let session = SupervisorSession::new();
        assert!(session.spend_forced_retry());
        assert!(!session.spend_forced_retry());
        assert!(!session.signals().force_retry_armed);

        // A new server run re-arms the retry.
        session.note_start_requested();
        assert!(session.signals().force_retry_armed);
        assert!(session.spend_forced_retry());
    }

    #[test]
    fn stop_starts_the_cooldown_window() {
        let session = SupervisorSession::new();
        session.note_stop_requested(Duration::from_secs(60));
        assert!(session.in_cooldown());
        let remaining = session.cooldown_remaining().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(55));
    }

    #[test]
    fn zero_cooldown_expires_immediately() {
        let session = SupervisorSession::new();
        session.note_stop_requested(Duration::ZERO);
        assert!(!session.in_cooldown());
    }

    #[test]
    fn snapshot_round_trips_every_flag() {
        let session = SupervisorSession::new();
        session.note_status_completed(OperationalState::Up);
        session.note_stop_requested(Duration::from_secs(60));
        assert!(session.spend_forced_retry());

        let restored = SupervisorSession::restore(&session.snapshot());
        let signals = restored.signals();
        assert!(!signals.just_launched);
        assert!(signals.stop_requested);
        assert!(!signals.force_retry_armed);
        assert!(restored.in_cooldown());
        assert_eq!(restored.snapshot(), session.snapshot());
    }
}
