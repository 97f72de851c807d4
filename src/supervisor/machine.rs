//! Mapping classifications onto the supervisor's action gates.
//!
//! The control surface exposes three actions (start, stop, status); which of
//! them is offered at any moment is a pure function of the last
//! classification, the cooldown window, and whether the endpoint files are
//! in place.

use serde::Serialize;

use crate::status::classifier::{Classification, OperationalState};

/// What the supervisor is prepared to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UiState {
    /// Server is down; a start would be meaningful.
    CanStart,
    /// Server is up or partially up; a stop would be meaningful.
    CanStop,
    /// A recent stop is still cooling down; all actions refused.
    Busy,
    /// lmgrd is retrying its own launch; interfering would only race it.
    Transitioning,
    /// No confident reading; both actions stay available.
    Unknown,
}

/// Concrete gate per action, for callers that render buttons or refuse
/// commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionPermissions {
    pub can_start: bool,
    pub can_stop: bool,
    pub can_check_status: bool,
}

/// Fold a classification and the cooldown into the next [`UiState`].
///
/// Cooldown dominates everything: whatever the server looks like, poking it
/// again before the port frees just reproduces the failure being waited out.
#[must_use]
pub fn ui_state(classification: &Classification, in_cooldown: bool) -> UiState {
    if in_cooldown {
        return UiState::Busy;
    }
    if classification.self_restarting {
        return UiState::Transitioning;
    }
    match classification.state {
        OperationalState::Up | OperationalState::PartiallyUp => UiState::CanStop,
        OperationalState::Down => UiState::CanStart,
        OperationalState::Unknown => UiState::Unknown,
    }
}

/// Which actions the state admits. With endpoint files missing nothing can
/// run, whatever the state claims; while busy or transitioning even a status
/// query would only race the operation in flight.
#[must_use]
pub const fn permissions(state: UiState, endpoints_present: bool) -> ActionPermissions {
    if !endpoints_present {
        return ActionPermissions {
            can_start: false,
            can_stop: false,
            can_check_status: false,
        };
    }
    match state {
        UiState::CanStart => ActionPermissions {
            can_start: true,
            can_stop: false,
            can_check_status: true,
        },
        UiState::CanStop => ActionPermissions {
            can_start: false,
            can_stop: true,
            can_check_status: true,
        },
        UiState::Busy | UiState::Transitioning => ActionPermissions {
            can_start: false,
            can_stop: false,
            can_check_status: false,
        },
        UiState::Unknown => ActionPermissions {
            can_start: true,
            can_stop: true,
            can_check_status: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(state: OperationalState, self_restarting: bool) -> Classification {
        Classification {
            state,
            summary: String::new(),
            alarming: false,
            wants_forced_stop: false,
            self_restarting,
        }
    }

    #[test]
    fn states_map_to_their_action() {
        assert_eq!(
            ui_state(&classified(OperationalState::Up, false), false),
            UiState::CanStop
        );
        assert_eq!(
            ui_state(&classified(OperationalState::PartiallyUp, false), false),
            UiState::CanStop
        );
        assert_eq!(
            ui_state(&classified(OperationalState::Down, false), false),
            UiState::CanStart
        );
        assert_eq!(
            ui_state(&classified(OperationalState::Unknown, false), false),
            UiState::Unknown
        );
    }

    #[test]
    fn cooldown_overrides_everything() {
        for state in [
            OperationalState::Up,
            OperationalState::Down,
            OperationalState::PartiallyUp,
            OperationalState::Unknown,
        ] {
            assert_eq!(ui_state(&classified(state, false), true), UiState::Busy);
            assert_eq!(ui_state(&classified(state, true), true), UiState::Busy);
        }
    }

    #[test]
    fn self_restart_maps_to_transitioning() {
        assert_eq!(
            ui_state(&classified(OperationalState::PartiallyUp, true), false),
            UiState::Transitioning
        );
    }

    #[test]
    fn permission_truth_table() {
        for (state, start, stop, status) in [
            (UiState::CanStart, true, false, true),
            (UiState::CanStop, false, true, true),
            (UiState::Busy, false, false, false),
            (UiState::Transitioning, false, false, false),
            (UiState::Unknown, true, true, true),
        ] {
            let perms = permissions(state, true);
            assert_eq!(perms.can_start, start, "start for {state:?}");
            assert_eq!(perms.can_stop, stop, "stop for {state:?}");
            assert_eq!(perms.can_check_status, status, "status for {state:?}");

            let gated = permissions(state, false);
            assert!(!gated.can_start, "missing endpoints gate start, {state:?}");
            assert!(!gated.can_stop, "missing endpoints gate stop, {state:?}");
            assert!(
                !gated.can_check_status,
                "missing endpoints gate status, {state:?}"
            );
        }
    }
}
