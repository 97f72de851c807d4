//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use lmkeeper::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{LmkError, Result};

// Platform
pub use crate::platform::pal::{HostOs, detect_host_os, is_elevated};

// Status
pub use crate::status::classifier::{Classification, OperationalState, SessionSignals};
pub use crate::status::usage::{SeatUsage, UsageReport};

// Service manager
pub use crate::service::scm::{ScmBridge, ServiceHandle, ServiceState};
pub use crate::service::setup::ServiceSetup;

// Supervisor
pub use crate::supervisor::engine::{ActionReport, LogReport, StatusReport, Supervisor};
pub use crate::supervisor::machine::{ActionPermissions, UiState};
pub use crate::supervisor::session::SupervisorSession;
pub use crate::supervisor::store::SessionStore;
