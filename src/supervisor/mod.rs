//! Lifecycle orchestration: the supervisor engine, its per-session flags
//! and their on-disk store, and the action-gating state machine.

pub mod engine;
pub mod machine;
pub mod session;
pub mod store;
