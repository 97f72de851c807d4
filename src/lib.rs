#![forbid(unsafe_code)]

//! lmkeeper — supervisor for FlexLM-style license servers.
//!
//! Keeps one lmgrd/MLM daemon pair alive and understood:
//! 1. **Lifecycle** — starts and stops the server, directly or through the
//!    OS service manager when the server is registered there
//! 2. **Diagnosis** — classifies `lmstat` output plus the debug-log tail
//!    into a concrete state with a concrete remediation
//! 3. **Usage** — reports per-product seat counts and root causes for
//!    products the server refuses to serve
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use lmkeeper::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use lmkeeper::core::config::Config;
//! use lmkeeper::supervisor::engine::Supervisor;
//! ```

pub mod prelude;

pub mod core;
pub mod logwatch;
pub mod platform;
pub mod proc;
pub mod service;
pub mod status;
pub mod supervisor;
