//! Interpreting lmstat output: up/down classification and seat-usage
//! reporting.

pub mod classifier;
pub mod patterns;
pub mod usage;
