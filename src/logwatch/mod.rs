//! Locating and reading the lmgrd debug log.

pub mod resolve;
pub mod tail;
