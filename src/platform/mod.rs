//! Platform abstraction: host-OS detection and elevation.

pub mod pal;
