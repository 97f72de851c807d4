//! External-process plumbing: spawning FlexLM binaries, parsing their
//! command lines, and enumerating running lmgrd instances.

pub mod cmdline;
pub mod enumerate;
pub mod runner;
