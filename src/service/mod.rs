//! OS service integration: SCM bridge for a detected lmgrd service, and
//! registration/removal of a managed service.

pub mod scm;
pub mod setup;
