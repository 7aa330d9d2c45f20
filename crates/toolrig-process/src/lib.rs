//! Subprocess execution (L4 support): runs a single step's argv under a
//! timeout, optionally piping a sudo password and streaming progress.

pub mod runner;

pub use runner::{RunOutcome, RunSpec, run};
