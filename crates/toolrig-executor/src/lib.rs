//! Step dispatch (L4): turns one [`Step`] into a subprocess run (or, for
//! `shell_config`, a direct filesystem edit) and classifies failures.

pub mod asset_fetch;
pub mod dispatch;
pub mod shell_append;

pub use dispatch::{ExecutionContext, StepOutcome, execute_step};
