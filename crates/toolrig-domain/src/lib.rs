//! Pure domain logic (L1): risk classification, DAG validation, error
//! taxonomy classification, version constraints, rollback synthesis, and
//! restart detection. No I/O; every function here is a pure function of
//! its inputs.

pub mod dag;
pub mod errors_taxonomy;
pub mod restart;
pub mod risk;
pub mod rollback;
pub mod version_constraint;

pub use dag::{ready_steps, topo_order, validate_dag};
pub use errors_taxonomy::classify;
pub use restart::{pause_instructions, requires_pause, strongest_requirement};
pub use risk::{confirmation_gate_for, infer_step_risk, summarize_risk};
pub use rollback::{inverse_step, synthesize_rollback};
pub use version_constraint::{Constraint, Version, evaluate, parse_constraint};
