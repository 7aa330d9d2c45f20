//! Recipe catalog: schema, loading, validation, and template substitution
//! (L0 of the plan pipeline).

pub mod loader;
pub mod substitute;
pub mod validate;

pub use loader::{Catalog, load_dir};
pub use substitute::{SubstitutionContext, substitute_command};
pub use validate::validate_catalog;
