//! The two-pass resolver (L3): choice resolution, install-plan
//! construction, and remediation-tree building.

pub mod choices;
pub mod plan;
pub mod remediation;

pub use choices::{ChoiceResolution, ResolvedChoice, resolve_choices};
pub use plan::{ResolveRequest, resolve_install_plan};
pub use remediation::{
    Availability, RemediationOption, RemediationStrategy, RemediationTree, UnlockPreview,
    build_remediation,
};
