//! Build resource accounting: parallelism capping and disk/RAM preflight
//! checks ahead of a `build` step (§4.4, §5).

pub mod parallelism;
pub mod preflight;

pub use parallelism::{build_parallelism_cap, ccache_available};
pub use preflight::{PreflightReport, check_build_preflight};
