//! Per-channel flood-fill lighting over the chunk matrix: colored block light
//! from emitters and sky light from above.

pub mod lighting;
pub mod solver;

pub use lighting::{Lighting, prebuild_sky_light};
pub use solver::{LightSolver, RemovalJob, SpreadJob};
