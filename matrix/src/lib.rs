//! Dose-fluence matrix assembly.
//!
//! Given dose-evaluation points, a set of [`Beamlet`]s, an
//! [`ExternalSurface`] model of the patient skin and a [`DoseKernel`], this
//! crate assembles the matrix `D[i, j]` holding the dose contribution of
//! beamlet `j` at point `i`. Entry point is [`dose_fluence_matrix`].

pub mod assembly;
mod beamlet;
mod error;
mod kernel;
pub mod surface;

pub use assembly::{
    dose_fluence_matrix, dose_fluence_matrix_into, DoseFluenceMatrix, MatrixKind, Options,
};
pub use beamlet::{beamlet_grid, inside_cone, Beamlet, Jaws};
pub use error::Error;
pub use kernel::{point_dose, DoseKernel};
pub use surface::{
    ConstantSurface, CylindricalSurface, DeviceSurface, ExternalSurface, LinearSurface,
    MeshSurface, PlaneSurface, SurfacePlane,
};
