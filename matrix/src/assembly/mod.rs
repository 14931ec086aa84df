use nalgebra::{DMatrix, Point3};
use nalgebra_sparse::CscMatrix;
use tracing::instrument;

mod dense;
#[cfg(feature = "gpu")]
mod gpu;
mod sparse;

pub use dense::fill_dense;
#[cfg(feature = "gpu")]
pub use gpu::assemble_dense_gpu;
pub use sparse::{assemble_csc, assemble_csc_with_buffers};

use crate::beamlet::Beamlet;
use crate::error::Error;
use crate::kernel::DoseKernel;
use crate::surface::ExternalSurface;

/// Back end selector for [`dose_fluence_matrix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixKind {
    /// Full matrix filled on the CPU.
    Dense,
    /// Compressed sparse column matrix, culled pairs not stored.
    SparseCsc,
    /// Full matrix filled on a GPU device (feature `gpu`).
    DenseGpu,
}

/// Assembled dose-fluence matrix of shape `(|points|, |beamlets|)`.
#[derive(Clone, Debug, PartialEq)]
pub enum DoseFluenceMatrix {
    Dense(DMatrix<f64>),
    SparseCsc(CscMatrix<f64>),
}

impl DoseFluenceMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            DoseFluenceMatrix::Dense(m) => m.nrows(),
            DoseFluenceMatrix::SparseCsc(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            DoseFluenceMatrix::Dense(m) => m.ncols(),
            DoseFluenceMatrix::SparseCsc(m) => m.ncols(),
        }
    }

    /// Stored entry count: all cells for dense, survivors for sparse.
    pub fn stored_entries(&self) -> usize {
        match self {
            DoseFluenceMatrix::Dense(m) => m.len(),
            DoseFluenceMatrix::SparseCsc(m) => m.nnz(),
        }
    }

    /// The dense matrix, densifying a sparse one if necessary.
    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            DoseFluenceMatrix::Dense(m) => m.clone(),
            DoseFluenceMatrix::SparseCsc(m) => {
                let mut dense = DMatrix::zeros(m.nrows(), m.ncols());
                for (i, j, v) in m.triplet_iter() {
                    dense[(i, j)] = *v;
                }
                dense
            }
        }
    }
}

/// Assembly options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Options {
    /// Radius of the culling cone on the isocenter plane, in the same
    /// length units as the geometry.
    pub maxradius: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self { maxradius: 100.0 }
    }
}

/// Assembles the dose-fluence matrix `D[i, j]`, the dose contribution of
/// beamlet `j` at point `i`.
///
/// Storage is allocated according to `kind` and filled by the matching back
/// end; all back ends cull with the same cone predicate, so the dense and
/// sparse results agree entry for entry.
///
/// # Errors
///
/// The CPU back ends do not fail. [`MatrixKind::DenseGpu`] fails when the
/// crate was built without the `gpu` feature, when kernel or surface have no
/// device translation, or when no GPU device is available.
#[instrument(level = "debug", skip_all, fields(points = points.len(), beamlets = beamlets.len(), ?kind))]
pub fn dose_fluence_matrix<K, S>(
    kind: MatrixKind,
    points: &[Point3<f64>],
    beamlets: &[Beamlet],
    surface: &S,
    kernel: &K,
    options: &Options,
) -> Result<DoseFluenceMatrix, Error>
where
    K: DoseKernel,
    S: ExternalSurface,
{
    match kind {
        MatrixKind::Dense => {
            let mut matrix = DMatrix::zeros(points.len(), beamlets.len());
            fill_dense(&mut matrix, points, beamlets, surface, kernel, options.maxradius);
            Ok(DoseFluenceMatrix::Dense(matrix))
        }
        MatrixKind::SparseCsc => {
            let matrix =
                assemble_csc(points, beamlets, surface, kernel, options.maxradius)?;
            Ok(DoseFluenceMatrix::SparseCsc(matrix))
        }
        #[cfg(feature = "gpu")]
        MatrixKind::DenseGpu => {
            let matrix = assemble_dense_gpu(points, beamlets, surface, kernel, options.maxradius)?;
            Ok(DoseFluenceMatrix::Dense(matrix))
        }
        #[cfg(not(feature = "gpu"))]
        MatrixKind::DenseGpu => Err(Error::GpuDisabled),
    }
}

/// In-place variant of [`dose_fluence_matrix`]: reassembles into an existing
/// matrix, reusing its allocations where possible.
///
/// The matrix is resized to `(|points|, |beamlets|)`; its previous contents
/// are discarded. The back end is chosen by the matrix variant.
pub fn dose_fluence_matrix_into<K, S>(
    matrix: &mut DoseFluenceMatrix,
    points: &[Point3<f64>],
    beamlets: &[Beamlet],
    surface: &S,
    kernel: &K,
    options: &Options,
) -> Result<(), Error>
where
    K: DoseKernel,
    S: ExternalSurface,
{
    match matrix {
        DoseFluenceMatrix::Dense(m) => {
            m.resize_mut(points.len(), beamlets.len(), 0.0);
            fill_dense(m, points, beamlets, surface, kernel, options.maxradius);
        }
        DoseFluenceMatrix::SparseCsc(m) => {
            let previous = std::mem::replace(m, CscMatrix::zeros(0, 0));
            let (colptr, rowval, nzval) = previous.disassemble();
            *m = assemble_csc_with_buffers(
                colptr,
                rowval,
                nzval,
                points,
                beamlets,
                surface,
                kernel,
                options.maxradius,
            )?;
        }
    }
    debug_assert_eq!(matrix.nrows(), points.len());
    debug_assert_eq!(matrix.ncols(), beamlets.len());
    Ok(())
}
