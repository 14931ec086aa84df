use nalgebra::{DMatrix, Point3};
use rayon::prelude::*;
use tracing::debug;

use crate::beamlet::Beamlet;
use crate::kernel::{point_dose, DoseKernel};
use crate::surface::ExternalSurface;

/// Fills a dense dose-fluence matrix on the CPU.
///
/// The matrix is column-major, so the parallel partition runs over whole
/// columns: each worker owns the contiguous slice of one beamlet's column
/// and walks the points in order. Every cell goes through the culled
/// [`point_dose`] wrapper; culled cells store exactly `0.0`. Nothing is
/// allocated after the output has been sized.
///
/// # Panics
///
/// Panics when the matrix shape is not `(|points|, |beamlets|)`.
pub fn fill_dense<K, S>(
    matrix: &mut DMatrix<f64>,
    points: &[Point3<f64>],
    beamlets: &[Beamlet],
    surface: &S,
    kernel: &K,
    maxradius: f64,
) where
    K: DoseKernel,
    S: ExternalSurface,
{
    assert_eq!(matrix.nrows(), points.len(), "matrix row count");
    assert_eq!(matrix.ncols(), beamlets.len(), "matrix column count");
    if points.is_empty() || beamlets.is_empty() {
        return;
    }

    let nrows = points.len();
    matrix
        .as_mut_slice()
        .par_chunks_mut(nrows)
        .zip(beamlets.par_iter())
        .for_each(|(column, beamlet)| {
            for (cell, pos) in column.iter_mut().zip(points) {
                *cell = point_dose(kernel, pos, beamlet, surface, maxradius);
            }
        });
    debug!(
        nrows,
        ncols = beamlets.len(),
        "filled dense dose-fluence matrix"
    );
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;
    use crate::surface::ConstantSurface;

    struct Unit;

    impl DoseKernel for Unit {
        fn point_dose<S>(&self, _pos: &Point3<f64>, _beamlet: &Beamlet, _surface: &S) -> f64
        where
            S: ExternalSurface + ?Sized,
        {
            1.0
        }
    }

    fn axial_beamlet(x: f64) -> Beamlet {
        Beamlet::new(
            Point3::new(x, 0.0, 1000.0),
            Vector3::new(0.0, 0.0, -1.0),
            1000.0,
        )
    }

    #[test]
    fn test_culled_cells_are_zero() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(500.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, -50.0),
        ];
        let beamlets = [axial_beamlet(0.0), axial_beamlet(500.0)];
        let mut m = DMatrix::zeros(3, 2);
        fill_dense(&mut m, &points, &beamlets, &ConstantSurface::new(1000.0), &Unit, 10.0);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 0)], 0.0);
        assert_eq!(m[(2, 0)], 1.0);
        assert_eq!(m[(0, 1)], 0.0);
        assert_eq!(m[(1, 1)], 1.0);
        assert_eq!(m[(2, 1)], 0.0);
    }

    #[test]
    fn test_empty_inputs() {
        let mut m = DMatrix::zeros(0, 0);
        fill_dense(
            &mut m,
            &[],
            &[],
            &ConstantSurface::new(1000.0),
            &Unit,
            100.0,
        );
        assert_eq!(m.nrows(), 0);

        let mut m = DMatrix::zeros(0, 1);
        fill_dense(
            &mut m,
            &[],
            &[axial_beamlet(0.0)],
            &ConstantSurface::new(1000.0),
            &Unit,
            100.0,
        );
        assert_eq!(m.ncols(), 1);
    }

    #[test]
    #[should_panic(expected = "matrix row count")]
    fn test_shape_mismatch_panics() {
        let mut m = DMatrix::zeros(1, 1);
        fill_dense(
            &mut m,
            &[Point3::origin(), Point3::origin()],
            &[axial_beamlet(0.0)],
            &ConstantSurface::new(1000.0),
            &Unit,
            100.0,
        );
    }
}
