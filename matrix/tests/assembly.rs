use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{DMatrix, Point3, Vector3};

use rt_dose_matrix::{
    dose_fluence_matrix, dose_fluence_matrix_into, Beamlet, ConstantSurface, DoseFluenceMatrix,
    DoseKernel, ExternalSurface, MatrixKind, Options, PlaneSurface,
};

/// Deterministic kernel with a distinct value per (point, beamlet) pair.
struct GeometricKernel;

impl DoseKernel for GeometricKernel {
    fn point_dose<S>(&self, pos: &Point3<f64>, beamlet: &Beamlet, surface: &S) -> f64
    where
        S: ExternalSurface + ?Sized,
    {
        let src = beamlet.source_position();
        let depth = surface.depth(pos, src);
        if !depth.is_finite() {
            return 0.0;
        }
        1.0 + depth / 1000.0 + pos.x / 7.0 + src.x / 13.0
    }
}

struct CountingKernel {
    calls: AtomicUsize,
}

impl CountingKernel {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl DoseKernel for CountingKernel {
    fn point_dose<S>(&self, _pos: &Point3<f64>, _beamlet: &Beamlet, _surface: &S) -> f64
    where
        S: ExternalSurface + ?Sized,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);
        1.0
    }
}

/// Fifty parallel beamlets, 50 mm apart, and twenty points on each axis.
fn parallel_field() -> (Vec<Point3<f64>>, Vec<Beamlet>) {
    let beamlets: Vec<Beamlet> = (0..50)
        .map(|j| {
            Beamlet::new(
                Point3::new(50.0 * j as f64, 0.0, 1000.0),
                Vector3::new(0.0, 0.0, -1.0),
                1000.0,
            )
        })
        .collect();
    let points: Vec<Point3<f64>> = (0..1000)
        .map(|i| Point3::new(50.0 * (i / 20) as f64, 0.0, -5.0 * (i % 20) as f64))
        .collect();
    (points, beamlets)
}

#[test]
fn no_pair_in_cone_yields_empty_structures() {
    // S1: a culling radius too small for any point.
    let points = [
        Point3::new(30.0, 0.0, 0.0),
        Point3::new(0.0, 40.0, -10.0),
        Point3::new(-25.0, 5.0, 20.0),
    ];
    let beamlets = [
        Beamlet::new(Point3::new(0.0, 0.0, 1000.0), Vector3::new(0.0, 0.0, -1.0), 1000.0),
        Beamlet::new(Point3::new(10.0, 0.0, 1000.0), Vector3::new(0.0, 0.0, -1.0), 1000.0),
    ];
    let surface = ConstantSurface::new(900.0);
    let options = Options { maxradius: 1e-3 };

    let kernel = CountingKernel::new();
    let sparse = dose_fluence_matrix(
        MatrixKind::SparseCsc,
        &points,
        &beamlets,
        &surface,
        &kernel,
        &options,
    )
    .unwrap();
    assert_eq!(sparse.stored_entries(), 0);
    assert_eq!(kernel.calls.load(Ordering::Relaxed), 0);

    let dense = dose_fluence_matrix(
        MatrixKind::Dense,
        &points,
        &beamlets,
        &surface,
        &kernel,
        &options,
    )
    .unwrap();
    assert!(dense.to_dense().iter().all(|&v| v == 0.0));
    assert_eq!(kernel.calls.load(Ordering::Relaxed), 0);
}

#[test]
fn parallel_beamlets_select_disjoint_columns() {
    // S5: each beamlet catches exactly its own twenty points.
    let (points, beamlets) = parallel_field();
    let surface = ConstantSurface::new(900.0);
    let options = Options { maxradius: 10.0 };
    let matrix = dose_fluence_matrix(
        MatrixKind::SparseCsc,
        &points,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap();

    let DoseFluenceMatrix::SparseCsc(csc) = &matrix else {
        panic!("expected a sparse matrix");
    };
    assert_eq!(csc.nnz(), 1000);

    // Structural invariant: offsets monotone, lengths consistent.
    let offsets = csc.col_offsets();
    assert_eq!(offsets[0], 0);
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(offsets[csc.ncols()], csc.row_indices().len());
    assert_eq!(csc.row_indices().len(), csc.values().len());

    for j in 0..csc.ncols() {
        let col = csc.col(j);
        let rows = col.row_indices();
        assert_eq!(rows.len(), 20);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
        assert!(rows.iter().all(|&i| i / 20 == j));
    }
}

#[test]
fn dense_and_sparse_agree_bit_for_bit() {
    // Property 4, with a surface that exercises the depth query.
    let (points, beamlets) = parallel_field();
    let surface = PlaneSurface::new(900.0);
    let options = Options { maxradius: 30.0 };

    let dense = dose_fluence_matrix(
        MatrixKind::Dense,
        &points,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap();
    let sparse = dose_fluence_matrix(
        MatrixKind::SparseCsc,
        &points,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap();

    let d = dense.to_dense();
    let s = sparse.to_dense();
    assert_eq!(d.shape(), s.shape());
    for (a, b) in d.iter().zip(s.iter()) {
        assert!(a.to_bits() == b.to_bits(), "{a} != {b}");
    }
}

#[test]
fn permuting_inputs_permutes_the_matrix() {
    // Property 5.
    let (points, beamlets) = parallel_field();
    let surface = ConstantSurface::new(900.0);
    let options = Options { maxradius: 25.0 };
    let base = dose_fluence_matrix(
        MatrixKind::Dense,
        &points,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap()
    .to_dense();

    let mut beamlets_rev = beamlets.clone();
    beamlets_rev.reverse();
    let cols_rev = dose_fluence_matrix(
        MatrixKind::Dense,
        &points,
        &beamlets_rev,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap()
    .to_dense();
    for j in 0..beamlets.len() {
        for i in 0..points.len() {
            assert_eq!(base[(i, j)], cols_rev[(i, beamlets.len() - 1 - j)]);
        }
    }

    let mut points_rev = points.clone();
    points_rev.reverse();
    let rows_rev = dose_fluence_matrix(
        MatrixKind::Dense,
        &points_rev,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap()
    .to_dense();
    for j in 0..beamlets.len() {
        for i in 0..points.len() {
            assert_eq!(base[(i, j)], rows_rev[(points.len() - 1 - i, j)]);
        }
    }
}

#[test]
fn repeated_runs_are_identical() {
    // S6: determinism under parallel assembly.
    let (points, beamlets) = parallel_field();
    let surface = PlaneSurface::new(950.0);
    let options = Options { maxradius: 40.0 };
    for kind in [MatrixKind::Dense, MatrixKind::SparseCsc] {
        let a = dose_fluence_matrix(kind, &points, &beamlets, &surface, &GeometricKernel, &options)
            .unwrap();
        let b = dose_fluence_matrix(kind, &points, &beamlets, &surface, &GeometricKernel, &options)
            .unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn empty_inputs_yield_empty_matrices() {
    let surface = ConstantSurface::new(900.0);
    let options = Options::default();
    let beamlets = [Beamlet::new(
        Point3::new(0.0, 0.0, 1000.0),
        Vector3::new(0.0, 0.0, -1.0),
        1000.0,
    )];

    for kind in [MatrixKind::Dense, MatrixKind::SparseCsc] {
        let m = dose_fluence_matrix(kind, &[], &beamlets, &surface, &GeometricKernel, &options)
            .unwrap();
        assert_eq!(m.nrows(), 0);
        assert_eq!(m.ncols(), 1);

        let m = dose_fluence_matrix(kind, &[], &[], &surface, &GeometricKernel, &options).unwrap();
        assert_eq!((m.nrows(), m.ncols()), (0, 0));
        assert_eq!(m.stored_entries(), 0);
    }
}

#[test]
fn default_culling_radius_is_100() {
    assert_eq!(Options::default().maxradius, 100.0);
}

#[test]
fn in_place_reassembly_matches_fresh_build() {
    let (points, beamlets) = parallel_field();
    let surface = ConstantSurface::new(900.0);
    let options = Options { maxradius: 15.0 };

    for kind in [MatrixKind::Dense, MatrixKind::SparseCsc] {
        let fresh =
            dose_fluence_matrix(kind, &points, &beamlets, &surface, &GeometricKernel, &options)
                .unwrap();
        // Start from a matrix of a different shape and refill it.
        let mut reused = dose_fluence_matrix(
            kind,
            &points[..37],
            &beamlets[..3],
            &surface,
            &GeometricKernel,
            &options,
        )
        .unwrap();
        dose_fluence_matrix_into(
            &mut reused,
            &points,
            &beamlets,
            &surface,
            &GeometricKernel,
            &options,
        )
        .unwrap();
        assert_eq!(fresh, reused);
    }
}

#[test]
fn matrix_kind_selects_the_representation() {
    let (points, beamlets) = parallel_field();
    let surface = ConstantSurface::new(900.0);
    let options = Options { maxradius: 10.0 };
    let dense = dose_fluence_matrix(
        MatrixKind::Dense,
        &points,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap();
    assert!(matches!(dense, DoseFluenceMatrix::Dense(_)));
    assert_eq!(dense.stored_entries(), points.len() * beamlets.len());

    let sparse = dose_fluence_matrix(
        MatrixKind::SparseCsc,
        &points,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap();
    assert!(matches!(sparse, DoseFluenceMatrix::SparseCsc(_)));
    assert!(sparse.stored_entries() < points.len() * beamlets.len());
}

#[cfg(not(feature = "gpu"))]
#[test]
fn gpu_kind_requires_the_gpu_feature() {
    let surface = ConstantSurface::new(900.0);
    let r = dose_fluence_matrix(
        MatrixKind::DenseGpu,
        &[Point3::origin()],
        &[Beamlet::new(
            Point3::new(0.0, 0.0, 1000.0),
            Vector3::new(0.0, 0.0, -1.0),
            1000.0,
        )],
        &surface,
        &GeometricKernel,
        &Options::default(),
    );
    assert!(matches!(r, Err(rt_dose_matrix::Error::GpuDisabled)));
}

#[test]
fn densify_roundtrip_preserves_values() {
    let (points, beamlets) = parallel_field();
    let surface = ConstantSurface::new(900.0);
    let options = Options { maxradius: 10.0 };
    let sparse = dose_fluence_matrix(
        MatrixKind::SparseCsc,
        &points,
        &beamlets,
        &surface,
        &GeometricKernel,
        &options,
    )
    .unwrap();
    let dense: DMatrix<f64> = sparse.to_dense();
    assert_eq!(dense.nrows(), points.len());
    let stored: usize = dense.iter().filter(|v| **v != 0.0).count();
    assert_eq!(stored, sparse.stored_entries());
}
