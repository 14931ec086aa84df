use nalgebra::Point3;
use nalgebra_sparse::CscMatrix;
use rayon::prelude::*;
use tracing::debug;

use crate::beamlet::{inside_cone, Beamlet};
use crate::error::Error;
use crate::kernel::DoseKernel;
use crate::surface::ExternalSurface;

/// Flat nonzero indices are processed in contiguous runs of this many
/// entries per task; each run advances its own column hint.
const VALUE_CHUNK: usize = 1024;

/// Assembles the dose-fluence matrix in compressed sparse column form.
///
/// See [`assemble_csc_with_buffers`]; this entry allocates fresh arrays.
pub fn assemble_csc<K, S>(
    points: &[Point3<f64>],
    beamlets: &[Beamlet],
    surface: &S,
    kernel: &K,
    maxradius: f64,
) -> Result<CscMatrix<f64>, Error>
where
    K: DoseKernel,
    S: ExternalSurface,
{
    assemble_csc_with_buffers(
        Vec::new(),
        Vec::new(),
        Vec::new(),
        points,
        beamlets,
        surface,
        kernel,
        maxradius,
    )
}

/// Assembles the dose-fluence matrix in compressed sparse column form,
/// reusing the given buffers for the column offsets, row indices and values.
///
/// The build runs in three passes, all sharing the cone predicate:
///
/// 1. survivor counts per column (parallel over beamlets), followed by a
///    serial in-place prefix sum over the zero-based `colptr`;
/// 2. row indices (parallel over beamlets), each worker writing its own
///    disjoint `rowval` column slice in ascending point order;
/// 3. values (parallel over contiguous runs of the flat nonzero index),
///    each run recovering the column with an advance-only hint into
///    `colptr` and calling the kernel once per stored entry.
///
/// The passes share memory without atomics because every output position is
/// fixed by the prefix sum before the filling passes start; the result does
/// not depend on thread scheduling.
#[allow(clippy::too_many_arguments)]
pub fn assemble_csc_with_buffers<K, S>(
    mut colptr: Vec<usize>,
    mut rowval: Vec<usize>,
    mut nzval: Vec<f64>,
    points: &[Point3<f64>],
    beamlets: &[Beamlet],
    surface: &S,
    kernel: &K,
    maxradius: f64,
) -> Result<CscMatrix<f64>, Error>
where
    K: DoseKernel,
    S: ExternalSurface,
{
    let ncols = beamlets.len();

    // Pass 1: survivor counts, then prefix sum.
    colptr.clear();
    colptr.resize(ncols + 1, 0);
    colptr[1..]
        .par_iter_mut()
        .zip(beamlets.par_iter())
        .for_each(|(count, beamlet)| {
            let src = beamlet.source_position();
            let tan = beamlet.tan_half_angle(maxradius);
            *count = points
                .iter()
                .filter(|pos| inside_cone(&(*pos - src), beamlet.direction(), tan))
                .count();
        });
    for j in 1..=ncols {
        colptr[j] += colptr[j - 1];
    }
    let nnz = colptr[ncols];

    // Pass 2: row indices into disjoint per-column slices.
    rowval.clear();
    rowval.resize(nnz, 0);
    let mut columns: Vec<&mut [usize]> = Vec::with_capacity(ncols);
    let mut rest = rowval.as_mut_slice();
    for j in 0..ncols {
        let (column, tail) =
            std::mem::take(&mut rest).split_at_mut(colptr[j + 1] - colptr[j]);
        columns.push(column);
        rest = tail;
    }
    columns
        .into_par_iter()
        .zip(beamlets.par_iter())
        .for_each(|(column, beamlet)| {
            let src = beamlet.source_position();
            let tan = beamlet.tan_half_angle(maxradius);
            let mut next = 0;
            for (i, pos) in points.iter().enumerate() {
                if inside_cone(&(pos - src), beamlet.direction(), tan) {
                    column[next] = i;
                    next += 1;
                }
            }
            debug_assert_eq!(next, column.len());
        });

    // Pass 3: values, in contiguous runs of the flat nonzero index.
    nzval.clear();
    nzval.resize(nnz, 0.0);
    nzval
        .par_chunks_mut(VALUE_CHUNK)
        .zip(rowval.par_chunks(VALUE_CHUNK))
        .enumerate()
        .for_each(|(run, (values, rows))| {
            let base = run * VALUE_CHUNK;
            let mut j = column_of(&colptr, base);
            for (k, (value, &i)) in values.iter_mut().zip(rows).enumerate() {
                let n = base + k;
                while colptr[j + 1] <= n {
                    j += 1;
                }
                *value = kernel.point_dose(&points[i], &beamlets[j], surface);
            }
        });

    debug!(
        nnz,
        ncols,
        nrows = points.len(),
        "assembled sparse dose-fluence matrix"
    );
    Ok(CscMatrix::try_from_csc_data(
        points.len(),
        ncols,
        colptr,
        rowval,
        nzval,
    )?)
}

/// Column holding the flat nonzero index `n`: the unique `j` with
/// `colptr[j] ≤ n < colptr[j + 1]`.
fn column_of(colptr: &[usize], n: usize) -> usize {
    colptr.partition_point(|&offset| offset <= n) - 1
}
