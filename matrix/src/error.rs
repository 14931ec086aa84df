/// The `Error` enum represents the ways matrix assembly and surface
/// construction can fail.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Expected {expected} surface planes, got {got}")]
    SurfaceTableLength { expected: usize, got: usize },
    #[error("Surface sample arrays have mismatched lengths ({phis}, {normals}, {points})")]
    SurfaceTableMismatch {
        phis: usize,
        normals: usize,
        points: usize,
    },
    #[error("Surface sample angles must be strictly increasing and within [0, 360)")]
    SurfaceTableUnsorted,
    #[error("Cannot build a surface from an empty mesh")]
    EmptyMesh,
    #[error("Surface grid spacing must be positive, got ({delta_phi}, {delta_y})")]
    InvalidSpacing { delta_phi: f64, delta_y: f64 },
    #[error(transparent)]
    Mesh(#[from] rt_dose_geometry::MeshError),
    #[error(transparent)]
    SparseFormat(#[from] nalgebra_sparse::SparseFormatError),
    #[error("The dense GPU back end requires the `gpu` feature")]
    GpuDisabled,
    #[error("Kernel does not provide a device translation")]
    KernelNotDeviceCallable,
    #[error("Surface has no device representation")]
    SurfaceNotDeviceCallable,
    #[error("No suitable GPU adapter found")]
    NoGpuAdapter,
    #[error("GPU device request failed: {0}")]
    GpuDevice(String),
}
