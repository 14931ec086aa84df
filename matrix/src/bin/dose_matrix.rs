use anyhow::Result;
use clap::Parser;
use nalgebra::Point3;
use tracing::{debug, Level};

use rt_dose_matrix::{
    beamlet_grid, dose_fluence_matrix, Beamlet, ConstantSurface, DoseFluenceMatrix, DoseKernel,
    ExternalSurface, Jaws, MatrixKind, Options, PlaneSurface,
};

/// A command line interface (CLI) application to assemble the dose-fluence
/// matrix of a synthetic water-slab phantom.
///
/// A grid of dose points below the isocenter plane is irradiated by a
/// jaws-bounded fan of beamlets from a source at gantry zero. The assembled
/// matrix statistics are printed to stdout.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Cli {
    /// Field side length on the isocenter plane (mm).
    #[arg(long, default_value_t = 100.0)]
    field: f64,
    /// Beamlet spacing on the isocenter plane (mm).
    #[arg(long, default_value_t = 5.0)]
    spacing: f64,
    /// Dose grid resolution per axis.
    #[arg(short, long, default_value_t = 21)]
    resolution: usize,
    /// Dose grid voxel pitch (mm).
    #[arg(long, default_value_t = 5.0)]
    pitch: f64,
    /// Source-axis distance (mm).
    #[arg(long, default_value_t = 1000.0)]
    sad: f64,
    /// Nominal source-surface distance (mm).
    #[arg(long, default_value_t = 900.0)]
    ssd: f64,
    /// Culling cone radius on the isocenter plane (mm).
    #[arg(long, default_value_t = 100.0)]
    maxradius: f64,
    /// Model the skin as a plane instead of a constant SSD.
    #[arg(long, default_value_t = false)]
    plane: bool,
    /// Assemble a dense matrix instead of a sparse one.
    #[arg(long, default_value_t = false)]
    dense: bool,
    /// Enable logging at DEBUG level.
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Enable logging at TRACE level.
    #[arg(long, default_value_t = false)]
    trace: bool,
}

/// Exponential attenuation with inverse square falloff, the water-phantom
/// toy model. Zero dose above the skin or when the ray misses it.
struct AttenuationKernel {
    mu: f64,
}

impl DoseKernel for AttenuationKernel {
    fn point_dose<S>(&self, pos: &Point3<f64>, beamlet: &Beamlet, surface: &S) -> f64
    where
        S: ExternalSurface + ?Sized,
    {
        let src = beamlet.source_position();
        let depth = surface.depth(pos, src);
        if !depth.is_finite() || depth < 0.0 {
            return 0.0;
        }
        let sad = beamlet.source_axis_distance();
        let d2 = (pos - src).norm_squared();
        (-self.mu * depth).exp() * sad * sad / d2
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.trace {
        Level::TRACE
    } else if cli.debug {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_thread_ids(true)
        .with_target(true)
        .with_max_level(level)
        .init();
    debug!("Commandline arguments: {:#?}", &cli);

    let jaws = Jaws::square(cli.field);
    let beamlets = beamlet_grid(&jaws, cli.spacing, cli.sad);

    // Dose grid centered on the isocenter, extending downwards in z.
    let half = (cli.resolution as f64 - 1.0) / 2.0;
    let mut points = Vec::with_capacity(cli.resolution.pow(3));
    for iz in 0..cli.resolution {
        for iy in 0..cli.resolution {
            for ix in 0..cli.resolution {
                points.push(Point3::new(
                    (ix as f64 - half) * cli.pitch,
                    (iy as f64 - half) * cli.pitch,
                    (iz as f64 - half) * cli.pitch,
                ));
            }
        }
    }

    let kind = if cli.dense {
        MatrixKind::Dense
    } else {
        MatrixKind::SparseCsc
    };
    let options = Options {
        maxradius: cli.maxradius,
    };
    let kernel = AttenuationKernel { mu: 0.005 };

    let matrix = if cli.plane {
        let surface = PlaneSurface::new(cli.ssd);
        dose_fluence_matrix(kind, &points, &beamlets, &surface, &kernel, &options)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
    } else {
        let surface = ConstantSurface::new(cli.ssd);
        dose_fluence_matrix(kind, &points, &beamlets, &surface, &kernel, &options)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
    };

    report(&matrix);
    Ok(())
}

fn report(matrix: &DoseFluenceMatrix) {
    let cells = matrix.nrows() * matrix.ncols();
    println!("Points (rows): {}", matrix.nrows());
    println!("Beamlets (columns): {}", matrix.ncols());
    println!("Stored entries: {}", matrix.stored_entries());
    if cells > 0 {
        match matrix {
            DoseFluenceMatrix::Dense(m) => {
                let nonzero = m.iter().filter(|v| **v != 0.0).count();
                println!("Nonzero fill: {:.2} %", 100.0 * nonzero as f64 / cells as f64);
                println!("Max dose contribution: {:.6}", m.max());
            }
            DoseFluenceMatrix::SparseCsc(m) => {
                println!(
                    "Nonzero fill: {:.2} %",
                    100.0 * m.nnz() as f64 / cells as f64
                );
                let max = m.values().iter().copied().fold(0.0f64, f64::max);
                println!("Max dose contribution: {:.6}", max);
            }
        }
    }
}
