use nalgebra::{DMatrix, Point3};
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::beamlet::Beamlet;
use crate::error::Error;
use crate::kernel::DoseKernel;
use crate::surface::{DeviceSurface, ExternalSurface};

/// Workgroup edge of the 2-D `(point, beamlet)` dispatch grid.
const WORKGROUP: u32 = 8;

/// Shader template; the marker line is replaced with the kernel's WGSL
/// `point_dose` function.
const SHADER_TEMPLATE: &str = r#"
struct Params {
    npoints: u32,
    nbeamlets: u32,
    maxradius: f32,
    surface_kind: u32,
    surface_ssd: f32,
    pad0: f32,
    pad1: f32,
    pad2: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> points: array<f32>;
@group(0) @binding(2) var<storage, read> beamlets: array<f32>;
@group(0) @binding(3) var<storage, read_write> dose: array<f32>;

//__POINT_DOSE__

fn surface_ssd(pos: vec3<f32>, src: vec3<f32>) -> f32 {
    if (params.surface_kind == 1u) {
        let d = src - pos;
        return params.surface_ssd * length(src) * length(d) / dot(src, d);
    }
    return params.surface_ssd;
}

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    let j = gid.y;
    if (i >= params.npoints || j >= params.nbeamlets) {
        return;
    }
    let pos = vec3<f32>(points[3u * i], points[3u * i + 1u], points[3u * i + 2u]);
    let base = 8u * j;
    let src = vec3<f32>(beamlets[base], beamlets[base + 1u], beamlets[base + 2u]);
    let dir = vec3<f32>(beamlets[base + 3u], beamlets[base + 4u], beamlets[base + 5u]);
    let sad = beamlets[base + 6u];

    let r = pos - src;
    let tan_half = params.maxradius / sad;
    let ra = dot(r, dir);
    var value = 0.0;
    if (dot(r, r) < ra * ra * (1.0 + tan_half * tan_half)) {
        value = point_dose(pos, src, dir, sad, surface_ssd(pos, src));
    }
    dose[i + j * params.npoints] = value;
}
"#;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    npoints: u32,
    nbeamlets: u32,
    maxradius: f32,
    surface_kind: u32,
    surface_ssd: f32,
    _pad: [f32; 3],
}

/// Fills a dense dose-fluence matrix on a GPU device.
///
/// One shader invocation per `(point, beamlet)` cell evaluates the same
/// culling predicate as the CPU paths and the kernel's WGSL translation.
/// Device arithmetic is f32; the result is widened to f64 on readback, so
/// values differ from the CPU back ends by single-precision rounding.
///
/// # Errors
///
/// Fails when the kernel has no WGSL translation, the surface has no device
/// representation, or no GPU device can be acquired.
pub fn assemble_dense_gpu<K, S>(
    points: &[Point3<f64>],
    beamlets: &[Beamlet],
    surface: &S,
    kernel: &K,
    maxradius: f64,
) -> Result<DMatrix<f64>, Error>
where
    K: DoseKernel,
    S: ExternalSurface,
{
    let kernel_src = kernel
        .wgsl_point_dose()
        .ok_or(Error::KernelNotDeviceCallable)?;
    let device_surface = surface
        .device_repr()
        .ok_or(Error::SurfaceNotDeviceCallable)?;
    if points.is_empty() || beamlets.is_empty() {
        return Ok(DMatrix::zeros(points.len(), beamlets.len()));
    }

    let (surface_kind, surface_ssd) = match device_surface {
        DeviceSurface::Constant { ssd } => (0u32, ssd as f32),
        DeviceSurface::Plane { ssd } => (1u32, ssd as f32),
    };
    let params = Params {
        npoints: points.len() as u32,
        nbeamlets: beamlets.len() as u32,
        maxradius: maxradius as f32,
        surface_kind,
        surface_ssd,
        _pad: [0.0; 3],
    };

    let point_data: Vec<f32> = points
        .iter()
        .flat_map(|p| [p.x as f32, p.y as f32, p.z as f32])
        .collect();
    let beamlet_data: Vec<f32> = beamlets
        .iter()
        .flat_map(|b| {
            let src = b.source_position();
            let dir = b.direction();
            [
                src.x as f32,
                src.y as f32,
                src.z as f32,
                dir.x as f32,
                dir.y as f32,
                dir.z as f32,
                b.source_axis_distance() as f32,
                0.0,
            ]
        })
        .collect();

    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
        .ok_or(Error::NoGpuAdapter)?;
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("dose-fluence-matrix"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
        },
        None,
    ))
    .map_err(|e| Error::GpuDevice(e.to_string()))?;

    let shader_source = SHADER_TEMPLATE.replace("//__POINT_DOSE__", &kernel_src);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("dose-fluence-matrix"),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });

    let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("params"),
        contents: bytemuck::bytes_of(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let points_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("points"),
        contents: bytemuck::cast_slice(&point_data),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let beamlets_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("beamlets"),
        contents: bytemuck::cast_slice(&beamlet_data),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let output_size = (points.len() * beamlets.len() * std::mem::size_of::<f32>()) as u64;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("dose"),
        size: output_size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("dose-staging"),
        size: output_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("dose-fluence-matrix"),
        layout: None,
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("dose-fluence-matrix"),
        layout: &pipeline.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: points_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: beamlets_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: output_buffer.as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("dose-fluence-matrix"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("dose-fluence-matrix"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let groups_x = (points.len() as u32).div_ceil(WORKGROUP);
        let groups_y = (beamlets.len() as u32).div_ceil(WORKGROUP);
        pass.dispatch_workgroups(groups_x, groups_y, 1);
    }
    encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_size);
    queue.submit(Some(encoder.finish()));

    let slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| Error::GpuDevice(e.to_string()))?
        .map_err(|e| Error::GpuDevice(e.to_string()))?;

    let values: Vec<f64> = {
        let data = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, f32>(&data)
            .iter()
            .map(|&v| v as f64)
            .collect()
    };
    staging_buffer.unmap();

    debug!(
        nrows = points.len(),
        ncols = beamlets.len(),
        "filled dense dose-fluence matrix on device"
    );
    // The shader writes dose[i + j·npoints]: already column-major.
    Ok(DMatrix::from_vec(points.len(), beamlets.len(), values))
}
