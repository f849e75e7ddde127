//! GPU device abstraction used by the filter pipeline.
//!
//! The pipeline only needs a handful of primitives: textures, programs, buffers that can be mapped
//! and unmapped, a triangle-strip draw, and an error check. [`soft::SoftGpu`] implements them on the
//! CPU and is always available; `WgpuGpu` implements them with `wgpu` behind the `gpu` feature.
//!
//! Conventions shared by every device:
//! - Textures hold premultiplied RGBA.
//! - Bind group 0, binding 0 is a linear, clamp-to-edge sampler. Texture and uniform bindings are
//!   declared per program with absolute binding indices.
//! - Blending is always `ONE, ONE_MINUS_SRC_ALPHA`.
//! - Vertices carry a homogeneous clip-space position and a texcoord; interpolation is
//!   perspective-correct.

use std::collections::BTreeMap;

use crate::foundation::{core::FrameRGBA, error::FxResult};

pub mod soft;
#[cfg(feature = "gpu")]
pub mod wgpu_device;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// `1` for single-sampled targets; `> 1` requests a multisampled target that resolves on draw.
    pub sample_count: u32,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sample_count: 1,
        }
    }
}

/// Vertex layout shared by every program.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Clip-space position, `w` included.
    pub position: [f32; 4],
    /// Texture coordinate of the first sampler, normalized to `0..=1`.
    pub texcoord: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    /// Vertex at clip-space `(x, y)` with homogeneous weight `w`.
    pub fn new(clip: [f32; 2], w: f32, texcoord: [f32; 2]) -> Self {
        Self {
            position: [clip[0] * w, clip[1] * w, 0.0, w],
            texcoord,
        }
    }
}

/// A named binding slot in bind group 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingSlot {
    pub name: &'static str,
    pub binding: u32,
}

/// CPU evaluation of a program's fragment stage, used by [`soft::SoftGpu`].
pub type FragmentKernel = fn(&Fragment<'_>) -> [f32; 4];

/// Everything a device needs to build a program.
#[derive(Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub uniform_blocks: &'a [BindingSlot],
    pub samplers: &'a [BindingSlot],
    pub kernel: FragmentKernel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Uniform,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One triangle-strip draw into `target`.
#[derive(Clone, Copy, Debug)]
pub struct DrawCall<'a> {
    pub label: &'a str,
    pub program: ProgramId,
    pub target: TextureId,
    /// Clear the target to transparent before drawing.
    pub clear: bool,
    pub vertex_buffer: BufferId,
    pub vertex_count: u32,
    /// `(binding, buffer)` pairs for uniform blocks.
    pub uniforms: &'a [(u32, BufferId)],
    /// `(binding, texture)` pairs for sampled textures.
    pub textures: &'a [(u32, TextureId)],
    pub scissor: Option<ScissorRect>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GpuStats {
    pub programs_compiled: u64,
    pub programs_released: u64,
    pub draws: u64,
    pub draws_by_label: BTreeMap<String, u64>,
    pub textures_alive: usize,
    pub buffers_alive: usize,
}

impl GpuStats {
    pub fn draws_of(&self, label: &str) -> u64 {
        self.draws_by_label.get(label).copied().unwrap_or(0)
    }

    pub(crate) fn record_draw(&mut self, label: &str) {
        self.draws += 1;
        *self.draws_by_label.entry(label.to_owned()).or_insert(0) += 1;
    }
}

/// GPU primitives consumed by the filter pipeline.
///
/// A device is driven from a single thread; nothing here is shared across contexts.
pub trait Gpu {
    fn name(&self) -> &'static str;

    fn max_texture_size(&self) -> u32;

    fn create_texture(&mut self, desc: TextureDesc) -> FxResult<TextureId>;

    fn texture_desc(&self, id: TextureId) -> Option<TextureDesc>;

    /// Replace the texture contents with premultiplied RGBA8 pixels.
    fn upload_texture(&mut self, id: TextureId, rgba8: &[u8]) -> FxResult<()>;

    fn clear_texture(&mut self, id: TextureId, rgba: [f32; 4]) -> FxResult<()>;

    fn read_texture(&mut self, id: TextureId) -> FxResult<FrameRGBA>;

    fn release_texture(&mut self, id: TextureId);

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> FxResult<ProgramId>;

    fn release_program(&mut self, id: ProgramId);

    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> FxResult<BufferId>;

    /// Map a buffer for host writes. The mapping stays valid until [`Gpu::unmap_buffer`].
    fn map_buffer(&mut self, id: BufferId) -> FxResult<&mut [u8]>;

    fn unmap_buffer(&mut self, id: BufferId) -> FxResult<()>;

    fn release_buffer(&mut self, id: BufferId);

    fn draw(&mut self, call: &DrawCall<'_>) -> FxResult<()>;

    /// Report and reset the sticky device error, if any.
    fn check_error(&mut self) -> Option<String>;

    fn stats(&self) -> GpuStats;
}

/// Read-only texture access for CPU fragment kernels.
pub trait TextureSampler: Sync {
    /// Bilinear, clamp-to-edge sample at normalized `uv`.
    fn sample(&self, uv: [f32; 2]) -> [f32; 4];

    fn size(&self) -> [u32; 2];
}

/// Inputs of one fragment invocation.
pub struct Fragment<'a> {
    /// Interpolated texcoord.
    pub uv: [f32; 2],
    /// Target pixel center in framebuffer coordinates.
    pub coord: [f32; 2],
    uniforms: &'a [&'a [u8]],
    samplers: &'a [&'a dyn TextureSampler],
}

impl<'a> Fragment<'a> {
    /// `uniforms` and `samplers` are in the program's declaration order.
    pub fn new(
        uv: [f32; 2],
        coord: [f32; 2],
        uniforms: &'a [&'a [u8]],
        samplers: &'a [&'a dyn TextureSampler],
    ) -> Self {
        Self {
            uv,
            coord,
            uniforms,
            samplers,
        }
    }

    /// Decode uniform block `index`; a missing or short block reads as zeroes.
    pub fn uniform<T: bytemuck::Pod>(&self, index: usize) -> T {
        let size = std::mem::size_of::<T>();
        self.uniforms
            .get(index)
            .filter(|b| b.len() >= size)
            .map(|b| bytemuck::pod_read_unaligned(&b[..size]))
            .unwrap_or_else(T::zeroed)
    }

    /// Raw bytes of uniform block `index`.
    pub fn uniform_bytes(&self, index: usize) -> &[u8] {
        self.uniforms.get(index).copied().unwrap_or(&[])
    }

    pub fn sample(&self, index: usize, uv: [f32; 2]) -> [f32; 4] {
        self.samplers
            .get(index)
            .map(|s| s.sample(uv))
            .unwrap_or([0.0; 4])
    }

    pub fn texture_size(&self, index: usize) -> [f32; 2] {
        self.samplers
            .get(index)
            .map(|s| {
                let [w, h] = s.size();
                [w as f32, h as f32]
            })
            .unwrap_or([0.0; 2])
    }
}

/// Map a target pixel position to clip space.
pub fn pixel_to_clip(x: f64, y: f64, width: u32, height: u32) -> [f32; 2] {
    let w = f64::from(width.max(1));
    let h = f64::from(height.max(1));
    [(2.0 * x / w - 1.0) as f32, (1.0 - 2.0 * y / h) as f32]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_layout() {
        assert_eq!(Vertex::STRIDE, 24);
    }

    #[test]
    fn vertex_new_premultiplies_clip_by_w() {
        let v = Vertex::new([0.5, -0.5], 2.0, [0.0, 1.0]);
        assert_eq!(v.position, [1.0, -1.0, 0.0, 2.0]);
    }

    #[test]
    fn pixel_to_clip_maps_corners() {
        assert_eq!(pixel_to_clip(0.0, 0.0, 4, 2), [-1.0, 1.0]);
        assert_eq!(pixel_to_clip(4.0, 2.0, 4, 2), [1.0, -1.0]);
    }

    #[test]
    fn fragment_reads_short_uniform_as_zero() {
        let bytes = [0u8; 4];
        let blocks: [&[u8]; 1] = [&bytes];
        let frag = Fragment::new([0.0; 2], [0.0; 2], &blocks, &[]);
        let v: [f32; 4] = frag.uniform(0);
        assert_eq!(v, [0.0; 4]);
        assert_eq!(frag.sample(0, [0.5, 0.5]), [0.0; 4]);
    }
}
