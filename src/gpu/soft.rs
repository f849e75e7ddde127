use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::{
    foundation::{
        core::FrameRGBA,
        error::{FxError, FxResult},
    },
    gpu::{
        BindingSlot, BufferId, BufferUsage, DrawCall, Fragment, FragmentKernel, Gpu, GpuStats,
        ProgramDesc, ProgramId, TextureDesc, TextureId, TextureSampler, Vertex,
    },
};

/// Standard 4x sample pattern, in pixel units.
const SAMPLES_4X: [[f32; 2]; 4] = [[0.375, 0.125], [0.875, 0.375], [0.125, 0.625], [0.625, 0.875]];
const SAMPLE_1X: [[f32; 2]; 1] = [[0.5, 0.5]];

struct SoftTexture {
    desc: TextureDesc,
    px: Vec<[f32; 4]>,
}

impl SoftTexture {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let w = i64::from(self.desc.width);
        let h = i64::from(self.desc.height);
        let x = x.clamp(0, w - 1) as usize;
        let y = y.clamp(0, h - 1) as usize;
        self.px[y * (self.desc.width as usize) + x]
    }
}

impl TextureSampler for SoftTexture {
    fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        if self.desc.width == 0 || self.desc.height == 0 {
            return [0.0; 4];
        }
        let x = uv[0] * self.desc.width as f32 - 0.5;
        let y = uv[1] * self.desc.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = snap_weight(x - x0);
        let fy = snap_weight(y - y0);
        let (ix, iy) = (x0 as i64, y0 as i64);

        let a = self.texel(ix, iy);
        let b = self.texel(ix + 1, iy);
        let c = self.texel(ix, iy + 1);
        let d = self.texel(ix + 1, iy + 1);
        let mut out = [0.0f32; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * fx;
            let bottom = c[i] + (d[i] - c[i]) * fx;
            out[i] = top + (bottom - top) * fy;
        }
        out
    }

    fn size(&self) -> [u32; 2] {
        [self.desc.width, self.desc.height]
    }
}

// Texel-center lookups carry float noise from interpolation; keep them exact.
fn snap_weight(f: f32) -> f32 {
    if f < 1e-4 {
        0.0
    } else if f > 1.0 - 1e-4 {
        1.0
    } else {
        f
    }
}

struct SoftProgram {
    label: String,
    kernel: FragmentKernel,
    blocks: Vec<BindingSlot>,
    samplers: Vec<BindingSlot>,
}

struct SoftBuffer {
    usage: BufferUsage,
    data: Vec<u8>,
    mapped: bool,
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    inv_w: f32,
    uv: [f32; 2],
}

#[derive(Clone, Copy)]
struct PixelHit {
    uv: [f32; 2],
    mask: u8,
}

/// Deterministic CPU implementation of [`Gpu`].
///
/// Programs run their [`FragmentKernel`]; WGSL sources are carried but not interpreted.
pub struct SoftGpu {
    next_id: u64,
    max_texture_size: u32,
    textures: HashMap<u64, SoftTexture>,
    programs: HashMap<u64, SoftProgram>,
    buffers: HashMap<u64, SoftBuffer>,
    stats: GpuStats,
    pending_error: Option<String>,
    fail_compile: HashSet<String>,
    error_on_draw: HashSet<String>,
}

impl Default for SoftGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftGpu {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            max_texture_size: 8192,
            textures: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            stats: GpuStats::default(),
            pending_error: None,
            fail_compile: HashSet::new(),
            error_on_draw: HashSet::new(),
        }
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size.max(1);
        self
    }

    /// Make compilation of programs labelled `label` fail.
    pub fn fail_compile_of(mut self, label: impl Into<String>) -> Self {
        self.fail_compile.insert(label.into());
        self
    }

    /// Raise a device error after every draw labelled `label`.
    pub fn raise_error_on_draw_of(mut self, label: impl Into<String>) -> Self {
        self.error_on_draw.insert(label.into());
        self
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, id: TextureId) -> FxResult<&SoftTexture> {
        self.textures
            .get(&id.0)
            .ok_or_else(|| FxError::gpu(format!("unknown texture {id:?}")))
    }

    fn rasterize(
        &self,
        call: &DrawCall<'_>,
        target: &SoftTexture,
        vertices: &[Vertex],
    ) -> Vec<Option<PixelHit>> {
        let (w, h) = (target.desc.width, target.desc.height);
        let mut hits: Vec<Option<PixelHit>> = vec![None; (w as usize) * (h as usize)];
        let pattern: &[[f32; 2]] = if target.desc.sample_count > 1 {
            &SAMPLES_4X
        } else {
            &SAMPLE_1X
        };

        let (clip_x0, clip_y0, clip_x1, clip_y1) = match call.scissor {
            Some(s) => (
                s.x.min(w),
                s.y.min(h),
                s.x.saturating_add(s.width).min(w),
                s.y.saturating_add(s.height).min(h),
            ),
            None => (0, 0, w, h),
        };

        let screen: Vec<Option<ScreenVertex>> = vertices
            .iter()
            .map(|v| {
                let cw = v.position[3];
                if cw <= 1e-6 {
                    return None;
                }
                let nx = v.position[0] / cw;
                let ny = v.position[1] / cw;
                Some(ScreenVertex {
                    x: (nx + 1.0) * 0.5 * w as f32,
                    y: (1.0 - ny) * 0.5 * h as f32,
                    inv_w: 1.0 / cw,
                    uv: v.texcoord,
                })
            })
            .collect();

        for tri in 0..screen.len().saturating_sub(2) {
            let (Some(a), Some(b), Some(c)) = (screen[tri], screen[tri + 1], screen[tri + 2])
            else {
                continue;
            };
            let area = edge(a, b, c.x, c.y);
            if area.abs() < 1e-9 {
                continue;
            }

            let min_x = a.x.min(b.x).min(c.x).floor().max(clip_x0 as f32) as u32;
            let min_y = a.y.min(b.y).min(c.y).floor().max(clip_y0 as f32) as u32;
            let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as u32).min(clip_x1);
            let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as u32).min(clip_y1);

            for py in min_y..max_y {
                for px in min_x..max_x {
                    let idx = (py as usize) * (w as usize) + (px as usize);
                    let taken = hits[idx].map(|hit| hit.mask).unwrap_or(0);
                    let mut mask = 0u8;
                    for (si, s) in pattern.iter().enumerate() {
                        let bit = 1u8 << si;
                        if taken & bit != 0 {
                            continue;
                        }
                        let sx = px as f32 + s[0];
                        let sy = py as f32 + s[1];
                        let l0 = edge(b, c, sx, sy) / area;
                        let l1 = edge(c, a, sx, sy) / area;
                        let l2 = edge(a, b, sx, sy) / area;
                        if l0 >= 0.0 && l1 >= 0.0 && l2 >= 0.0 {
                            mask |= bit;
                        }
                    }
                    if mask == 0 {
                        continue;
                    }
                    match &mut hits[idx] {
                        Some(hit) => hit.mask |= mask,
                        slot @ None => {
                            let cx = px as f32 + 0.5;
                            let cy = py as f32 + 0.5;
                            let l0 = edge(b, c, cx, cy) / area;
                            let l1 = edge(c, a, cx, cy) / area;
                            let l2 = edge(a, b, cx, cy) / area;
                            let q0 = l0 * a.inv_w;
                            let q1 = l1 * b.inv_w;
                            let q2 = l2 * c.inv_w;
                            let qs = q0 + q1 + q2;
                            let uv = if qs.abs() < 1e-12 {
                                a.uv
                            } else {
                                [
                                    (q0 * a.uv[0] + q1 * b.uv[0] + q2 * c.uv[0]) / qs,
                                    (q0 * a.uv[1] + q1 * b.uv[1] + q2 * c.uv[1]) / qs,
                                ]
                            };
                            *slot = Some(PixelHit { uv, mask });
                        }
                    }
                }
            }
        }
        hits
    }
}

fn edge(a: ScreenVertex, b: ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

impl Gpu for SoftGpu {
    fn name(&self) -> &'static str {
        "soft"
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn create_texture(&mut self, desc: TextureDesc) -> FxResult<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(FxError::validation("texture size must be non-zero"));
        }
        if desc.width > self.max_texture_size || desc.height > self.max_texture_size {
            return Err(FxError::gpu(format!(
                "texture {}x{} exceeds max size {}",
                desc.width, desc.height, self.max_texture_size
            )));
        }
        let id = self.alloc_id();
        let len = (desc.width as usize) * (desc.height as usize);
        self.textures.insert(
            id,
            SoftTexture {
                desc,
                px: vec![[0.0; 4]; len],
            },
        );
        Ok(TextureId(id))
    }

    fn texture_desc(&self, id: TextureId) -> Option<TextureDesc> {
        self.textures.get(&id.0).map(|t| t.desc)
    }

    fn upload_texture(&mut self, id: TextureId, rgba8: &[u8]) -> FxResult<()> {
        let tex = self
            .textures
            .get_mut(&id.0)
            .ok_or_else(|| FxError::gpu(format!("unknown texture {id:?}")))?;
        if rgba8.len() != tex.px.len() * 4 {
            return Err(FxError::validation(
                "upload_texture expects width*height*4 bytes",
            ));
        }
        for (dst, src) in tex.px.iter_mut().zip(rgba8.chunks_exact(4)) {
            *dst = [
                f32::from(src[0]) / 255.0,
                f32::from(src[1]) / 255.0,
                f32::from(src[2]) / 255.0,
                f32::from(src[3]) / 255.0,
            ];
        }
        Ok(())
    }

    fn clear_texture(&mut self, id: TextureId, rgba: [f32; 4]) -> FxResult<()> {
        let tex = self
            .textures
            .get_mut(&id.0)
            .ok_or_else(|| FxError::gpu(format!("unknown texture {id:?}")))?;
        tex.px.fill(rgba);
        Ok(())
    }

    fn read_texture(&mut self, id: TextureId) -> FxResult<FrameRGBA> {
        let tex = self.texture(id)?;
        let mut data = Vec::with_capacity(tex.px.len() * 4);
        for px in &tex.px {
            for c in px {
                data.push((c.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
        Ok(FrameRGBA {
            width: tex.desc.width,
            height: tex.desc.height,
            data,
            premultiplied: true,
        })
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(&id.0);
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> FxResult<ProgramId> {
        if self.fail_compile.contains(desc.label) {
            return Err(FxError::shader(format!(
                "failed to compile program '{}'",
                desc.label
            )));
        }
        if desc.vertex_source.trim().is_empty() || desc.fragment_source.trim().is_empty() {
            return Err(FxError::shader(format!(
                "program '{}' has an empty shader stage",
                desc.label
            )));
        }
        let id = self.alloc_id();
        self.programs.insert(
            id,
            SoftProgram {
                label: desc.label.to_owned(),
                kernel: desc.kernel,
                blocks: desc.uniform_blocks.to_vec(),
                samplers: desc.samplers.to_vec(),
            },
        );
        self.stats.programs_compiled += 1;
        Ok(ProgramId(id))
    }

    fn release_program(&mut self, id: ProgramId) {
        if self.programs.remove(&id.0).is_some() {
            self.stats.programs_released += 1;
        }
    }

    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> FxResult<BufferId> {
        let size = usize::try_from(size).map_err(|_| FxError::gpu("buffer size overflow"))?;
        let id = self.alloc_id();
        self.buffers.insert(
            id,
            SoftBuffer {
                usage,
                data: vec![0; size],
                mapped: false,
            },
        );
        Ok(BufferId(id))
    }

    fn map_buffer(&mut self, id: BufferId) -> FxResult<&mut [u8]> {
        let buf = self
            .buffers
            .get_mut(&id.0)
            .ok_or_else(|| FxError::gpu(format!("unknown buffer {id:?}")))?;
        if buf.mapped {
            return Err(FxError::gpu(format!("buffer {id:?} is already mapped")));
        }
        buf.mapped = true;
        Ok(&mut buf.data)
    }

    fn unmap_buffer(&mut self, id: BufferId) -> FxResult<()> {
        let buf = self
            .buffers
            .get_mut(&id.0)
            .ok_or_else(|| FxError::gpu(format!("unknown buffer {id:?}")))?;
        buf.mapped = false;
        Ok(())
    }

    fn release_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id.0);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> FxResult<()> {
        let program = self
            .programs
            .get(&call.program.0)
            .ok_or_else(|| FxError::gpu(format!("unknown program {:?}", call.program)))?;

        let vb = self
            .buffers
            .get(&call.vertex_buffer.0)
            .ok_or_else(|| FxError::gpu("unknown vertex buffer"))?;
        if vb.mapped || vb.usage != BufferUsage::Vertex {
            return Err(FxError::gpu("vertex buffer is mapped or has the wrong usage"));
        }
        let needed = (call.vertex_count as usize) * (Vertex::STRIDE as usize);
        if vb.data.len() < needed {
            return Err(FxError::gpu("vertex buffer is smaller than vertex_count"));
        }
        let vertices: Vec<Vertex> = vb.data[..needed]
            .chunks_exact(Vertex::STRIDE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let mut blocks: Vec<&[u8]> = Vec::with_capacity(program.blocks.len());
        for slot in &program.blocks {
            let (_, id) = call
                .uniforms
                .iter()
                .find(|(binding, _)| *binding == slot.binding)
                .ok_or_else(|| FxError::gpu(format!("uniform block '{}' not bound", slot.name)))?;
            let buf = self
                .buffers
                .get(&id.0)
                .ok_or_else(|| FxError::gpu("unknown uniform buffer"))?;
            if buf.mapped || buf.usage != BufferUsage::Uniform {
                return Err(FxError::gpu(format!(
                    "uniform block '{}' is mapped or has the wrong usage",
                    slot.name
                )));
            }
            blocks.push(&buf.data);
        }

        let mut samplers: Vec<&dyn TextureSampler> = Vec::with_capacity(program.samplers.len());
        for slot in &program.samplers {
            let (_, id) = call
                .textures
                .iter()
                .find(|(binding, _)| *binding == slot.binding)
                .ok_or_else(|| FxError::gpu(format!("texture '{}' not bound", slot.name)))?;
            if *id == call.target {
                return Err(FxError::gpu(format!(
                    "texture '{}' is also the render target",
                    slot.name
                )));
            }
            samplers.push(self.texture(*id)?);
        }

        let target = self.texture(call.target)?;
        let hits = self.rasterize(call, target, &vertices);
        let samples = if target.desc.sample_count > 1 { 4.0 } else { 1.0 };
        let width = target.desc.width as usize;
        let kernel = program.kernel;
        let clear = call.clear;

        // Shade into a fresh buffer, then blend; shading reads other textures only.
        let mut shaded: Vec<Option<[f32; 4]>> = vec![None; hits.len()];
        shaded
            .par_chunks_mut(width)
            .zip(hits.par_chunks(width))
            .enumerate()
            .for_each(|(y, (row_out, row_hits))| {
                for (x, (out, hit)) in row_out.iter_mut().zip(row_hits).enumerate() {
                    let Some(hit) = hit else { continue };
                    let frag = Fragment::new(
                        hit.uv,
                        [x as f32 + 0.5, y as f32 + 0.5],
                        &blocks,
                        &samplers,
                    );
                    let coverage = hit.mask.count_ones() as f32 / samples;
                    let c = kernel(&frag);
                    *out = Some([
                        c[0] * coverage,
                        c[1] * coverage,
                        c[2] * coverage,
                        c[3] * coverage,
                    ]);
                }
            });

        let label = program.label.clone();
        let raise = self.error_on_draw.contains(&label);
        let target = self
            .textures
            .get_mut(&call.target.0)
            .ok_or_else(|| FxError::gpu("render target vanished"))?;
        if clear {
            target.px.fill([0.0; 4]);
        }
        target
            .px
            .par_iter_mut()
            .zip(shaded.par_iter())
            .for_each(|(dst, src)| {
                if let Some(s) = src {
                    let inv = 1.0 - s[3];
                    *dst = [
                        s[0] + dst[0] * inv,
                        s[1] + dst[1] * inv,
                        s[2] + dst[2] * inv,
                        s[3] + dst[3] * inv,
                    ];
                }
            });

        self.stats.record_draw(&label);
        tracing::trace!(program = %label, target = ?call.target, "soft draw");
        if raise {
            self.pending_error = Some(format!("injected device error after '{label}'"));
        }
        Ok(())
    }

    fn check_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }

    fn stats(&self) -> GpuStats {
        let mut stats = self.stats.clone();
        stats.textures_alive = self.textures.len();
        stats.buffers_alive = self.buffers.len();
        stats
    }
}
