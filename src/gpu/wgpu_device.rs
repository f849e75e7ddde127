use std::collections::HashMap;

use crate::{
    foundation::{
        core::FrameRGBA,
        error::{FxError, FxResult},
    },
    gpu::{
        BindingSlot, BufferId, BufferUsage, DrawCall, Gpu, GpuStats, ProgramDesc, ProgramId,
        TextureDesc, TextureId, Vertex,
    },
};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Every multisampled target renders with this many samples.
const MSAA_SAMPLES: u32 = 4;

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Multisampled attachment; draws resolve into `texture`.
    msaa: Option<wgpu::TextureView>,
}

struct GpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_blocks: Vec<BindingSlot>,
    samplers: Vec<BindingSlot>,
    /// Keyed by sample count.
    pipelines: HashMap<u32, wgpu::RenderPipeline>,
}

struct GpuBuffer {
    usage: BufferUsage,
    buffer: wgpu::Buffer,
    shadow: Vec<u8>,
    mapped: bool,
}

/// [`Gpu`] on a headless `wgpu` device.
///
/// Buffers are mapped through a host shadow copy that is uploaded on unmap. Validation errors are
/// captured with error scopes around compiles and draws and reported by [`Gpu::check_error`].
pub struct WgpuGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    sampler: wgpu::Sampler,
    next_id: u64,
    textures: HashMap<u64, GpuTexture>,
    programs: HashMap<u64, GpuProgram>,
    buffers: HashMap<u64, GpuBuffer>,
    stats: GpuStats,
    pending_error: Option<String>,
}

impl WgpuGpu {
    /// Open the default adapter. Fails with a GPU error when none is available.
    pub fn new() -> FxResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => FxError::gpu("no gpu adapter available"),
            other => FxError::gpu(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("layerfx_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| FxError::gpu(format!("wgpu request_device failed: {e:?}")))?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("layerfx_linear_clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        tracing::debug!(adapter = ?adapter.get_info().name, "wgpu device ready");
        Ok(Self {
            device,
            queue,
            sampler,
            next_id: 1,
            textures: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            stats: GpuStats::default(),
            pending_error: None,
        })
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, id: TextureId) -> FxResult<&GpuTexture> {
        self.textures
            .get(&id.0)
            .ok_or_else(|| FxError::gpu(format!("unknown texture {id:?}")))
    }

    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f(&self.device);
        let err = pollster::block_on(self.device.pop_error_scope()).map(|e| e.to_string());
        (out, err)
    }

    fn ensure_pipeline(&mut self, program: ProgramId, sample_count: u32) -> FxResult<()> {
        let prog = self
            .programs
            .get(&program.0)
            .ok_or_else(|| FxError::gpu(format!("unknown program {program:?}")))?;
        if prog.pipelines.contains_key(&sample_count) {
            return Ok(());
        }
        let (pipeline, err) = self.scoped(|device| build_pipeline(device, prog, sample_count));
        if let Some(err) = err {
            return Err(FxError::shader(format!(
                "pipeline for '{}' failed: {err}",
                prog.label
            )));
        }
        if let Some(prog) = self.programs.get_mut(&program.0) {
            prog.pipelines.insert(sample_count, pipeline);
        }
        Ok(())
    }

    fn clear_pass(&self, tex: &GpuTexture, color: wgpu::Color) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("layerfx_clear_encoder"),
            });
        {
            let (view, resolve_target) = attachment(tex);
            let _rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("layerfx_clear_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }
}

fn attachment(tex: &GpuTexture) -> (&wgpu::TextureView, Option<&wgpu::TextureView>) {
    match &tex.msaa {
        Some(msaa) => (msaa, Some(&tex.view)),
        None => (&tex.view, None),
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    prog: &GpuProgram,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    let attributes = wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x2];
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&prog.label),
        layout: Some(&prog.layout),
        vertex: wgpu::VertexState {
            module: &prog.module,
            entry_point: Some("vs"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: Vertex::STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: &prog.module,
            entry_point: Some("fs"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: FORMAT,
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn align_to(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

impl Gpu for WgpuGpu {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_texture(&mut self, desc: TextureDesc) -> FxResult<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(FxError::validation("texture size must be non-zero"));
        }
        let max = self.max_texture_size();
        if desc.width > max || desc.height > max {
            return Err(FxError::gpu(format!(
                "texture {}x{} exceeds max size {max}",
                desc.width, desc.height
            )));
        }
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("layerfx_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let msaa = (desc.sample_count > 1).then(|| {
            self.device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("layerfx_texture_msaa"),
                    size,
                    mip_level_count: 1,
                    sample_count: MSAA_SAMPLES,
                    dimension: wgpu::TextureDimension::D2,
                    format: FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        let id = self.alloc_id();
        self.textures.insert(
            id,
            GpuTexture {
                desc,
                texture,
                view,
                msaa,
            },
        );
        Ok(TextureId(id))
    }

    fn texture_desc(&self, id: TextureId) -> Option<TextureDesc> {
        self.textures.get(&id.0).map(|t| t.desc)
    }

    fn upload_texture(&mut self, id: TextureId, rgba8: &[u8]) -> FxResult<()> {
        let tex = self.texture(id)?;
        let (w, h) = (tex.desc.width, tex.desc.height);
        if rgba8.len() != (w as usize) * (h as usize) * 4 {
            return Err(FxError::validation(
                "upload_texture expects width*height*4 bytes",
            ));
        }
        if tex.msaa.is_some() {
            return Err(FxError::gpu("cannot upload into a multisampled texture"));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba8,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(w * 4),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn clear_texture(&mut self, id: TextureId, rgba: [f32; 4]) -> FxResult<()> {
        let [r, g, b, a] = rgba.map(f64::from);
        let tex = self.texture(id)?;
        self.clear_pass(tex, wgpu::Color { r, g, b, a });
        Ok(())
    }

    fn read_texture(&mut self, id: TextureId) -> FxResult<FrameRGBA> {
        let tex = self.texture(id)?;
        let (width, height) = (tex.desc.width, tex.desc.height);
        let row_bytes = u64::from(width) * 4;
        let padded_row_bytes = align_to(row_bytes, u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT));
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("layerfx_readback"),
            size: padded_row_bytes * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("layerfx_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| FxError::gpu(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| FxError::gpu("readback channel closed"))?
            .map_err(|e| FxError::gpu(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let mut data = Vec::with_capacity((row_bytes * u64::from(height)) as usize);
        for row in 0..height as usize {
            let start = row * padded_row_bytes as usize;
            data.extend_from_slice(&mapped[start..start + row_bytes as usize]);
        }
        drop(mapped);
        readback.unmap();

        Ok(FrameRGBA {
            width,
            height,
            data,
            premultiplied: true,
        })
    }

    fn release_texture(&mut self, id: TextureId) {
        if let Some(tex) = self.textures.remove(&id.0) {
            tex.texture.destroy();
        }
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> FxResult<ProgramId> {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        entries.extend(desc.samplers.iter().map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot.binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        }));
        entries.extend(desc.uniform_blocks.iter().map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot.binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }));

        let source = format!("{}\n{}", desc.vertex_source, desc.fragment_source);
        let ((module, bind_group_layout, layout), err) = self.scoped(|device| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(desc.label),
                    entries: &entries,
                });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            (module, bind_group_layout, layout)
        });
        if let Some(err) = err {
            return Err(FxError::shader(format!(
                "failed to compile program '{}': {err}",
                desc.label
            )));
        }

        let id = self.alloc_id();
        self.programs.insert(
            id,
            GpuProgram {
                label: desc.label.to_owned(),
                module,
                layout,
                bind_group_layout,
                uniform_blocks: desc.uniform_blocks.to_vec(),
                samplers: desc.samplers.to_vec(),
                pipelines: HashMap::new(),
            },
        );
        // Build the single-sampled pipeline now so entry point errors surface at compile time.
        if let Err(e) = self.ensure_pipeline(ProgramId(id), 1) {
            self.programs.remove(&id);
            return Err(e);
        }
        self.stats.programs_compiled += 1;
        Ok(ProgramId(id))
    }

    fn release_program(&mut self, id: ProgramId) {
        if self.programs.remove(&id.0).is_some() {
            self.stats.programs_released += 1;
        }
    }

    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> FxResult<BufferId> {
        let size = align_to(size.max(16), 16);
        let shadow_len = usize::try_from(size).map_err(|_| FxError::gpu("buffer size overflow"))?;
        let wgpu_usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        } | wgpu::BufferUsages::COPY_DST;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("layerfx_buffer"),
            size,
            usage: wgpu_usage,
            mapped_at_creation: false,
        });
        let id = self.alloc_id();
        self.buffers.insert(
            id,
            GpuBuffer {
                usage,
                buffer,
                shadow: vec![0; shadow_len],
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
        Ok(&mut buf.shadow)
    }

    fn unmap_buffer(&mut self, id: BufferId) -> FxResult<()> {
        let buf = self
            .buffers
            .get_mut(&id.0)
            .ok_or_else(|| FxError::gpu(format!("unknown buffer {id:?}")))?;
        if buf.mapped {
            self.queue.write_buffer(&buf.buffer, 0, &buf.shadow);
            buf.mapped = false;
        }
        Ok(())
    }

    fn release_buffer(&mut self, id: BufferId) {
        if let Some(buf) = self.buffers.remove(&id.0) {
            buf.buffer.destroy();
        }
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> FxResult<()> {
        let target_samples = self
            .texture(call.target)?
            .msaa
            .as_ref()
            .map_or(1, |_| MSAA_SAMPLES);
        self.ensure_pipeline(call.program, target_samples)?;

        let program = self
            .programs
            .get(&call.program.0)
            .ok_or_else(|| FxError::gpu(format!("unknown program {:?}", call.program)))?;
        let pipeline = program
            .pipelines
            .get(&target_samples)
            .ok_or_else(|| FxError::gpu("pipeline vanished"))?;

        let vb = self
            .buffers
            .get(&call.vertex_buffer.0)
            .ok_or_else(|| FxError::gpu("unknown vertex buffer"))?;
        if vb.mapped || vb.usage != BufferUsage::Vertex {
            return Err(FxError::gpu("vertex buffer is mapped or has the wrong usage"));
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        }];
        for slot in &program.uniform_blocks {
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
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: buf.buffer.as_entire_binding(),
            });
        }
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
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: wgpu::BindingResource::TextureView(&self.texture(*id)?.view),
            });
        }

        let target = self.texture(call.target)?;
        let label = program.label.clone();
        let (_, err) = self.scoped(|device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&label),
                layout: &program.bind_group_layout,
                entries: &entries,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&label),
            });
            {
                let (view, resolve_target) = attachment(target);
                let load = if call.clear {
                    wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
                } else {
                    wgpu::LoadOp::Load
                };
                let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(&label),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target,
                        depth_slice: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                rp.set_pipeline(pipeline);
                rp.set_bind_group(0, &bind_group, &[]);
                rp.set_vertex_buffer(0, vb.buffer.slice(..));
                if let Some(s) = call.scissor {
                    let x = s.x.min(target.desc.width);
                    let y = s.y.min(target.desc.height);
                    let w = s.width.min(target.desc.width - x);
                    let h = s.height.min(target.desc.height - y);
                    rp.set_scissor_rect(x, y, w, h);
                }
                rp.draw(0..call.vertex_count, 0..1);
            }
            self.queue.submit(Some(encoder.finish()));
        });

        self.stats.record_draw(&label);
        tracing::trace!(program = %label, target = ?call.target, "wgpu draw");
        if let Some(err) = err {
            self.pending_error = Some(err);
        }
        Ok(())
    }

    fn check_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }

    fn stats(&self) -> GpuStats {
        GpuStats {
            textures_alive: self.textures.len(),
            buffers_alive: self.buffers.len(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_power_of_two() {
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 16), 272);
    }
}
