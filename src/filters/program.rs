use std::collections::HashMap;

use crate::{
    filters::{
        blur, bulge, corner_pin, displacement_map, glow, layer_style, levels, mosaic, motion_blur,
        motion_tile, radial_blur, runtime, transform_3d, uniforms::UniformBinding,
    },
    foundation::error::FxResult,
    gpu::{BufferId, BufferUsage, FragmentKernel, Gpu, ProgramDesc, ProgramId, Vertex},
};

/// Upper bound on vertices per draw; every program's vertex buffer is sized for it.
pub const MAX_VERTICES: usize = 16;

/// Every program type the pipeline can draw with. Keys the per-context program cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKind {
    Passthrough,
    Levels,
    Mosaic,
    BlurPass,
    Glow,
    RadialBlur,
    Bulge,
    CornerPin,
    MotionTile,
    DisplacementMap,
    MotionBlur,
    Transform3D,
    DropShadow,
    OuterGlow,
    Stroke,
    GradientOverlay,
}

impl FilterKind {
    pub const ALL: [FilterKind; 16] = [
        FilterKind::Passthrough,
        FilterKind::Levels,
        FilterKind::Mosaic,
        FilterKind::BlurPass,
        FilterKind::Glow,
        FilterKind::RadialBlur,
        FilterKind::Bulge,
        FilterKind::CornerPin,
        FilterKind::MotionTile,
        FilterKind::DisplacementMap,
        FilterKind::MotionBlur,
        FilterKind::Transform3D,
        FilterKind::DropShadow,
        FilterKind::OuterGlow,
        FilterKind::Stroke,
        FilterKind::GradientOverlay,
    ];

    pub fn descriptor(self) -> &'static ProgramDescriptor {
        match self {
            FilterKind::Passthrough => &runtime::PASSTHROUGH,
            FilterKind::Levels => &levels::DESCRIPTOR,
            FilterKind::Mosaic => &mosaic::DESCRIPTOR,
            FilterKind::BlurPass => &blur::DESCRIPTOR,
            FilterKind::Glow => &glow::DESCRIPTOR,
            FilterKind::RadialBlur => &radial_blur::DESCRIPTOR,
            FilterKind::Bulge => &bulge::DESCRIPTOR,
            FilterKind::CornerPin => &corner_pin::DESCRIPTOR,
            FilterKind::MotionTile => &motion_tile::DESCRIPTOR,
            FilterKind::DisplacementMap => &displacement_map::DESCRIPTOR,
            FilterKind::MotionBlur => &motion_blur::DESCRIPTOR,
            FilterKind::Transform3D => &transform_3d::DESCRIPTOR,
            FilterKind::DropShadow => &layer_style::drop_shadow::DESCRIPTOR,
            FilterKind::OuterGlow => &layer_style::outer_glow::DESCRIPTOR,
            FilterKind::Stroke => &layer_style::stroke::DESCRIPTOR,
            FilterKind::GradientOverlay => &layer_style::gradient_overlay::DESCRIPTOR,
        }
    }

    pub fn label(self) -> &'static str {
        self.descriptor().label
    }
}

/// Static description of one program type: shader sources, binding contract, CPU kernel.
pub struct ProgramDescriptor {
    pub label: &'static str,
    pub vertex_source: &'static str,
    pub fragment_source: &'static str,
    pub binding: UniformBinding,
    pub kernel: FragmentKernel,
}

impl ProgramDescriptor {
    pub fn program_desc(&self) -> ProgramDesc<'static> {
        ProgramDesc {
            label: self.label,
            vertex_source: self.vertex_source,
            fragment_source: self.fragment_source,
            uniform_blocks: self.binding.blocks,
            samplers: self.binding.samplers,
            kernel: self.kernel,
        }
    }
}

/// A compiled program and the vertex buffer reused by every draw with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Program {
    pub id: ProgramId,
    pub vertex_buffer: BufferId,
}

#[derive(Clone, Copy, Debug)]
enum Entry {
    Ready(Program),
    Failed,
}

/// Compiled programs of one GPU context, keyed by [`FilterKind`].
///
/// Each kind compiles at most once per context. A failed compile is remembered and not retried
/// until [`ProgramCache::release_all`].
#[derive(Debug, Default)]
pub struct ProgramCache {
    entries: HashMap<FilterKind, Entry>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached program for `kind`, compiling it on first use. `None` when compilation failed.
    pub fn get_or_create(&mut self, gpu: &mut dyn Gpu, kind: FilterKind) -> Option<Program> {
        if let Some(entry) = self.entries.get(&kind) {
            return match *entry {
                Entry::Ready(p) => Some(p),
                Entry::Failed => None,
            };
        }

        let entry = match Self::build(gpu, kind) {
            Ok(p) => {
                tracing::debug!(program = kind.label(), backend = gpu.name(), "compiled program");
                Entry::Ready(p)
            }
            Err(e) => {
                tracing::warn!(program = kind.label(), error = %e, "failed to build program");
                Entry::Failed
            }
        };
        self.entries.insert(kind, entry);
        match entry {
            Entry::Ready(p) => Some(p),
            Entry::Failed => None,
        }
    }

    fn build(gpu: &mut dyn Gpu, kind: FilterKind) -> FxResult<Program> {
        let desc = kind.descriptor().program_desc();
        let id = gpu.create_program(&desc)?;
        let vertex_buffer =
            match gpu.create_buffer(BufferUsage::Vertex, Vertex::STRIDE * MAX_VERTICES as u64) {
                Ok(b) => b,
                Err(e) => {
                    gpu.release_program(id);
                    return Err(e);
                }
            };
        Ok(Program { id, vertex_buffer })
    }

    pub fn contains(&self, kind: FilterKind) -> bool {
        matches!(self.entries.get(&kind), Some(Entry::Ready(_)))
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every program and vertex buffer, and forget failed compiles.
    pub fn release_all(&mut self, gpu: &mut dyn Gpu) {
        for (_, entry) in self.entries.drain() {
            if let Entry::Ready(p) = entry {
                gpu.release_buffer(p.vertex_buffer);
                gpu.release_program(p.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::soft::SoftGpu;

    #[test]
    fn same_kind_compiles_once() {
        let mut gpu = SoftGpu::new();
        let mut cache = ProgramCache::new();
        let a = cache.get_or_create(&mut gpu, FilterKind::Levels).unwrap();
        let b = cache.get_or_create(&mut gpu, FilterKind::Levels).unwrap();
        assert_eq!(a, b);
        assert_eq!(gpu.stats().programs_compiled, 1);
        cache.get_or_create(&mut gpu, FilterKind::Mosaic).unwrap();
        assert_eq!(gpu.stats().programs_compiled, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_compile_is_remembered() {
        let mut gpu = SoftGpu::new().fail_compile_of(FilterKind::Glow.label());
        let mut cache = ProgramCache::new();
        assert!(cache.get_or_create(&mut gpu, FilterKind::Glow).is_none());
        assert!(cache.get_or_create(&mut gpu, FilterKind::Glow).is_none());
        assert!(!cache.contains(FilterKind::Glow));
        assert_eq!(gpu.stats().programs_compiled, 0);
    }

    #[test]
    fn release_all_frees_gpu_objects() {
        let mut gpu = SoftGpu::new();
        let mut cache = ProgramCache::new();
        for kind in FilterKind::ALL {
            cache.get_or_create(&mut gpu, kind).unwrap();
        }
        assert_eq!(gpu.stats().buffers_alive, FilterKind::ALL.len());
        cache.release_all(&mut gpu);
        assert!(cache.is_empty());
        let stats = gpu.stats();
        assert_eq!(stats.programs_released, FilterKind::ALL.len() as u64);
        assert_eq!(stats.buffers_alive, 0);
    }

    #[test]
    fn every_kind_has_a_distinct_label_and_both_stages() {
        let mut labels: Vec<_> = FilterKind::ALL.iter().map(|k| k.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), FilterKind::ALL.len());
        for kind in FilterKind::ALL {
            let d = kind.descriptor();
            assert!(d.vertex_source.contains("@vertex"), "{}", d.label);
            assert!(d.fragment_source.contains("@fragment"), "{}", d.label);
            assert!(d.fragment_source.contains("fn fs("), "{}", d.label);
        }
    }
}
