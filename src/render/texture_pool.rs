use std::collections::HashMap;

use crate::{
    foundation::error::FxResult,
    gpu::{Gpu, TextureDesc, TextureId},
};

/// Pool configuration for recycled filter buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TexturePoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained textures per (w,h,samples) bucket.
    pub max_textures_per_bucket: usize,
}

impl Default for TexturePoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 256 * 1024 * 1024,
            max_textures_per_bucket: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TextureKey {
    w: u32,
    h: u32,
    samples: u32,
}

impl TextureKey {
    fn from_desc(desc: TextureDesc) -> Self {
        Self {
            w: desc.width,
            h: desc.height,
            samples: desc.sample_count.max(1),
        }
    }

    fn byte_len(self) -> usize {
        (self.w as usize)
            .saturating_mul(self.h as usize)
            .saturating_mul(4)
            .saturating_mul(self.samples as usize)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TexturePoolStats {
    pub retained_textures: usize,
    pub retained_bytes: usize,
    pub alloc_textures: u64,
    pub reused_textures: u64,
    pub dropped_on_release: u64,
}

/// Bounded reuse of intermediate filter buffers for one device.
///
/// Keyed by `(width, height, samples)`. A texture handed out by [`TexturePool::acquire`] belongs to
/// the caller until it comes back through [`TexturePool::recycle`]; the pool releases what it
/// cannot keep.
#[derive(Debug, Default)]
pub struct TexturePool {
    opts: TexturePoolOpts,
    stats: TexturePoolStats,
    buckets: HashMap<TextureKey, Vec<TextureId>>,
}

impl TexturePool {
    pub fn new(opts: TexturePoolOpts) -> Self {
        Self {
            opts,
            stats: TexturePoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    pub fn stats(&self) -> TexturePoolStats {
        self.stats.clone()
    }

    pub fn acquire(&mut self, gpu: &mut dyn Gpu, desc: TextureDesc) -> FxResult<TextureId> {
        let key = TextureKey::from_desc(desc);
        if let Some(id) = self.buckets.get_mut(&key).and_then(Vec::pop) {
            self.stats.retained_textures = self.stats.retained_textures.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(key.byte_len());
            self.stats.reused_textures = self.stats.reused_textures.saturating_add(1);
            return Ok(id);
        }

        let id = gpu.create_texture(desc)?;
        self.stats.alloc_textures = self.stats.alloc_textures.saturating_add(1);
        Ok(id)
    }

    pub fn recycle(&mut self, gpu: &mut dyn Gpu, id: TextureId) {
        let Some(desc) = gpu.texture_desc(id) else {
            return;
        };
        let key = TextureKey::from_desc(desc);
        let bytes = key.byte_len();
        let bucket = self.buckets.entry(key).or_default();
        if self.opts.max_textures_per_bucket == 0
            || bucket.len() >= self.opts.max_textures_per_bucket
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            gpu.release_texture(id);
            return;
        }

        bucket.push(id);
        self.stats.retained_textures = self.stats.retained_textures.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
    }

    /// Release every retained texture.
    pub fn clear(&mut self, gpu: &mut dyn Gpu) {
        for (_, ids) in self.buckets.drain() {
            for id in ids {
                gpu.release_texture(id);
            }
        }
        self.stats.retained_textures = 0;
        self.stats.retained_bytes = 0;
    }
}
