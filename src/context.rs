use std::borrow::Cow;

use crate::{
    filters::program::{FilterKind, Program, ProgramCache},
    foundation::{
        core::FrameRGBA,
        error::{FxError, FxResult},
    },
    gpu::{Gpu, GpuStats, TextureDesc, TextureId, soft::SoftGpu},
    render::texture_pool::{TexturePool, TexturePoolOpts, TexturePoolStats},
};

/// Renderer tuning shared by every layer drawn through one [`FilterContext`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// The working scale snaps to multiples of `1 / scale_grid`.
    pub scale_grid: u32,
    /// Sample count for filters that antialias their geometry.
    pub msaa_samples: u32,
    /// Let the last filter draw straight onto the canvas when the geometry allows it.
    pub allow_direct_target: bool,
    pub pool: TexturePoolOpts,
    /// Premultiplied clear color of scene output frames.
    pub clear_rgba: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            scale_grid: 20,
            msaa_samples: 4,
            allow_direct_target: true,
            pool: TexturePoolOpts::default(),
            clear_rgba: [0.0; 4],
        }
    }
}

impl RenderSettings {
    pub fn from_json(s: &str) -> FxResult<Self> {
        let settings: Self = serde_json::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> FxResult<()> {
        if self.scale_grid == 0 {
            return Err(FxError::validation("scale_grid must be > 0"));
        }
        if !matches!(self.msaa_samples, 1 | 2 | 4 | 8) {
            return Err(FxError::validation(format!(
                "msaa_samples must be 1, 2, 4 or 8, got {}",
                self.msaa_samples
            )));
        }
        Ok(())
    }
}

/// One GPU context and everything cached against it.
///
/// Owns the device, the compiled programs and the intermediate texture pool. Contexts never share
/// programs; dropping a context releases all of its GPU objects.
pub struct FilterContext {
    gpu: Box<dyn Gpu>,
    programs: ProgramCache,
    pool: TexturePool,
    settings: RenderSettings,
}

impl FilterContext {
    pub fn new(gpu: Box<dyn Gpu>) -> Self {
        Self::with_settings(gpu, RenderSettings::default())
    }

    pub fn with_settings(gpu: Box<dyn Gpu>, settings: RenderSettings) -> Self {
        Self {
            gpu,
            programs: ProgramCache::new(),
            pool: TexturePool::new(settings.pool),
            settings,
        }
    }

    /// Context on the software device.
    pub fn soft() -> Self {
        Self::new(Box::new(SoftGpu::new()))
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Cached program for `kind`, compiled on first use.
    pub fn program(&mut self, kind: FilterKind) -> Option<Program> {
        self.programs.get_or_create(self.gpu.as_mut(), kind)
    }

    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn gpu(&self) -> &dyn Gpu {
        self.gpu.as_ref()
    }

    pub fn gpu_mut(&mut self) -> &mut dyn Gpu {
        self.gpu.as_mut()
    }

    pub fn gpu_stats(&self) -> GpuStats {
        self.gpu.stats()
    }

    pub fn pool_stats(&self) -> TexturePoolStats {
        self.pool.stats()
    }

    /// A cleared texture from the pool. Give it back with [`FilterContext::recycle_texture`].
    pub fn acquire_texture(
        &mut self,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> FxResult<TextureId> {
        let desc = TextureDesc {
            width,
            height,
            sample_count: sample_count.max(1),
        };
        let id = self.pool.acquire(self.gpu.as_mut(), desc)?;
        if let Err(e) = self.gpu.clear_texture(id, [0.0; 4]) {
            self.pool.recycle(self.gpu.as_mut(), id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn recycle_texture(&mut self, id: TextureId) {
        self.pool.recycle(self.gpu.as_mut(), id);
    }

    /// Upload `frame` into a new texture, premultiplying when needed. The caller releases it.
    pub fn upload_image(&mut self, frame: &FrameRGBA) -> FxResult<TextureId> {
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.data.len() != expected {
            return Err(FxError::validation(format!(
                "image {}x{} carries {} bytes, expected {expected}",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        let id = self
            .gpu
            .create_texture(TextureDesc::new(frame.width, frame.height))?;
        let pixels = premultiplied(frame);
        if let Err(e) = self.gpu.upload_texture(id, &pixels) {
            self.gpu.release_texture(id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn release_texture(&mut self, id: TextureId) {
        self.gpu.release_texture(id);
    }

    pub fn read_texture(&mut self, id: TextureId) -> FxResult<FrameRGBA> {
        self.gpu.read_texture(id)
    }

    /// Release every cached program and pooled texture. Programs recompile on next use.
    pub fn flush(&mut self) {
        self.programs.release_all(self.gpu.as_mut());
        self.pool.clear(self.gpu.as_mut());
    }
}

impl Drop for FilterContext {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for FilterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("backend", &self.gpu.name())
            .field("programs", &self.programs.len())
            .field("settings", &self.settings)
            .finish()
    }
}

fn premultiplied(frame: &FrameRGBA) -> Cow<'_, [u8]> {
    if frame.premultiplied {
        return Cow::Borrowed(&frame.data);
    }
    let mut out = frame.data.clone();
    for px in out.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * a + 127) / 255) as u8;
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_fill_missing_fields() {
        let s = RenderSettings::from_json(r#"{ "scale_grid": 10 }"#).unwrap();
        assert_eq!(s.scale_grid, 10);
        assert_eq!(s.msaa_samples, 4);
        assert!(s.allow_direct_target);
    }

    #[test]
    fn settings_reject_zero_grid() {
        assert!(RenderSettings::from_json(r#"{ "scale_grid": 0 }"#).is_err());
        assert!(RenderSettings::from_json(r#"{ "msaa_samples": 3 }"#).is_err());
    }

    #[test]
    fn upload_premultiplies_straight_alpha() {
        let mut ctx = FilterContext::soft();
        let frame = FrameRGBA {
            width: 1,
            height: 1,
            data: vec![255, 0, 0, 128],
            premultiplied: false,
        };
        let id = ctx.upload_image(&frame).unwrap();
        let back = ctx.read_texture(id).unwrap();
        assert_eq!(back.pixel(0, 0), [128, 0, 0, 128]);
        ctx.release_texture(id);
    }

    #[test]
    fn flush_releases_programs_and_pool() {
        let mut ctx = FilterContext::soft();
        assert!(ctx.program(FilterKind::Levels).is_some());
        let t = ctx.acquire_texture(4, 4, 1).unwrap();
        ctx.recycle_texture(t);
        ctx.flush();
        let stats = ctx.gpu_stats();
        assert_eq!(stats.textures_alive, 0);
        assert_eq!(stats.buffers_alive, 0);
        assert!(ctx.programs().is_empty());
    }
}
