//! Minimal drawing surface consumed by the filter pipeline.
//!
//! A [`Canvas`] either draws into a device texture or records its draws into a [`Picture`]. Only
//! image draws exist; everything a layer renders reaches the pipeline as textures.

use crate::{
    context::FilterContext,
    filters::{
        blur::offset_between,
        effect_filter::LayerFilter,
        runtime::{FilterSource, FilterTarget, PassArgs, PassthroughFilter, draw_pass},
    },
    foundation::{
        core::{Affine, FrameRGBA, Rect, Vec2},
        error::FxResult,
        math::{intersect, round_out},
    },
    gpu::{ScissorRect, TextureId},
};

/// A texture with its pixel size. Does not own the texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Image {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
}

impl Image {
    /// Upload `frame` as a new image. Release it with [`FilterContext::release_texture`].
    pub fn upload(ctx: &mut FilterContext, frame: &FrameRGBA) -> FxResult<Self> {
        let texture = ctx.upload_image(frame)?;
        Ok(Self {
            texture,
            width: frame.width,
            height: frame.height,
        })
    }

    /// Pixel rect of the image in its own space.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    /// Rasterize `bounds` of `picture` at `scale` into a pooled texture.
    pub fn from_picture(
        ctx: &mut FilterContext,
        picture: &Picture,
        bounds: Rect,
        scale: f64,
    ) -> FxResult<Self> {
        let width = (bounds.width() * scale).ceil().max(1.0) as u32;
        let height = (bounds.height() * scale).ceil().max(1.0) as u32;
        let texture = ctx.acquire_texture(width, height, 1)?;
        let mut canvas = Canvas::new(texture, width, height);
        canvas.set_matrix(Affine::scale(scale) * Affine::translate(-bounds.origin().to_vec2()));
        if let Err(e) = canvas.draw_picture(ctx, picture) {
            ctx.recycle_texture(texture);
            return Err(e);
        }
        Ok(Self {
            texture,
            width,
            height,
        })
    }

    /// Apply `filter` to this image. Returns the filtered image, taken from the pool, and the
    /// offset of its origin in this image's space. `None` when the result misses `clip`.
    pub fn make_with_filter(
        &self,
        ctx: &mut FilterContext,
        filter: &LayerFilter,
        clip: Option<Rect>,
    ) -> FxResult<Option<(Image, Vec2)>> {
        let input = self.bounds();
        let mut output = round_out(filter.filter_bounds(input));
        if let Some(clip) = clip {
            match intersect(output, round_out(clip)) {
                Some(r) => output = r,
                None => return Ok(None),
            }
        }
        let width = output.width().max(1.0) as u32;
        let height = output.height().max(1.0) as u32;
        let samples = if filter.needs_msaa() {
            ctx.settings().msaa_samples
        } else {
            1
        };
        let texture = ctx.acquire_texture(width, height, samples)?;
        let unit = Vec2::new(1.0, 1.0);
        let source = FilterSource {
            texture: self.texture,
            width: self.width,
            height: self.height,
            scale: unit,
        };
        let target = FilterTarget::offscreen(texture, width, height);
        let drawn = filter.draw(
            ctx,
            &source,
            &target,
            input,
            output,
            offset_between(input, output, unit),
        );
        if let Err(e) = drawn {
            ctx.recycle_texture(texture);
            return Err(e);
        }
        Ok(Some((
            Image {
                texture,
                width,
                height,
            },
            output.origin().to_vec2(),
        )))
    }
}

/// Something a layer draws. Implemented by pictures and by scene sources.
pub trait Content {
    /// Tight bounds of what [`Content::draw`] touches, in content space.
    fn bounds(&self) -> Rect;

    fn draw(&self, ctx: &mut FilterContext, canvas: &mut Canvas) -> FxResult<()>;
}

/// One recorded image draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PictureOp {
    pub image: Image,
    pub matrix: Affine,
    pub alpha: f32,
}

/// A replayable list of image draws.
///
/// Images are referenced, not owned; their textures must outlive every replay.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Picture {
    ops: Vec<PictureOp>,
}

impl Picture {
    pub fn ops(&self) -> &[PictureOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Content for Picture {
    fn bounds(&self) -> Rect {
        self.ops
            .iter()
            .map(|op| op.matrix.transform_rect_bbox(op.image.bounds()))
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::ZERO)
    }

    fn draw(&self, ctx: &mut FilterContext, canvas: &mut Canvas) -> FxResult<()> {
        canvas.draw_picture(ctx, self)
    }
}

#[derive(Default)]
pub struct PictureRecorder {
    canvas: Option<Canvas>,
}

impl PictureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh recording and return the canvas that records it.
    pub fn begin_recording(&mut self) -> &mut Canvas {
        self.canvas.insert(Canvas::recording())
    }

    /// The draws recorded since [`PictureRecorder::begin_recording`], or `None` when no recording
    /// is active.
    pub fn finish_recording_as_picture(&mut self) -> Option<Picture> {
        match self.canvas.take()?.surface {
            Surface::Recording(ops) => Some(Picture { ops }),
            Surface::Texture { .. } => None,
        }
    }
}

#[derive(Debug)]
enum Surface {
    Texture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    Recording(Vec<PictureOp>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CanvasState {
    matrix: Affine,
    /// Device space. `None` is unbounded.
    clip: Option<Rect>,
    alpha: f32,
}

#[derive(Debug)]
pub struct Canvas {
    surface: Surface,
    state: CanvasState,
    stack: Vec<CanvasState>,
}

impl Canvas {
    /// Canvas drawing into `texture`, clipped to its extent.
    pub fn new(texture: TextureId, width: u32, height: u32) -> Self {
        Self {
            surface: Surface::Texture {
                texture,
                width,
                height,
            },
            state: CanvasState {
                matrix: Affine::IDENTITY,
                clip: Some(Rect::new(0.0, 0.0, f64::from(width), f64::from(height))),
                alpha: 1.0,
            },
            stack: Vec::new(),
        }
    }

    fn recording() -> Self {
        Self {
            surface: Surface::Recording(Vec::new()),
            state: CanvasState {
                matrix: Affine::IDENTITY,
                clip: None,
                alpha: 1.0,
            },
            stack: Vec::new(),
        }
    }

    /// The target texture and its size, `None` while recording.
    pub fn target(&self) -> Option<(TextureId, u32, u32)> {
        match self.surface {
            Surface::Texture {
                texture,
                width,
                height,
            } => Some((texture, width, height)),
            Surface::Recording(_) => None,
        }
    }

    pub fn save(&mut self) {
        self.stack.push(self.state);
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    pub fn matrix(&self) -> Affine {
        self.state.matrix
    }

    pub fn set_matrix(&mut self, matrix: Affine) {
        self.state.matrix = matrix;
    }

    /// Pre-concatenate `m`: it applies before the current matrix.
    pub fn concat(&mut self, m: Affine) {
        self.state.matrix = self.state.matrix * m;
    }

    pub fn alpha(&self) -> f32 {
        self.state.alpha
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Intersect the clip with `rect` mapped by the current matrix.
    pub fn clip_rect(&mut self, rect: Rect) {
        let device = self.state.matrix.transform_rect_bbox(rect);
        let clip = match self.state.clip {
            Some(c) => intersect(c, device).unwrap_or(Rect::ZERO),
            None => device,
        };
        self.state.clip = Some(clip);
    }

    pub fn device_clip(&self) -> Option<Rect> {
        self.state.clip
    }

    /// The clip in the current local space, `None` when unbounded or the matrix is singular.
    pub fn local_clip_bounds(&self) -> Option<Rect> {
        let clip = self.state.clip?;
        if self.state.matrix.determinant().abs() < 1e-12 {
            return None;
        }
        Some(self.state.matrix.inverse().transform_rect_bbox(clip))
    }

    pub fn clear(&mut self, ctx: &mut FilterContext, rgba: [f32; 4]) -> FxResult<()> {
        match self.surface {
            Surface::Texture { texture, .. } => ctx.gpu_mut().clear_texture(texture, rgba),
            Surface::Recording(ref mut ops) => {
                ops.clear();
                Ok(())
            }
        }
    }

    /// Scissor for the current clip, `None` when it covers nothing.
    pub fn scissor(&self) -> Option<ScissorRect> {
        let (_, width, height) = self.target()?;
        let full = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
        let clip = intersect(round_out(self.state.clip.unwrap_or(full)), full)?;
        Some(ScissorRect {
            x: clip.x0 as u32,
            y: clip.y0 as u32,
            width: clip.width() as u32,
            height: clip.height() as u32,
        })
    }

    /// Draw `image` mapped by `local` and the current matrix, scaled by the canvas alpha.
    pub fn draw_image(
        &mut self,
        ctx: &mut FilterContext,
        image: &Image,
        local: Affine,
    ) -> FxResult<()> {
        let matrix = self.state.matrix * local;
        let alpha = self.state.alpha;
        let (texture, width, height) = match &mut self.surface {
            Surface::Recording(ops) => {
                ops.push(PictureOp {
                    image: *image,
                    matrix,
                    alpha,
                });
                return Ok(());
            }
            Surface::Texture {
                texture,
                width,
                height,
            } => (*texture, *width, *height),
        };
        let Some(scissor) = self.scissor() else {
            tracing::trace!("image outside clip, nothing drawn");
            return Ok(());
        };
        if alpha <= 0.0 {
            return Ok(());
        }

        let source = FilterSource {
            texture: image.texture,
            width: image.width,
            height: image.height,
            scale: Vec2::new(1.0, 1.0),
        };
        let target = FilterTarget {
            texture,
            width,
            height,
            matrix,
            clear: false,
            scissor: Some(scissor),
        };
        let bounds = image.bounds();
        draw_pass(
            ctx,
            &PassthroughFilter { alpha },
            &PassArgs {
                source: &source,
                target: &target,
                input_bounds: bounds,
                output_bounds: bounds,
                offset: Vec2::ZERO,
            },
        )
    }

    /// Replay `picture` under the current matrix and alpha.
    pub fn draw_picture(&mut self, ctx: &mut FilterContext, picture: &Picture) -> FxResult<()> {
        for op in &picture.ops {
            self.save();
            self.state.alpha *= op.alpha;
            let drawn = self.draw_image(ctx, &op.image, op.matrix);
            self.restore();
            drawn?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(ctx: &mut FilterContext, w: u32, h: u32, px: [u8; 4]) -> Image {
        let frame = FrameRGBA {
            width: w,
            height: h,
            data: px.repeat((w * h) as usize),
            premultiplied: true,
        };
        Image::upload(ctx, &frame).unwrap()
    }

    #[test]
    fn draw_image_honors_matrix_and_clip() {
        let mut ctx = FilterContext::soft();
        let target = ctx.acquire_texture(8, 8, 1).unwrap();
        let img = solid(&mut ctx, 2, 2, [255, 0, 0, 255]);
        let mut canvas = Canvas::new(target, 8, 8);
        canvas.clip_rect(Rect::new(0.0, 0.0, 5.0, 8.0));
        canvas.draw_image(&mut ctx, &img, Affine::translate((4.0, 4.0))).unwrap();

        let out = ctx.read_texture(target).unwrap();
        assert_eq!(out.pixel(4, 4), [255, 0, 0, 255]);
        assert_eq!(out.pixel(5, 4), [0, 0, 0, 0]);
        assert_eq!(out.pixel(3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn alpha_scales_drawn_pixels() {
        let mut ctx = FilterContext::soft();
        let target = ctx.acquire_texture(2, 2, 1).unwrap();
        let img = solid(&mut ctx, 2, 2, [255, 255, 255, 255]);
        let mut canvas = Canvas::new(target, 2, 2);
        canvas.set_alpha(0.5);
        canvas.draw_image(&mut ctx, &img, Affine::IDENTITY).unwrap();
        let out = ctx.read_texture(target).unwrap();
        assert_eq!(out.pixel(0, 0), [128, 128, 128, 128]);
    }

    #[test]
    fn recorder_captures_draws_with_matrix() {
        let img = Image {
            texture: TextureId(7),
            width: 4,
            height: 2,
        };
        let mut ctx = FilterContext::soft();
        let mut recorder = PictureRecorder::new();
        let canvas = recorder.begin_recording();
        canvas.concat(Affine::scale(2.0));
        canvas.draw_image(&mut ctx, &img, Affine::translate((1.0, 0.0))).unwrap();
        let picture = recorder.finish_recording_as_picture().unwrap();
        assert_eq!(picture.ops().len(), 1);
        assert_eq!(picture.bounds(), Rect::new(2.0, 0.0, 10.0, 4.0));
        assert!(recorder.finish_recording_as_picture().is_none());
    }

    #[test]
    fn save_restore_round_trips_state() {
        let mut canvas = Canvas::new(TextureId(1), 10, 10);
        canvas.save();
        canvas.concat(Affine::translate((3.0, 0.0)));
        canvas.clip_rect(Rect::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(canvas.device_clip(), Some(Rect::new(3.0, 0.0, 5.0, 2.0)));
        assert_eq!(canvas.local_clip_bounds(), Some(Rect::new(0.0, 0.0, 2.0, 2.0)));
        canvas.restore();
        assert_eq!(canvas.matrix(), Affine::IDENTITY);
        assert_eq!(canvas.device_clip(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn make_with_filter_returns_offset_of_grown_bounds() {
        use crate::{
            foundation::core::Frame,
            model::{
                effect::{Effect, EffectKind, FastBlurEffect},
                property::Property,
            },
        };
        let mut ctx = FilterContext::soft();
        let img = solid(&mut ctx, 4, 4, [255, 255, 255, 255]);
        let effect = Effect::new(EffectKind::FastBlur(FastBlurEffect {
            blurriness: Property::Constant(2.0),
            ..FastBlurEffect::default()
        }));
        let filter = LayerFilter::from_effect(&effect, Frame(0), Vec2::new(1.0, 1.0)).unwrap();
        let expected = round_out(filter.filter_bounds(img.bounds()));
        let (out, offset) = img.make_with_filter(&mut ctx, &filter, None).unwrap().unwrap();
        assert_eq!(offset, expected.origin().to_vec2());
        assert_eq!(out.width as f64, expected.width());
        assert!(
            img.make_with_filter(&mut ctx, &filter, Some(Rect::new(50.0, 50.0, 60.0, 60.0)))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn apply_filter_lands_at_offset_inside_the_clip() {
        use crate::{
            foundation::core::{Color, Frame},
            model::{
                property::Property,
                style::{LayerStyle, StrokeStyle, StyleKind},
            },
        };
        let mut ctx = FilterContext::soft();
        let img = solid(&mut ctx, 8, 8, [255, 0, 0, 255]);
        let stroke = LayerStyle::new(StyleKind::Stroke(StrokeStyle {
            color: Property::Constant(Color::new(0, 255, 0)),
            ..StrokeStyle::default()
        }));
        let filter = LayerFilter::from_styles(&[stroke], Frame(0), Vec2::new(1.0, 1.0)).unwrap();

        // image at device 10..18, stroke grows it to 7..21, clip stops at 14
        let target = ctx.acquire_texture(32, 32, 1).unwrap();
        let mut canvas = Canvas::new(target, 32, 32);
        canvas.concat(Affine::translate((10.0, 10.0)));
        canvas.clip_rect(Rect::new(-5.0, -5.0, 4.0, 20.0));
        filter.apply_filter(&mut ctx, &mut canvas, &img).unwrap();

        let out = ctx.read_texture(target).unwrap();
        assert_eq!(out.pixel(8, 12), [0, 255, 0, 255]);
        assert_eq!(out.pixel(12, 12), [255, 0, 0, 255]);
        assert_eq!(out.pixel(13, 12), [255, 0, 0, 255]);
        assert_eq!(out.pixel(6, 12), [0, 0, 0, 0]);
        assert_eq!(out.pixel(15, 12), [0, 0, 0, 0]);
        assert_eq!(out.pixel(19, 12), [0, 0, 0, 0]);

        let strokes = ctx.gpu_stats().draws_of("layerfx_stroke");
        let other = ctx.acquire_texture(32, 32, 1).unwrap();
        let mut canvas = Canvas::new(other, 32, 32);
        canvas.concat(Affine::translate((10.0, 10.0)));
        canvas.clip_rect(Rect::new(14.0, 14.0, 20.0, 20.0));
        filter.apply_filter(&mut ctx, &mut canvas, &img).unwrap();
        assert_eq!(ctx.gpu_stats().draws_of("layerfx_stroke"), strokes);
        let out = ctx.read_texture(other).unwrap();
        assert!(out.data.iter().all(|&b| b == 0));
    }
}
