//! Maps effect and style models onto the filters that draw them.
//!
//! Filters are rebuilt every frame from the evaluated parameters; nothing here holds animation
//! state.

use crate::{
    context::FilterContext,
    filters::{
        blur::GaussianBlurFilter,
        bulge::BulgeFilter,
        corner_pin::CornerPinFilter,
        displacement_map::DisplacementMapFilter,
        glow::GlowFilter,
        layer_style::LayerStylesFilter,
        levels::LevelsFilter,
        mosaic::MosaicFilter,
        motion_blur::MotionBlurFilter,
        motion_tile::MotionTileFilter,
        radial_blur::RadialBlurFilter,
        runtime::{FilterPass, FilterSource, FilterTarget, PassArgs, RuntimeFilter, draw_pass},
        transform_3d::Transform3DFilter,
    },
    foundation::{
        core::{Affine, Frame, Rect, Vec2},
        error::FxResult,
        math::Matrix3D,
    },
    model::{
        effect::{Effect, EffectKind},
        style::LayerStyle,
    },
    render::canvas::{Canvas, Image},
};

/// One node of a layer's filter chain.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerFilter {
    Runtime(RuntimeFilter),
    GaussianBlur(GaussianBlurFilter),
    LayerStyles(LayerStylesFilter),
}

impl LayerFilter {
    /// The filter for `effect` at `frame`, or `None` when the effect cannot draw (e.g. a
    /// displacement map whose image is missing).
    pub fn from_effect(effect: &Effect, frame: Frame, effect_scale: Vec2) -> Option<Self> {
        let opacity = effect.effect_opacity(frame);
        let runtime = match &effect.kind {
            EffectKind::LevelsIndividual(e) => {
                RuntimeFilter::Levels(LevelsFilter::from_effect(e, frame, opacity))
            }
            EffectKind::Mosaic(e) => {
                RuntimeFilter::Mosaic(MosaicFilter::from_effect(e, frame, opacity))
            }
            EffectKind::FastBlur(e) => {
                return Some(Self::GaussianBlur(GaussianBlurFilter::from_effect(
                    e,
                    frame,
                    effect_scale,
                )));
            }
            EffectKind::Glow(e) => {
                RuntimeFilter::Glow(GlowFilter::from_effect(e, frame, effect_scale, opacity))
            }
            EffectKind::RadialBlur(e) => {
                RuntimeFilter::RadialBlur(RadialBlurFilter::from_effect(e, frame, opacity))
            }
            EffectKind::DisplacementMap(e) => RuntimeFilter::DisplacementMap(
                DisplacementMapFilter::from_effect(e, frame, effect_scale, opacity)?,
            ),
            EffectKind::Bulge(e) => RuntimeFilter::Bulge(BulgeFilter::from_effect(e, frame, opacity)),
            EffectKind::CornerPin(e) => {
                RuntimeFilter::CornerPin(CornerPinFilter::from_effect(e, frame))
            }
            EffectKind::MotionTile(e) => {
                RuntimeFilter::MotionTile(MotionTileFilter::from_effect(e, frame))
            }
        };
        Some(Self::Runtime(runtime))
    }

    /// All visible styles as one node, or `None` when none is visible.
    pub fn from_styles(styles: &[LayerStyle], frame: Frame, style_scale: Vec2) -> Option<Self> {
        LayerStylesFilter::from_styles(styles, frame, style_scale).map(Self::LayerStyles)
    }

    pub fn motion_blur(previous: Affine, current: Affine) -> Self {
        Self::Runtime(RuntimeFilter::MotionBlur(MotionBlurFilter::new(previous, current)))
    }

    pub fn transform_3d(matrix: Matrix3D) -> Self {
        Self::Runtime(RuntimeFilter::Transform3D(Transform3DFilter::new(matrix)))
    }

    pub fn filter_bounds(&self, src: Rect) -> Rect {
        match self {
            Self::Runtime(f) => f.filter_bounds(src),
            Self::GaussianBlur(f) => f.filter_bounds(src),
            Self::LayerStyles(f) => f.filter_bounds(src),
        }
    }

    pub fn max_scale_factor(&self, content: Rect) -> Vec2 {
        match self {
            Self::Runtime(f) => f.max_scale_factor(content),
            Self::GaussianBlur(_) | Self::LayerStyles(_) => Vec2::new(1.0, 1.0),
        }
    }

    pub fn is_identity(&self) -> bool {
        match self {
            Self::Runtime(f) => f.is_identity(),
            Self::GaussianBlur(f) => f.is_identity(),
            Self::LayerStyles(f) => f.is_identity(),
        }
    }

    pub fn needs_msaa(&self) -> bool {
        match self {
            Self::Runtime(f) => f.sample_count() > 1,
            Self::GaussianBlur(_) | Self::LayerStyles(_) => false,
        }
    }

    pub fn is_blur(&self) -> bool {
        matches!(self, Self::GaussianBlur(_))
    }

    /// Draw from `source` (covering `input_bounds`) into `target` (covering `output_bounds`).
    /// `offset` is `(input.origin - output.origin) * scale`.
    pub fn draw(
        &self,
        ctx: &mut FilterContext,
        source: &FilterSource,
        target: &FilterTarget,
        input_bounds: Rect,
        output_bounds: Rect,
        offset: Vec2,
    ) -> FxResult<()> {
        let args = PassArgs {
            source,
            target,
            input_bounds,
            output_bounds,
            offset,
        };
        match self {
            Self::Runtime(RuntimeFilter::DisplacementMap(f)) => {
                let map = ctx.upload_image(&f.map)?;
                let bound = DisplacementMapFilter {
                    map_texture: Some(map),
                    ..f.clone()
                };
                let drawn = draw_pass(ctx, &bound, &args);
                ctx.release_texture(map);
                drawn
            }
            Self::Runtime(f) => draw_pass(ctx, f, &args),
            Self::GaussianBlur(f) => f.draw(ctx, &args),
            Self::LayerStyles(f) => f.draw(ctx, &args),
        }
    }

    /// Filter an already rasterized image and draw the result onto `canvas`.
    pub fn apply_filter(
        &self,
        ctx: &mut FilterContext,
        canvas: &mut Canvas,
        image: &Image,
    ) -> FxResult<()> {
        let clip = canvas.local_clip_bounds();
        let Some((filtered, offset)) = image.make_with_filter(ctx, self, clip)? else {
            return Ok(());
        };
        let drawn = canvas.draw_image(ctx, &filtered, Affine::translate(offset));
        ctx.recycle_texture(filtered.texture);
        drawn
    }
}
