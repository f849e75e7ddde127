//! Layer styles: shadows and glows under the layer, strokes and overlays over it, all drawn into one
//! target together with the layer content.
//!
//! Style sizes are given in layer units. The renderer applies styles before the layer matrix, so
//! every size and distance is multiplied by the style scale (the inverse of the layer matrix axis
//! scales) to keep styles visually constant under zoom.

pub mod drop_shadow;
pub mod gradient_overlay;
pub mod outer_glow;
pub mod stroke;

use crate::{
    context::FilterContext,
    filters::runtime::{FilterPass, PassArgs, PassthroughFilter, RuntimeFilter, draw_pass},
    foundation::{
        core::{Frame, Rect, Vec2},
        error::FxResult,
    },
    gpu::Fragment,
    model::style::{LayerStyle, StyleKind, StylePosition},
};

use self::{
    drop_shadow::DropShadowFilter, gradient_overlay::GradientOverlayFilter,
    outer_glow::OuterGlowFilter, stroke::StrokeFilter,
};

const RINGS: u32 = 4;
const DIRECTIONS: u32 = 8;

/// WGSL helpers shared by the soft-edged styles. Expects `params.region` (input uv rect).
macro_rules! alpha_gather_wgsl {
    () => {
        r#"
fn src_alpha(uv: vec2<f32>) -> f32 {
    if (any(uv < params.region.xy) || any(uv > params.region.zw)) {
        return 0.0;
    }
    return textureSampleLevel(t_src, s_linear, uv, 0.0).a;
}

fn gathered_alpha(uv: vec2<f32>, radius: vec2<f32>) -> f32 {
    var acc = src_alpha(uv);
    var total = 1.0;
    for (var ring = 1u; ring <= 4u; ring = ring + 1u) {
        let r = f32(ring) / 4.0;
        let w = exp(-4.5 * r * r);
        for (var d = 0u; d < 8u; d = d + 1u) {
            let a = 6.2831853 * (f32(d) + 0.5 * f32(ring % 2u)) / 8.0;
            acc = acc + src_alpha(uv + vec2<f32>(cos(a), sin(a)) * radius * r) * w;
            total = total + w;
        }
    }
    return acc / total;
}

fn spread_alpha(a: f32, spread: f32) -> f32 {
    if (spread >= 1.0) {
        return step(1e-4, a);
    }
    return clamp(a / (1.0 - spread), 0.0, 1.0);
}
"#
    };
}
pub(crate) use alpha_gather_wgsl;

/// Source alpha, zero outside `region`.
pub(crate) fn src_alpha(frag: &Fragment<'_>, uv: [f32; 2], region: [f32; 4]) -> f32 {
    if uv[0] < region[0] || uv[0] > region[2] || uv[1] < region[1] || uv[1] > region[3] {
        return 0.0;
    }
    frag.sample(0, uv)[3]
}

/// Gaussian-weighted alpha over an elliptical disc of `radius` (uv units).
pub(crate) fn gathered_alpha(
    frag: &Fragment<'_>,
    uv: [f32; 2],
    radius: [f32; 2],
    region: [f32; 4],
) -> f32 {
    let mut acc = src_alpha(frag, uv, region);
    let mut total = 1.0;
    for ring in 1..=RINGS {
        let r = ring as f32 / RINGS as f32;
        let w = (-4.5 * r * r).exp();
        for d in 0..DIRECTIONS {
            let a = std::f32::consts::TAU * (d as f32 + 0.5 * (ring % 2) as f32) / DIRECTIONS as f32;
            let p = [uv[0] + a.cos() * radius[0] * r, uv[1] + a.sin() * radius[1] * r];
            acc += src_alpha(frag, p, region) * w;
            total += w;
        }
    }
    acc / total
}

/// Chokes a soft alpha: `spread == 1` is a hard edge.
pub(crate) fn spread_alpha(a: f32, spread: f32) -> f32 {
    if spread >= 1.0 {
        if a >= 1e-4 { 1.0 } else { 0.0 }
    } else {
        (a / (1.0 - spread)).clamp(0.0, 1.0)
    }
}

/// All visible styles of a layer for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerStylesFilter {
    pub below: Vec<RuntimeFilter>,
    pub above: Vec<RuntimeFilter>,
}

impl LayerStylesFilter {
    /// `None` when no style is visible at `frame`.
    pub fn from_styles(styles: &[LayerStyle], frame: Frame, style_scale: Vec2) -> Option<Self> {
        let mut below = Vec::new();
        let mut above = Vec::new();
        for style in styles.iter().filter(|s| s.visible_at(frame)) {
            let filter = match &style.kind {
                StyleKind::DropShadow(s) => {
                    RuntimeFilter::DropShadow(DropShadowFilter::from_style(s, frame, style_scale))
                }
                StyleKind::OuterGlow(s) => {
                    RuntimeFilter::OuterGlow(OuterGlowFilter::from_style(s, frame, style_scale))
                }
                StyleKind::Stroke(s) => {
                    RuntimeFilter::Stroke(StrokeFilter::from_style(s, frame, style_scale))
                }
                StyleKind::GradientOverlay(s) => {
                    RuntimeFilter::GradientOverlay(GradientOverlayFilter::from_style(s, frame))
                }
            };
            match style.position() {
                StylePosition::Below => below.push(filter),
                StylePosition::Above => above.push(filter),
            }
        }
        if below.is_empty() && above.is_empty() {
            return None;
        }
        Some(Self { below, above })
    }

    pub fn filter_bounds(&self, src: Rect) -> Rect {
        self.below
            .iter()
            .chain(&self.above)
            .fold(src, |acc, f| acc.union(f.filter_bounds(src)))
    }

    pub fn is_identity(&self) -> bool {
        self.below.iter().chain(&self.above).all(FilterPass::is_identity)
    }

    /// Below styles, then the layer content, then above styles, into `args.target`. Only the first
    /// draw honors the target's clear flag.
    pub fn draw(&self, ctx: &mut FilterContext, args: &PassArgs<'_>) -> FxResult<()> {
        let content = RuntimeFilter::Passthrough(PassthroughFilter::default());
        let passes = self
            .below
            .iter()
            .filter(|f| !f.is_identity())
            .chain(std::iter::once(&content))
            .chain(self.above.iter().filter(|f| !f.is_identity()));
        let mut target = *args.target;
        for pass in passes {
            draw_pass(
                ctx,
                pass,
                &PassArgs {
                    target: &target,
                    ..*args
                },
            )?;
            target.clear = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        property::Property,
        style::{DropShadowStyle, StrokeStyle},
    };

    #[test]
    fn styles_split_by_position() {
        let styles = vec![
            LayerStyle::new(StyleKind::Stroke(StrokeStyle::default())),
            LayerStyle::new(StyleKind::DropShadow(DropShadowStyle::default())),
        ];
        let f = LayerStylesFilter::from_styles(&styles, Frame(0), Vec2::new(1.0, 1.0)).unwrap();
        assert_eq!(f.below.len(), 1);
        assert_eq!(f.above.len(), 1);
        assert!(matches!(f.below[0], RuntimeFilter::DropShadow(_)));
    }

    #[test]
    fn hidden_styles_build_nothing() {
        let shadow = DropShadowStyle {
            opacity: Property::Constant(0.0),
            ..DropShadowStyle::default()
        };
        let styles = vec![LayerStyle::new(StyleKind::DropShadow(shadow))];
        assert!(LayerStylesFilter::from_styles(&styles, Frame(0), Vec2::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn bounds_union_every_style() {
        let styles = vec![
            LayerStyle::new(StyleKind::Stroke(StrokeStyle::default())),
            LayerStyle::new(StyleKind::DropShadow(DropShadowStyle::default())),
        ];
        let f = LayerStylesFilter::from_styles(&styles, Frame(0), Vec2::new(1.0, 1.0)).unwrap();
        let src = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = f.filter_bounds(src);
        for part in f.below.iter().chain(&f.above) {
            assert_eq!(b.union(part.filter_bounds(src)), b);
        }
        assert_eq!(b.union(src), b);
    }

    #[test]
    fn spread_chokes_alpha() {
        assert_eq!(spread_alpha(0.25, 0.5), 0.5);
        assert_eq!(spread_alpha(0.01, 1.0), 1.0);
        assert_eq!(spread_alpha(0.0, 1.0), 0.0);
    }
}
