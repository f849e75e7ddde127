//! Separable gaussian blur: one directional program drawn once per blurred axis.

use crate::{
    context::FilterContext,
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, FilterSource, FilterTarget, PassArgs, draw_pass},
        shading::{add4, scale4},
        uniforms::{Std140Writer, UniformBinding},
    },
    foundation::{
        core::{Frame, Point, Rect, Vec2},
        error::FxResult,
        math::round_out,
    },
    gpu::Fragment,
    model::effect::{BlurDimensions, FastBlurEffect},
};

/// Taps on each side of the center. Wider kernels stretch the tap spacing.
pub const MAX_TAPS: usize = 32;
const WEIGHT_VECS: usize = (MAX_TAPS + 1).div_ceil(4);

/// Upper bound on blurriness, in content units.
pub const MAX_BLURRINESS: f32 = 500.0;

const BLUR_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // uv step per tap, tap count
    step: vec4<f32>,
    // uv rect holding the input
    region: vec4<f32>,
    // repeat edge pixels
    flags: vec4<f32>,
    weights: array<vec4<f32>, 9>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn weight(i: u32) -> f32 {
    return params.weights[i / 4u][i % 4u];
}

fn tap(uv: vec2<f32>) -> vec4<f32> {
    if (params.flags.x > 0.5) {
        let half_texel = 0.5 / vec2<f32>(textureDimensions(t_src));
        let clamped = clamp(uv, params.region.xy + half_texel, params.region.zw - half_texel);
        return textureSampleLevel(t_src, s_linear, clamped, 0.0);
    }
    if (any(uv < params.region.xy) || any(uv > params.region.zw)) {
        return vec4<f32>(0.0);
    }
    return textureSampleLevel(t_src, s_linear, uv, 0.0);
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let step = params.step.xy;
    let taps = u32(params.step.z);
    var color = tap(in.uv) * weight(0u);
    for (var i = 1u; i <= taps; i = i + 1u) {
        let d = step * f32(i);
        color = color + (tap(in.uv + d) + tap(in.uv - d)) * weight(i);
    }
    return color;
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_blur_pass",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: BLUR_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: blur_kernel,
};

/// Normalized one-sided gaussian weights for offsets `0..=taps`.
pub fn gaussian_weights(taps: usize, sigma: f32) -> Vec<f32> {
    if taps == 0 || !sigma.is_finite() || sigma <= 0.0 {
        return vec![1.0];
    }
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let raw: Vec<f64> = (0..=taps)
        .map(|i| {
            let x = i as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum = raw[0] + 2.0 * raw[1..].iter().sum::<f64>();
    raw.iter().map(|w| (w / sum) as f32).collect()
}

fn read_params(frag: &Fragment<'_>) -> ([f32; 4], [f32; 4], [f32; 4], [f32; 4 * WEIGHT_VECS]) {
    let bytes = frag.uniform_bytes(0);
    let mut floats = [0.0f32; 12 + 4 * WEIGHT_VECS];
    for (dst, chunk) in floats.iter_mut().zip(bytes.chunks_exact(4)) {
        *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let vec = |i: usize| [floats[i], floats[i + 1], floats[i + 2], floats[i + 3]];
    let mut weights = [0.0; 4 * WEIGHT_VECS];
    weights.copy_from_slice(&floats[12..]);
    (vec(0), vec(4), vec(8), weights)
}

fn blur_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let (step, region, flags, weights) = read_params(frag);
    let size = frag.texture_size(0);
    let tap = |uv: [f32; 2]| -> [f32; 4] {
        if flags[0] > 0.5 {
            let hx = 0.5 / size[0].max(1.0);
            let hy = 0.5 / size[1].max(1.0);
            let u = uv[0].clamp(region[0] + hx, (region[2] - hx).max(region[0] + hx));
            let v = uv[1].clamp(region[1] + hy, (region[3] - hy).max(region[1] + hy));
            return frag.sample(0, [u, v]);
        }
        if uv[0] < region[0] || uv[0] > region[2] || uv[1] < region[1] || uv[1] > region[3] {
            return [0.0; 4];
        }
        frag.sample(0, uv)
    };
    let taps = (step[2] as usize).min(MAX_TAPS);
    let mut color = scale4(tap(frag.uv), weights[0]);
    for i in 1..=taps {
        let d = [step[0] * i as f32, step[1] * i as f32];
        let pair = add4(
            tap([frag.uv[0] + d[0], frag.uv[1] + d[1]]),
            tap([frag.uv[0] - d[0], frag.uv[1] - d[1]]),
        );
        color = add4(color, scale4(pair, weights[i]));
    }
    color
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

/// One directional gaussian pass. `radius` is in content units; sigma is a third of it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurPassFilter {
    pub direction: BlurDirection,
    pub radius: f32,
    pub repeat_edge_pixels: bool,
}

impl BlurPassFilter {
    /// Tap count and spacing in source pixels for a scale of `scale` pixels per unit.
    fn taps(&self, scale: f64) -> (usize, f32) {
        let radius_px = (f64::from(self.radius) * scale).max(0.0) as f32;
        let taps = (radius_px.ceil() as usize).min(MAX_TAPS);
        if taps == 0 {
            return (0, 0.0);
        }
        (taps, radius_px / taps as f32)
    }
}

impl FilterPass for BlurPassFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::BlurPass
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        if self.repeat_edge_pixels {
            return src;
        }
        let r = f64::from(self.radius.max(0.0));
        match self.direction {
            BlurDirection::Horizontal => src.inflate(r, 0.0),
            BlurDirection::Vertical => src.inflate(0.0, r),
        }
    }

    fn is_identity(&self) -> bool {
        self.radius <= 0.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let scale = args.scale();
        let [w, h] = args.source_size();
        let (axis_scale, axis) = match self.direction {
            BlurDirection::Horizontal => (scale.x, [1.0 / w.max(1.0), 0.0]),
            BlurDirection::Vertical => (scale.y, [0.0, 1.0 / h.max(1.0)]),
        };
        let (taps, spacing) = self.taps(axis_scale);
        let weights = gaussian_weights(taps, taps as f32 / 3.0);
        let packed: Vec<[f32; 4]> = weights
            .chunks(4)
            .map(|c| {
                let mut v = [0.0; 4];
                v[..c.len()].copy_from_slice(c);
                v
            })
            .collect();

        let bounds = args.input_bounds;
        let origin = args.source_uv(Point::new(bounds.x0, bounds.y0));
        let end = args.source_uv(Point::new(bounds.x1, bounds.y1));
        let mut w = Std140Writer::new();
        w.vec4([axis[0] * spacing, axis[1] * spacing, taps as f32, 0.0])
            .vec4([origin[0], origin[1], end[0], end[1]])
            .vec4([if self.repeat_edge_pixels { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0])
            .vec4_array::<WEIGHT_VECS>(&packed);
        w.finish()
    }
}

/// Fast blur: horizontal then vertical [`BlurPassFilter`] over the blurred dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianBlurFilter {
    pub blurriness: f32,
    pub dimensions: BlurDimensions,
    pub repeat_edge_pixels: bool,
    /// Multiplies the blurriness per axis.
    pub effect_scale: Vec2,
}

impl GaussianBlurFilter {
    pub fn from_effect(effect: &FastBlurEffect, frame: Frame, effect_scale: Vec2) -> Self {
        Self {
            blurriness: effect
                .blurriness
                .value_at(frame)
                .clamp(0.0, MAX_BLURRINESS),
            dimensions: effect.dimensions.value_at(frame),
            repeat_edge_pixels: effect.repeat_edge_pixels.value_at(frame),
            effect_scale,
        }
    }

    pub fn passes(&self) -> Vec<BlurPassFilter> {
        let mut passes = Vec::with_capacity(2);
        if matches!(self.dimensions, BlurDimensions::All | BlurDimensions::Horizontal) {
            passes.push(BlurPassFilter {
                direction: BlurDirection::Horizontal,
                radius: self.blurriness * self.effect_scale.x as f32,
                repeat_edge_pixels: self.repeat_edge_pixels,
            });
        }
        if matches!(self.dimensions, BlurDimensions::All | BlurDimensions::Vertical) {
            passes.push(BlurPassFilter {
                direction: BlurDirection::Vertical,
                radius: self.blurriness * self.effect_scale.y as f32,
                repeat_edge_pixels: self.repeat_edge_pixels,
            });
        }
        passes.retain(|p| !p.is_identity());
        passes
    }

    pub fn filter_bounds(&self, src: Rect) -> Rect {
        self.passes()
            .iter()
            .fold(src, |r, p| round_out(p.filter_bounds(r)))
    }

    pub fn is_identity(&self) -> bool {
        self.passes().is_empty()
    }

    /// Draw every pass, routing all but the last through a pooled intermediate texture.
    pub fn draw(&self, ctx: &mut FilterContext, args: &PassArgs<'_>) -> FxResult<()> {
        let passes = self.passes();
        let Some((last, leading)) = passes.split_last() else {
            return Ok(());
        };
        let scale = args.scale();
        let mut source = *args.source;
        let mut bounds = args.input_bounds;
        let mut held = Vec::with_capacity(leading.len());
        let result = (|| {
            for pass in leading {
                let out = round_out(pass.filter_bounds(bounds));
                let width = (out.width() * scale.x).ceil().max(1.0) as u32;
                let height = (out.height() * scale.y).ceil().max(1.0) as u32;
                let texture = ctx.acquire_texture(width, height, 1)?;
                held.push(texture);
                let target = FilterTarget::offscreen(texture, width, height);
                draw_pass(
                    ctx,
                    pass,
                    &PassArgs {
                        source: &source,
                        target: &target,
                        input_bounds: bounds,
                        output_bounds: out,
                        offset: offset_between(bounds, out, scale),
                    },
                )?;
                source = FilterSource {
                    texture,
                    width,
                    height,
                    scale,
                };
                bounds = out;
            }
            draw_pass(
                ctx,
                last,
                &PassArgs {
                    source: &source,
                    target: args.target,
                    input_bounds: bounds,
                    output_bounds: args.output_bounds,
                    offset: offset_between(bounds, args.output_bounds, scale),
                },
            )
        })();
        for texture in held {
            ctx.recycle_texture(texture);
        }
        result
    }
}

/// Offset from `output` to `input` origins in pixels.
pub fn offset_between(input: Rect, output: Rect, scale: Vec2) -> Vec2 {
    Vec2::new(
        (input.x0 - output.x0) * scale.x,
        (input.y0 - output.y0) * scale.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::Property;

    fn blur(blurriness: f32, dimensions: BlurDimensions, repeat: bool) -> GaussianBlurFilter {
        let effect = FastBlurEffect {
            blurriness: Property::Constant(blurriness),
            dimensions: Property::Constant(dimensions),
            repeat_edge_pixels: Property::Constant(repeat),
        };
        GaussianBlurFilter::from_effect(&effect, Frame(0), Vec2::new(1.0, 1.0))
    }

    #[test]
    fn weights_are_normalized_and_decreasing() {
        let w = gaussian_weights(8, 8.0 / 3.0);
        assert_eq!(w.len(), 9);
        let total = w[0] + 2.0 * w[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(w.windows(2).all(|p| p[0] >= p[1]));
        assert_eq!(gaussian_weights(0, 1.0), vec![1.0]);
    }

    #[test]
    fn bounds_grow_only_in_blurred_dimensions() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(
            blur(4.0, BlurDimensions::All, false).filter_bounds(r),
            Rect::new(-4.0, -4.0, 14.0, 14.0)
        );
        assert_eq!(
            blur(4.0, BlurDimensions::Horizontal, false).filter_bounds(r),
            Rect::new(-4.0, 0.0, 14.0, 10.0)
        );
        assert_eq!(blur(4.0, BlurDimensions::Vertical, true).filter_bounds(r), r);
    }

    #[test]
    fn grown_bounds_contain_the_input() {
        for (x0, y0, w, h) in [(0.0, 0.0, 1.0, 1.0), (-3.5, 2.25, 7.0, 19.0), (100.0, -50.0, 0.5, 3.0)] {
            let r = Rect::new(x0, y0, x0 + w, y0 + h);
            let grown = blur(2.5, BlurDimensions::All, false).filter_bounds(r);
            assert!(grown.contains(Point::new(r.x0, r.y0)) && grown.contains(Point::new(r.x1, r.y1)));
        }
    }

    #[test]
    fn zero_blurriness_has_no_passes() {
        assert!(blur(0.0, BlurDimensions::All, false).is_identity());
        assert_eq!(blur(3.0, BlurDimensions::All, false).passes().len(), 2);
    }

    #[test]
    fn wide_kernels_stretch_tap_spacing() {
        let pass = BlurPassFilter {
            direction: BlurDirection::Horizontal,
            radius: 40.0,
            repeat_edge_pixels: false,
        };
        let (taps, spacing) = pass.taps(2.0);
        assert_eq!(taps, MAX_TAPS);
        assert!((spacing - 2.5).abs() < 1e-6);
        assert_eq!(pass.taps(0.0), (0, 0.0));
    }
}
