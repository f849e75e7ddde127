use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{add4, clamp01, luminance, mix4, scale4, unpremultiply},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Frame, Point, Rect, Vec2},
    gpu::Fragment,
    model::effect::GlowEffect,
};

const RINGS: u32 = 4;
const DIRECTIONS: u32 = 8;

const GLOW_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // uv radius x, uv radius y, threshold, intensity
    glow: vec4<f32>,
    region: vec4<f32>,
    opacity: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn tap(uv: vec2<f32>) -> vec4<f32> {
    if (any(uv < params.region.xy) || any(uv > params.region.zw)) {
        return vec4<f32>(0.0);
    }
    return textureSampleLevel(t_src, s_linear, uv, 0.0);
}

fn bright(uv: vec2<f32>) -> vec4<f32> {
    let c = tap(uv);
    if (c.a <= 0.0) {
        return vec4<f32>(0.0);
    }
    let lum = dot(c.rgb / c.a, vec3<f32>(0.299, 0.587, 0.114));
    let t = params.glow.z;
    let k = clamp((lum - t) / max(1.0 - t, 1e-4), 0.0, 1.0);
    return c * k;
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let src = tap(in.uv);
    var acc = bright(in.uv);
    var total = 1.0;
    for (var ring = 1u; ring <= 4u; ring = ring + 1u) {
        let r = f32(ring) / 4.0;
        let w = exp(-4.5 * r * r);
        for (var d = 0u; d < 8u; d = d + 1u) {
            let a = 6.2831853 * (f32(d) + 0.5 * f32(ring % 2u)) / 8.0;
            let o = vec2<f32>(cos(a), sin(a)) * params.glow.xy * r;
            acc = acc + bright(in.uv + o) * w;
            total = total + w;
        }
    }
    let glow = acc / total * params.glow.w;
    let a = min(src.a + glow.a, 1.0);
    let glowing = vec4<f32>(min(src.rgb + glow.rgb, vec3<f32>(a)), a);
    return mix(src, glowing, params.opacity.x);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_glow",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: GLOW_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: glow_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GlowParams {
    glow: [f32; 4],
    region: [f32; 4],
    opacity: [f32; 4],
}
assert_block_size!(GlowParams);

/// Source color, transparent outside the input region.
fn tap(frag: &Fragment<'_>, p: &GlowParams, uv: [f32; 2]) -> [f32; 4] {
    let r = p.region;
    if uv[0] < r[0] || uv[0] > r[2] || uv[1] < r[1] || uv[1] > r[3] {
        return [0.0; 4];
    }
    frag.sample(0, uv)
}

fn bright(frag: &Fragment<'_>, p: &GlowParams, uv: [f32; 2]) -> [f32; 4] {
    let c = tap(frag, p, uv);
    if c[3] <= 0.0 {
        return [0.0; 4];
    }
    let s = unpremultiply(c);
    let t = p.glow[2];
    let k = clamp01((luminance([s[0], s[1], s[2]]) - t) / (1.0 - t).max(1e-4));
    scale4(c, k)
}

fn glow_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: GlowParams = frag.uniform(0);
    let src = tap(frag, &p, frag.uv);
    let mut acc = bright(frag, &p, frag.uv);
    let mut total = 1.0;
    for ring in 1..=RINGS {
        let r = ring as f32 / RINGS as f32;
        let w = (-4.5 * r * r).exp();
        for d in 0..DIRECTIONS {
            let a = std::f32::consts::TAU * (d as f32 + 0.5 * (ring % 2) as f32) / DIRECTIONS as f32;
            let o = [a.cos() * p.glow[0] * r, a.sin() * p.glow[1] * r];
            acc = add4(acc, scale4(bright(frag, &p, [frag.uv[0] + o[0], frag.uv[1] + o[1]]), w));
            total += w;
        }
    }
    let glow = scale4(acc, p.glow[3] / total);
    let a = (src[3] + glow[3]).min(1.0);
    let out = [
        (src[0] + glow[0]).min(a),
        (src[1] + glow[1]).min(a),
        (src[2] + glow[2]).min(a),
        a,
    ];
    mix4(src, out, p.opacity[0])
}

/// Adds a soft halo gathered from pixels brighter than the threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowFilter {
    /// `0..=1`.
    pub threshold: f32,
    /// Content units.
    pub radius: f32,
    pub intensity: f32,
    pub opacity: f32,
}

impl GlowFilter {
    pub fn from_effect(effect: &GlowEffect, frame: Frame, effect_scale: Vec2, opacity: f32) -> Self {
        let scale = effect_scale.x.max(effect_scale.y) as f32;
        Self {
            threshold: (effect.threshold.value_at(frame) / 100.0).clamp(0.0, 1.0),
            radius: effect.radius.value_at(frame).max(0.0) * scale,
            intensity: effect.intensity.value_at(frame).max(0.0),
            opacity,
        }
    }
}

impl FilterPass for GlowFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Glow
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        let r = f64::from(self.radius);
        src.inflate(r, r)
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || self.radius <= 0.0 || self.intensity <= 0.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let per_unit = args.uv_per_unit();
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        block_bytes(&GlowParams {
            glow: [
                self.radius * per_unit[0],
                self.radius * per_unit[1],
                self.threshold,
                self.intensity,
            ],
            region: [origin[0], origin[1], end[0], end[1]],
            opacity: [self.opacity, 0.0, 0.0, 0.0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::Property;

    #[test]
    fn threshold_is_a_fraction_and_radius_scales() {
        let effect = GlowEffect {
            threshold: Property::Constant(50.0),
            radius: Property::Constant(6.0),
            intensity: Property::Constant(2.0),
        };
        let f = GlowFilter::from_effect(&effect, Frame(0), Vec2::new(0.5, 0.5), 1.0);
        assert_eq!(f.threshold, 0.5);
        assert_eq!(f.radius, 3.0);
        assert_eq!(
            f.filter_bounds(Rect::new(0.0, 0.0, 10.0, 10.0)),
            Rect::new(-3.0, -3.0, 13.0, 13.0)
        );
    }

    #[test]
    fn no_radius_is_identity() {
        let effect = GlowEffect {
            radius: Property::Constant(0.0),
            ..GlowEffect::default()
        };
        assert!(GlowFilter::from_effect(&effect, Frame(0), Vec2::new(1.0, 1.0), 1.0).is_identity());
    }

    #[test]
    fn grown_bounds_contain_the_input() {
        for radius in [0.5_f32, 4.0, 40.0] {
            let f = GlowFilter {
                threshold: 0.2,
                radius,
                intensity: 1.0,
                opacity: 1.0,
            };
            for r in [
                Rect::new(0.0, 0.0, 1.0, 1.0),
                Rect::new(-20.0, 5.0, 30.0, 7.5),
                Rect::new(100.0, 100.0, 400.0, 250.0),
            ] {
                let grown = f.filter_bounds(r);
                assert_eq!(grown.union(r), grown, "radius {radius} rect {r:?}");
            }
        }
    }
}
