use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{add4, mix4, sample_or_clear, scale4},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Frame, Point},
    gpu::Fragment,
    model::effect::{RadialBlurAntialias, RadialBlurEffect, RadialBlurMode},
};

const RADIAL_BLUR_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // center uv, amount, mode (0 spin, 1 zoom)
    blur: vec4<f32>,
    // source size, taps, opacity
    extra: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn tap(uv: vec2<f32>) -> vec4<f32> {
    if (any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0))) {
        return vec4<f32>(0.0);
    }
    return textureSampleLevel(t_src, s_linear, uv, 0.0);
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let src = tap(in.uv);
    let center = params.blur.xy;
    let size = params.extra.xy;
    let taps = u32(params.extra.z);
    let p = (in.uv - center) * size;
    var acc = vec4<f32>(0.0);
    for (var i = 0u; i < taps; i = i + 1u) {
        let t = f32(i) / f32(taps - 1u);
        var q = p;
        if (params.blur.w < 0.5) {
            let angle = (t - 0.5) * radians(params.blur.z);
            let c = cos(angle);
            let s = sin(angle);
            q = vec2<f32>(p.x * c - p.y * s, p.x * s + p.y * c);
        } else {
            q = p * (1.0 - t * params.blur.z / 100.0);
        }
        acc = acc + tap(center + q / size);
    }
    return mix(src, acc / f32(taps), params.extra.w);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_radial_blur",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: RADIAL_BLUR_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: radial_blur_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct RadialBlurParams {
    blur: [f32; 4],
    extra: [f32; 4],
}
assert_block_size!(RadialBlurParams);

fn radial_blur_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: RadialBlurParams = frag.uniform(0);
    let src = sample_or_clear(frag, 0, frag.uv);
    let center = [p.blur[0], p.blur[1]];
    let size = [p.extra[0].max(1.0), p.extra[1].max(1.0)];
    let taps = (p.extra[2] as u32).max(2);
    let d = [(frag.uv[0] - center[0]) * size[0], (frag.uv[1] - center[1]) * size[1]];
    let mut acc = [0.0; 4];
    for i in 0..taps {
        let t = i as f32 / (taps - 1) as f32;
        let q = if p.blur[3] < 0.5 {
            let angle = (t - 0.5) * p.blur[2].to_radians();
            let (s, c) = angle.sin_cos();
            [d[0] * c - d[1] * s, d[0] * s + d[1] * c]
        } else {
            let k = 1.0 - t * p.blur[2] / 100.0;
            [d[0] * k, d[1] * k]
        };
        let uv = [center[0] + q[0] / size[0], center[1] + q[1] / size[1]];
        acc = add4(acc, sample_or_clear(frag, 0, uv));
    }
    mix4(src, scale4(acc, 1.0 / taps as f32), p.extra[3])
}

/// Spin or zoom blur around a center point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadialBlurFilter {
    /// Degrees for spin, percent for zoom.
    pub amount: f32,
    /// Content space.
    pub center: Point,
    pub mode: RadialBlurMode,
    pub antialias: RadialBlurAntialias,
    pub opacity: f32,
}

impl RadialBlurFilter {
    pub fn from_effect(effect: &RadialBlurEffect, frame: Frame, opacity: f32) -> Self {
        Self {
            amount: effect.amount.value_at(frame).clamp(0.0, 100.0),
            center: effect.center.value_at(frame),
            mode: effect.mode.value_at(frame),
            antialias: effect.antialias.value_at(frame),
            opacity,
        }
    }

    pub fn taps(&self) -> u32 {
        match self.antialias {
            RadialBlurAntialias::Low => 12,
            RadialBlurAntialias::High => 32,
        }
    }
}

impl FilterPass for RadialBlurFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::RadialBlur
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || self.amount <= 0.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let center = args.source_uv(self.center);
        let [w, h] = args.source_size();
        block_bytes(&RadialBlurParams {
            blur: [
                center[0],
                center[1],
                self.amount,
                match self.mode {
                    RadialBlurMode::Spin => 0.0,
                    RadialBlurMode::Zoom => 1.0,
                },
            ],
            extra: [w, h, self.taps() as f32, self.opacity],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{foundation::core::Rect, model::property::Property};

    #[test]
    fn antialias_picks_tap_count() {
        let mut effect = RadialBlurEffect::default();
        let low = RadialBlurFilter::from_effect(&effect, Frame(0), 1.0);
        effect.antialias = Property::Constant(RadialBlurAntialias::High);
        let high = RadialBlurFilter::from_effect(&effect, Frame(0), 1.0);
        assert!(high.taps() > low.taps());
    }

    #[test]
    fn bounds_unchanged_and_zero_amount_is_identity() {
        let effect = RadialBlurEffect {
            amount: Property::Constant(0.0),
            ..RadialBlurEffect::default()
        };
        let f = RadialBlurFilter::from_effect(&effect, Frame(0), 1.0);
        assert!(f.is_identity());
        let r = Rect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(f.filter_bounds(r), r);
    }
}
