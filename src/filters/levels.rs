use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{clamp01, mix4, premultiply, unpremultiply},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::Frame,
    gpu::Fragment,
    model::effect::{LevelsChannel, LevelsEffect},
};

const LEVELS_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

// Lanes are r, g, b, master.
struct Params {
    input_black: vec4<f32>,
    input_white: vec4<f32>,
    gamma: vec4<f32>,
    output_black: vec4<f32>,
    output_white: vec4<f32>,
    opacity: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn level(c: f32, lane: u32) -> f32 {
    let in_black = params.input_black[lane];
    let in_white = params.input_white[lane];
    let x = (c * 255.0 - in_black) / max(in_white - in_black, 1e-4);
    let y = 1.0 / max(params.gamma[lane], 1e-4);
    var p = 0.0;
    if (x > 0.0) {
        p = clamp(pow(x, y), 0.0, 1.0);
    }
    let out_black = params.output_black[lane];
    return (p * (params.output_white[lane] - out_black) + out_black) / 255.0;
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let src = textureSampleLevel(t_src, s_linear, in.uv, 0.0);
    if (src.a <= 0.0) {
        return src;
    }
    let c = src.rgb / src.a;
    let r = level(level(c.r, 0u), 3u);
    let g = level(level(c.g, 1u), 3u);
    let b = level(level(c.b, 2u), 3u);
    let leveled = vec4<f32>(vec3<f32>(r, g, b) * src.a, src.a);
    return mix(src, leveled, params.opacity.x);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_levels",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: LEVELS_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: levels_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct LevelsParams {
    input_black: [f32; 4],
    input_white: [f32; 4],
    gamma: [f32; 4],
    output_black: [f32; 4],
    output_white: [f32; 4],
    opacity: [f32; 4],
}
assert_block_size!(LevelsParams);

fn level(c: f32, p: &LevelsParams, lane: usize) -> f32 {
    let range = (p.input_white[lane] - p.input_black[lane]).max(1e-4);
    let x = (c * 255.0 - p.input_black[lane]) / range;
    let y = 1.0 / p.gamma[lane].max(1e-4);
    let v = if x > 0.0 { clamp01(x.powf(y)) } else { 0.0 };
    (v * (p.output_white[lane] - p.output_black[lane]) + p.output_black[lane]) / 255.0
}

fn levels_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: LevelsParams = frag.uniform(0);
    let src = frag.sample(0, frag.uv);
    if src[3] <= 0.0 {
        return src;
    }
    let c = unpremultiply(src);
    let mut out = [0.0, 0.0, 0.0, c[3]];
    for lane in 0..3 {
        out[lane] = level(level(c[lane], &p, lane), &p, 3);
    }
    mix4(src, premultiply(out), p.opacity[0])
}

/// One channel's levels on the `0..=255` scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelLevels {
    pub input_black: f32,
    pub input_white: f32,
    pub gamma: f32,
    pub output_black: f32,
    pub output_white: f32,
}

impl Default for ChannelLevels {
    fn default() -> Self {
        Self {
            input_black: 0.0,
            input_white: 255.0,
            gamma: 1.0,
            output_black: 0.0,
            output_white: 255.0,
        }
    }
}

impl ChannelLevels {
    fn at(channel: &LevelsChannel, frame: Frame) -> Self {
        Self {
            input_black: channel.input_black.value_at_or(frame, 0.0),
            input_white: channel.input_white.value_at_or(frame, 255.0),
            gamma: channel.gamma.value_at_or(frame, 1.0),
            output_black: channel.output_black.value_at_or(frame, 0.0),
            output_white: channel.output_white.value_at_or(frame, 255.0),
        }
    }
}

/// Per-channel then master input/output levels with gamma.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelsFilter {
    pub red: ChannelLevels,
    pub green: ChannelLevels,
    pub blue: ChannelLevels,
    pub master: ChannelLevels,
    pub opacity: f32,
}

impl LevelsFilter {
    pub fn from_effect(effect: &LevelsEffect, frame: Frame, opacity: f32) -> Self {
        Self {
            red: ChannelLevels::at(&effect.red, frame),
            green: ChannelLevels::at(&effect.green, frame),
            blue: ChannelLevels::at(&effect.blue, frame),
            master: ChannelLevels::at(&effect.master, frame),
            opacity,
        }
    }

    fn lanes(&self) -> [ChannelLevels; 4] {
        [self.red, self.green, self.blue, self.master]
    }
}

impl FilterPass for LevelsFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Levels
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || self.lanes().iter().all(|c| *c == ChannelLevels::default())
    }

    fn uniforms(&self, _args: &PassArgs<'_>) -> Vec<u8> {
        let lanes = self.lanes();
        let pick = |f: fn(&ChannelLevels) -> f32| [f(&lanes[0]), f(&lanes[1]), f(&lanes[2]), f(&lanes[3])];
        block_bytes(&LevelsParams {
            input_black: pick(|c| c.input_black),
            input_white: pick(|c| c.input_white),
            gamma: pick(|c| c.gamma),
            output_black: pick(|c| c.output_black),
            output_white: pick(|c| c.output_white),
            opacity: [self.opacity, 0.0, 0.0, 0.0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::Property;

    fn params(f: &LevelsFilter) -> LevelsParams {
        let lanes = f.lanes();
        LevelsParams {
            input_black: lanes.map(|c| c.input_black),
            input_white: lanes.map(|c| c.input_white),
            gamma: lanes.map(|c| c.gamma),
            output_black: lanes.map(|c| c.output_black),
            output_white: lanes.map(|c| c.output_white),
            opacity: [f.opacity, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn defaults_are_identity() {
        let f = LevelsFilter::from_effect(&LevelsEffect::default(), Frame(0), 1.0);
        assert!(f.is_identity());
        let p = params(&f);
        for c in [0.0, 0.25, 0.5, 1.0] {
            assert!((level(c, &p, 0) - c).abs() < 1e-5);
        }
    }

    #[test]
    fn input_white_brightens() {
        let mut effect = LevelsEffect::default();
        effect.master.input_white = Property::Constant(127.5);
        let f = LevelsFilter::from_effect(&effect, Frame(0), 1.0);
        assert!(!f.is_identity());
        let p = params(&f);
        assert!((level(0.25, &p, 3) - 0.5).abs() < 1e-5);
        assert_eq!(level(0.9, &p, 3), 1.0);
    }

    #[test]
    fn output_range_and_gamma() {
        let mut effect = LevelsEffect::default();
        effect.red.output_black = Property::Constant(51.0);
        effect.red.gamma = Property::Constant(2.0);
        let f = LevelsFilter::from_effect(&effect, Frame(0), 1.0);
        let p = params(&f);
        assert!((level(0.0, &p, 0) - 0.2).abs() < 1e-5);
        let expected = (0.25f32.powf(0.5) * 204.0 + 51.0) / 255.0;
        assert!((level(0.25, &p, 0) - expected).abs() < 1e-5);
    }

    #[test]
    fn uniform_block_is_six_vectors() {
        let f = LevelsFilter::from_effect(&LevelsEffect::default(), Frame(0), 0.5);
        let target = crate::filters::runtime::FilterTarget::offscreen(crate::gpu::TextureId(0), 1, 1);
        let source = crate::filters::runtime::FilterSource {
            texture: crate::gpu::TextureId(0),
            width: 1,
            height: 1,
            scale: crate::foundation::core::Vec2::new(1.0, 1.0),
        };
        let r = crate::foundation::core::Rect::new(0.0, 0.0, 1.0, 1.0);
        let args = PassArgs {
            source: &source,
            target: &target,
            input_bounds: r,
            output_bounds: r,
            offset: crate::foundation::core::Vec2::ZERO,
        };
        let bytes = f.uniforms(&args);
        assert_eq!(bytes.len(), 96);
        assert_eq!(&bytes[80..84], &0.5f32.to_le_bytes());
    }
}
