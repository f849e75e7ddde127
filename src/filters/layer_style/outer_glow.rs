use crate::{
    filters::{
        layer_style::{alpha_gather_wgsl, gathered_alpha, spread_alpha},
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Color, Frame, Point, Rect, Vec2},
    gpu::Fragment,
    model::style::OuterGlowStyle,
};

const OUTER_GLOW_FRAGMENT_SHADER: &str = concat!(
    r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // rgb, opacity
    color: vec4<f32>,
    // radius uv, spread
    glow: vec4<f32>,
    region: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;
"#,
    alpha_gather_wgsl!(),
    r#"
@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let a = spread_alpha(gathered_alpha(in.uv, params.glow.xy), params.glow.z);
    let k = a * (1.0 - src_alpha(in.uv)) * params.color.a;
    return vec4<f32>(params.color.rgb * k, k);
}
"#
);

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_outer_glow",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: OUTER_GLOW_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: outer_glow_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct OuterGlowParams {
    color: [f32; 4],
    glow: [f32; 4],
    region: [f32; 4],
}
assert_block_size!(OuterGlowParams);

fn outer_glow_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: OuterGlowParams = frag.uniform(0);
    let a = spread_alpha(
        gathered_alpha(frag, frag.uv, [p.glow[0], p.glow[1]], p.region),
        p.glow[2],
    );
    let inside = super::src_alpha(frag, frag.uv, p.region);
    let k = a * (1.0 - inside) * p.color[3];
    [p.color[0] * k, p.color[1] * k, p.color[2] * k, k]
}

/// Colored halo around the layer alpha.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OuterGlowFilter {
    pub color: Color,
    pub opacity: f32,
    pub size: f32,
    pub spread: f32,
    pub style_scale: Vec2,
}

impl OuterGlowFilter {
    pub fn from_style(style: &OuterGlowStyle, frame: Frame, style_scale: Vec2) -> Self {
        Self {
            color: style.color.value_at(frame),
            opacity: style.opacity.value_at(frame).clamp(0.0, 1.0),
            size: style.size.value_at(frame).max(0.0),
            spread: style.spread.value_at(frame).clamp(0.0, 1.0),
            style_scale,
        }
    }

    pub fn extent(&self) -> Vec2 {
        let s = f64::from(self.size);
        Vec2::new(s * self.style_scale.x, s * self.style_scale.y)
    }
}

impl FilterPass for OuterGlowFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::OuterGlow
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        let e = self.extent();
        src.inflate(e.x, e.y)
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || self.size <= 0.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let per_unit = args.uv_per_unit();
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        let e = self.extent();
        let [r, g, bl] = self.color.to_f32();
        block_bytes(&OuterGlowParams {
            color: [r, g, bl, self.opacity],
            glow: [
                e.x as f32 * per_unit[0],
                e.y as f32 * per_unit[1],
                self.spread,
                0.0,
            ],
            region: [origin[0], origin[1], end[0], end[1]],
        })
    }
}
