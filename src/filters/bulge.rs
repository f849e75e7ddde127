use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{mix4, sample_or_clear, smoothstep},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::{
        core::{Frame, Point, Rect},
        math::intersect,
    },
    gpu::Fragment,
    model::effect::BulgeEffect,
};

const BULGE_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // center uv, radius uv
    shape: vec4<f32>,
    // height, taper, pinning, opacity
    bulge: vec4<f32>,
    // input uv rect
    region: vec4<f32>,
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
    let delta = in.uv - params.shape.xy;
    let d = delta / params.shape.zw;
    let r = length(d);
    var uv = in.uv;
    if (r < 1.0) {
        var k = 1.0 - r * r;
        if (params.bulge.y > 0.0) {
            k = k * smoothstep(0.0, params.bulge.y, 1.0 - r);
        }
        let h = params.bulge.x;
        var s = 1.0 + max(-h, 0.0) * k * k;
        if (h > 0.0) {
            s = 1.0 / (1.0 + h * k * k);
        }
        if (params.bulge.z > 0.5) {
            let size = params.region.zw - params.region.xy;
            let edge = min(min(in.uv.x - params.region.x, params.region.z - in.uv.x) / size.x,
                           min(in.uv.y - params.region.y, params.region.w - in.uv.y) / size.y);
            s = mix(1.0, s, smoothstep(0.0, 0.1, edge));
        }
        uv = params.shape.xy + delta * s;
    }
    return mix(src, tap(uv), params.bulge.w);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_bulge",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: BULGE_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: bulge_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BulgeParams {
    shape: [f32; 4],
    bulge: [f32; 4],
    region: [f32; 4],
}
assert_block_size!(BulgeParams);

/// Sampling scale toward the center at normalized elliptical radius `r`.
fn bulge_scale(r: f32, height: f32, taper: f32) -> f32 {
    if r >= 1.0 {
        return 1.0;
    }
    let mut k = 1.0 - r * r;
    if taper > 0.0 {
        k *= smoothstep(0.0, taper, 1.0 - r);
    }
    if height > 0.0 {
        1.0 / (1.0 + height * k * k)
    } else {
        1.0 - height * k * k
    }
}

fn bulge_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: BulgeParams = frag.uniform(0);
    let src = sample_or_clear(frag, 0, frag.uv);
    let delta = [frag.uv[0] - p.shape[0], frag.uv[1] - p.shape[1]];
    let d = [delta[0] / p.shape[2], delta[1] / p.shape[3]];
    let r = d[0].hypot(d[1]);
    let mut s = bulge_scale(r, p.bulge[0], p.bulge[1]);
    if r < 1.0 && p.bulge[2] > 0.5 {
        let reg = p.region;
        let sx = (reg[2] - reg[0]).max(1e-6);
        let sy = (reg[3] - reg[1]).max(1e-6);
        let edge = ((frag.uv[0] - reg[0]).min(reg[2] - frag.uv[0]) / sx)
            .min((frag.uv[1] - reg[1]).min(reg[3] - frag.uv[1]) / sy);
        s = 1.0 + (s - 1.0) * smoothstep(0.0, 0.1, edge);
    }
    let uv = [p.shape[0] + delta[0] * s, p.shape[1] + delta[1] * s];
    mix4(src, sample_or_clear(frag, 0, uv), p.bulge[3])
}

/// Elliptical magnification (positive height) or pinch (negative height).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BulgeFilter {
    pub horizontal_radius: f32,
    pub vertical_radius: f32,
    pub center: Point,
    pub height: f32,
    pub taper_radius: f32,
    /// Hold the layer edges in place.
    pub pinning: bool,
    pub opacity: f32,
}

impl BulgeFilter {
    pub fn from_effect(effect: &BulgeEffect, frame: Frame, opacity: f32) -> Self {
        Self {
            horizontal_radius: effect.horizontal_radius.value_at(frame).max(0.0),
            vertical_radius: effect.vertical_radius.value_at(frame).max(0.0),
            center: effect.center.value_at(frame),
            height: effect.height.value_at(frame).clamp(-4.0, 4.0),
            taper_radius: effect.taper_radius.value_at(frame).max(0.0),
            pinning: effect.pinning.value_at(frame),
            opacity,
        }
    }

    pub fn ellipse_bounds(&self) -> Rect {
        let (rx, ry) = (
            f64::from(self.horizontal_radius),
            f64::from(self.vertical_radius),
        );
        Rect::new(
            self.center.x - rx,
            self.center.y - ry,
            self.center.x + rx,
            self.center.y + ry,
        )
    }
}

impl FilterPass for BulgeFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Bulge
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        if self.is_identity() || self.pinning {
            return src;
        }
        let ellipse = self.ellipse_bounds();
        match intersect(src, ellipse) {
            Some(_) => src.union(ellipse),
            None => src,
        }
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0
            || self.horizontal_radius <= 0.0
            || self.vertical_radius <= 0.0
            || self.height == 0.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let center = args.source_uv(self.center);
        let per_unit = args.uv_per_unit();
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        let radius = self.horizontal_radius.max(self.vertical_radius).max(1e-3);
        block_bytes(&BulgeParams {
            shape: [
                center[0],
                center[1],
                (self.horizontal_radius * per_unit[0]).max(1e-6),
                (self.vertical_radius * per_unit[1]).max(1e-6),
            ],
            bulge: [
                self.height,
                (self.taper_radius / radius).clamp(0.0, 1.0),
                if self.pinning { 1.0 } else { 0.0 },
                self.opacity,
            ],
            region: [origin[0], origin[1], end[0], end[1]],
        })
    }
}
