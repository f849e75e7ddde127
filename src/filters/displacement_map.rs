use std::sync::Arc;

use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{fract, mix4, unpremultiply},
        uniforms::{Mat3Std140, UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Affine, Frame, FrameRGBA, Point, Rect, Vec2},
    gpu::{Fragment, TextureId},
    model::effect::{DisplacementMapBehavior, DisplacementMapEffect, DisplacementMapSource},
};

const DISPLACEMENT_MAP_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;
@group(0) @binding(2) var t_map: texture_2d<f32>;

struct Params {
    map_matrix: mat3x3<f32>,
    select_x: vec4<f32>,
    select_y: vec4<f32>,
    // displacement offset x/y, coverage offset x/y
    select_offset: vec4<f32>,
    // coverage scale x/y, hsl x/y
    coverage: vec4<f32>,
    // uv span x/y, tile map, wrap input
    amount: vec4<f32>,
    region: vec4<f32>,
    opacity: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn rgb_to_hsl(c: vec3<f32>) -> vec3<f32> {
    let hi = max(max(c.r, c.g), c.b);
    let lo = min(min(c.r, c.g), c.b);
    let l = (hi + lo) * 0.5;
    let d = hi - lo;
    if (d <= 1e-4) {
        return vec3<f32>(0.0, 0.0, l);
    }
    let s = d / (1.0 - abs(2.0 * l - 1.0) + 1e-4);
    var h = 0.0;
    if (hi == c.r) {
        h = (c.g - c.b) / d;
    } else if (hi == c.g) {
        h = (c.b - c.r) / d + 2.0;
    } else {
        h = (c.r - c.g) / d + 4.0;
    }
    return vec3<f32>(fract(h / 6.0), s, l);
}

fn inside(uv: vec2<f32>, lo: vec2<f32>, hi: vec2<f32>) -> bool {
    return all(uv >= lo) && all(uv <= hi);
}

fn input_color(uv: vec2<f32>) -> vec4<f32> {
    let lo = params.region.xy;
    let hi = params.region.zw;
    if (params.amount.w > 0.5) {
        return textureSampleLevel(t_src, s_linear, lo + fract((uv - lo) / (hi - lo)) * (hi - lo), 0.0);
    }
    if (!inside(uv, lo, hi)) {
        return vec4<f32>(0.0);
    }
    return textureSampleLevel(t_src, s_linear, uv, 0.0);
}

fn axis(sel: vec4<f32>, rgba: vec4<f32>, hsla: vec4<f32>, hsl: f32, d_offset: f32, c_scale: f32, c_offset: f32) -> f32 {
    var v = rgba;
    if (hsl > 0.5) {
        v = hsla;
    }
    let coverage = c_scale * rgba.a + c_offset;
    return (dot(sel, v) + d_offset - 0.5) * coverage;
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let map_uv = (params.map_matrix * vec3<f32>(in.uv, 1.0)).xy;
    var m = vec4<f32>(0.0);
    if (params.amount.z > 0.5) {
        m = textureSampleLevel(t_map, s_linear, fract(map_uv), 0.0);
    } else if (inside(map_uv, vec2<f32>(0.0), vec2<f32>(1.0))) {
        m = textureSampleLevel(t_map, s_linear, map_uv, 0.0);
    }
    var rgba = vec4<f32>(0.0);
    if (m.a > 0.0) {
        rgba = vec4<f32>(m.rgb / m.a, m.a);
    }
    let hsla = vec4<f32>(rgb_to_hsl(rgba.rgb), rgba.a);
    let dx = axis(params.select_x, rgba, hsla, params.coverage.z, params.select_offset.x, params.coverage.x, params.select_offset.z);
    let dy = axis(params.select_y, rgba, hsla, params.coverage.w, params.select_offset.y, params.coverage.y, params.select_offset.w);
    let displaced = in.uv + vec2<f32>(dx, dy) * params.amount.xy;
    return mix(input_color(in.uv), input_color(displaced), params.opacity.x);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_displacement_map",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: DISPLACEMENT_MAP_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_AND_MAP_WITH_PARAMS,
    kernel: displacement_map_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DisplacementMapParams {
    map_matrix: Mat3Std140,
    select_x: [f32; 4],
    select_y: [f32; 4],
    select_offset: [f32; 4],
    coverage: [f32; 4],
    amount: [f32; 4],
    region: [f32; 4],
    opacity: [f32; 4],
}
assert_block_size!(DisplacementMapParams);

/// How a map channel turns into displacement and coverage.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Selector {
    /// Weights over `(r, g, b, a)` or `(h, s, l, a)`.
    weights: [f32; 4],
    offset: f32,
    coverage_scale: f32,
    coverage_offset: f32,
    hsl: bool,
}

fn selector(source: DisplacementMapSource) -> Selector {
    use DisplacementMapSource as S;
    let (weights, offset, coverage_scale, coverage_offset) = match source {
        S::Red => ([1.0, 0.0, 0.0, 0.0], 0.0, 1.0, 0.0),
        S::Green => ([0.0, 1.0, 0.0, 0.0], 0.0, 1.0, 0.0),
        S::Blue => ([0.0, 0.0, 1.0, 0.0], 0.0, 1.0, 0.0),
        S::Alpha => ([0.0, 0.0, 0.0, 1.0], 0.0, 0.0, 1.0),
        S::Luminance => ([0.2126, 0.7152, 0.0722, 0.0], 0.0, 1.0, 0.0),
        S::Hue => ([1.0, 0.0, 0.0, 0.0], 0.0, 0.0, 1.0),
        S::Saturation => ([0.0, 1.0, 0.0, 0.0], 0.0, 0.0, 1.0),
        S::Lightness => ([0.0, 0.0, 1.0, 0.0], 0.0, 0.0, 1.0),
        S::Full => ([0.0; 4], 1.0, 0.0, 1.0),
        S::Half => ([0.0; 4], 0.5, 0.0, 1.0),
        S::Off => ([0.0; 4], 0.0, 0.0, 1.0),
    };
    Selector {
        weights,
        offset,
        coverage_scale,
        coverage_offset,
        hsl: matches!(source, S::Hue | S::Saturation | S::Lightness),
    }
}

fn rgb_to_hsl(c: [f32; 3]) -> [f32; 3] {
    let hi = c[0].max(c[1]).max(c[2]);
    let lo = c[0].min(c[1]).min(c[2]);
    let l = (hi + lo) * 0.5;
    let d = hi - lo;
    if d <= 1e-4 {
        return [0.0, 0.0, l];
    }
    let s = d / (1.0 - (2.0 * l - 1.0).abs() + 1e-4);
    let h = if hi == c[0] {
        (c[1] - c[2]) / d
    } else if hi == c[1] {
        (c[2] - c[0]) / d + 2.0
    } else {
        (c[0] - c[1]) / d + 4.0
    };
    [fract(h / 6.0), s, l]
}

fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

fn displacement_map_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: DisplacementMapParams = frag.uniform(0);
    let [lo_u, lo_v, hi_u, hi_v] = p.region;
    let input_color = |uv: [f32; 2]| -> [f32; 4] {
        let (su, sv) = ((hi_u - lo_u).max(1e-6), (hi_v - lo_v).max(1e-6));
        if p.amount[3] > 0.5 {
            let u = lo_u + fract((uv[0] - lo_u) / su) * su;
            let v = lo_v + fract((uv[1] - lo_v) / sv) * sv;
            return frag.sample(0, [u, v]);
        }
        if uv[0] < lo_u || uv[0] > hi_u || uv[1] < lo_v || uv[1] > hi_v {
            return [0.0; 4];
        }
        frag.sample(0, uv)
    };

    let map_uv = p.map_matrix.transform(frag.uv);
    let map_uv = [map_uv[0], map_uv[1]];
    let m = if p.amount[2] > 0.5 {
        frag.sample(1, [fract(map_uv[0]), fract(map_uv[1])])
    } else if (0.0..=1.0).contains(&map_uv[0]) && (0.0..=1.0).contains(&map_uv[1]) {
        frag.sample(1, map_uv)
    } else {
        [0.0; 4]
    };
    let rgba = unpremultiply(m);
    let [h, s, l] = rgb_to_hsl([rgba[0], rgba[1], rgba[2]]);
    let hsla = [h, s, l, rgba[3]];
    let axis = |weights: [f32; 4], hsl: f32, offset: f32, c_scale: f32, c_offset: f32| {
        let v = if hsl > 0.5 { hsla } else { rgba };
        (dot4(weights, v) + offset - 0.5) * (c_scale * rgba[3] + c_offset)
    };
    let dx = axis(p.select_x, p.coverage[2], p.select_offset[0], p.coverage[0], p.select_offset[2]);
    let dy = axis(p.select_y, p.coverage[3], p.select_offset[1], p.coverage[1], p.select_offset[3]);
    let displaced = [frag.uv[0] + dx * p.amount[0], frag.uv[1] + dy * p.amount[1]];
    mix4(input_color(frag.uv), input_color(displaced), p.opacity[0])
}

/// Offsets input pixels by channels of a map image.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplacementMapFilter {
    pub map: Arc<FrameRGBA>,
    /// The uploaded map; bound only for the duration of a draw.
    pub map_texture: Option<TextureId>,
    pub use_for_horizontal: DisplacementMapSource,
    /// Content units, already multiplied by the effect scale.
    pub max_horizontal: f32,
    pub use_for_vertical: DisplacementMapSource,
    pub max_vertical: f32,
    pub behavior: DisplacementMapBehavior,
    pub wrap_pixels_around: bool,
    pub expand_output: bool,
    pub opacity: f32,
}

impl DisplacementMapFilter {
    /// `None` when the effect has no resolved map.
    pub fn from_effect(
        effect: &DisplacementMapEffect,
        frame: Frame,
        effect_scale: Vec2,
        opacity: f32,
    ) -> Option<Self> {
        let map = effect.map.clone()?;
        Some(Self {
            map,
            map_texture: None,
            use_for_horizontal: effect.use_for_horizontal.value_at(frame),
            max_horizontal: effect.max_horizontal.value_at(frame) * effect_scale.x as f32,
            use_for_vertical: effect.use_for_vertical.value_at(frame),
            max_vertical: effect.max_vertical.value_at(frame) * effect_scale.y as f32,
            behavior: effect.map_behavior.value_at(frame),
            wrap_pixels_around: effect.wrap_pixels_around.value_at(frame),
            expand_output: effect.expand_output.value_at(frame),
            opacity,
        })
    }

    /// Maps content coordinates to map texcoords for an input occupying `input`.
    fn content_to_map(&self, input: Rect) -> Affine {
        let mw = f64::from(self.map.width.max(1));
        let mh = f64::from(self.map.height.max(1));
        match self.behavior {
            DisplacementMapBehavior::CenterMap => {
                let c = input.center();
                Affine::scale_non_uniform(1.0 / mw, 1.0 / mh)
                    * Affine::translate((-(c.x - mw / 2.0), -(c.y - mh / 2.0)))
            }
            DisplacementMapBehavior::StretchMapToFit => {
                Affine::scale_non_uniform(
                    1.0 / input.width().max(1e-6),
                    1.0 / input.height().max(1e-6),
                ) * Affine::translate((-input.x0, -input.y0))
            }
            DisplacementMapBehavior::TileMap => {
                Affine::scale_non_uniform(1.0 / mw, 1.0 / mh)
                    * Affine::translate((-input.x0, -input.y0))
            }
        }
    }
}

impl FilterPass for DisplacementMapFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::DisplacementMap
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        if !self.expand_output {
            return src;
        }
        src.inflate(
            f64::from(self.max_horizontal.abs()),
            f64::from(self.max_vertical.abs()),
        )
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || (self.max_horizontal == 0.0 && self.max_vertical == 0.0)
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let b = args.input_bounds;
        let per_unit = args.uv_per_unit();
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        let content_from_uv = Affine::translate((b.x0, b.y0))
            * Affine::scale_non_uniform(
                1.0 / f64::from(per_unit[0]).max(1e-12),
                1.0 / f64::from(per_unit[1]).max(1e-12),
            )
            * Affine::translate((-f64::from(origin[0]), -f64::from(origin[1])));
        let x = selector(self.use_for_horizontal);
        let y = selector(self.use_for_vertical);
        let flag = |v: bool| if v { 1.0 } else { 0.0 };
        block_bytes(&DisplacementMapParams {
            map_matrix: Mat3Std140::from_affine(self.content_to_map(b) * content_from_uv),
            select_x: x.weights,
            select_y: y.weights,
            select_offset: [x.offset, y.offset, x.coverage_offset, y.coverage_offset],
            coverage: [x.coverage_scale, y.coverage_scale, flag(x.hsl), flag(y.hsl)],
            amount: [
                2.0 * self.max_horizontal * per_unit[0],
                2.0 * self.max_vertical * per_unit[1],
                flag(self.behavior == DisplacementMapBehavior::TileMap),
                flag(self.wrap_pixels_around),
            ],
            region: [origin[0], origin[1], end[0], end[1]],
            opacity: [self.opacity, 0.0, 0.0, 0.0],
        })
    }

    fn extra_textures(&self) -> Vec<TextureId> {
        self.map_texture.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::Property;

    fn map(w: u32, h: u32) -> Arc<FrameRGBA> {
        Arc::new(FrameRGBA {
            width: w,
            height: h,
            data: vec![128; (w * h * 4) as usize],
            premultiplied: true,
        })
    }

    fn filter(expand: bool, behavior: DisplacementMapBehavior) -> DisplacementMapFilter {
        let effect = DisplacementMapEffect {
            map: Some(map(4, 4)),
            max_horizontal: Property::Constant(6.0),
            max_vertical: Property::Constant(-3.0),
            expand_output: Property::Constant(expand),
            map_behavior: Property::Constant(behavior),
            ..DisplacementMapEffect::default()
        };
        DisplacementMapFilter::from_effect(&effect, Frame(0), Vec2::new(1.0, 1.0), 1.0).unwrap()
    }

    #[test]
    fn expand_output_grows_by_max_displacement() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let f = filter(true, DisplacementMapBehavior::CenterMap);
        assert_eq!(f.filter_bounds(r), Rect::new(-6.0, -3.0, 16.0, 13.0));
        assert_eq!(filter(false, DisplacementMapBehavior::CenterMap).filter_bounds(r), r);
    }

    #[test]
    fn missing_map_builds_nothing() {
        let effect = DisplacementMapEffect::default();
        assert!(DisplacementMapFilter::from_effect(&effect, Frame(0), Vec2::new(1.0, 1.0), 1.0).is_none());
    }

    #[test]
    fn map_placement_per_behavior() {
        let input = Rect::new(0.0, 0.0, 8.0, 8.0);
        let center = filter(false, DisplacementMapBehavior::CenterMap).content_to_map(input);
        assert_eq!(center * Point::new(4.0, 4.0), Point::new(0.5, 0.5));
        let stretch = filter(false, DisplacementMapBehavior::StretchMapToFit).content_to_map(input);
        assert_eq!(stretch * Point::new(8.0, 8.0), Point::new(1.0, 1.0));
        let tile = filter(false, DisplacementMapBehavior::TileMap).content_to_map(input);
        assert_eq!(tile * Point::new(8.0, 4.0), Point::new(2.0, 1.0));
    }

    #[test]
    fn selectors_follow_channel_semantics() {
        assert_eq!(selector(DisplacementMapSource::Half).offset, 0.5);
        assert_eq!(selector(DisplacementMapSource::Alpha).coverage_offset, 1.0);
        assert!(selector(DisplacementMapSource::Hue).hsl);
        assert!(!selector(DisplacementMapSource::Luminance).hsl);
        let [h, s, l] = rgb_to_hsl([1.0, 0.0, 0.0]);
        assert!(h.abs() < 1e-6 && s > 0.99 && (l - 0.5).abs() < 1e-6);
    }
}
