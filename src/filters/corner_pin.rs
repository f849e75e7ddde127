use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::sample_or_clear,
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::{
        core::{Frame, Point, Rect, Vec2},
        math::{bbox, quad_corner_weights},
    },
    gpu::{Fragment, Vertex},
    model::effect::CornerPinEffect,
};

const CORNER_PIN_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // input uv rect
    region: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let uv = clamp(in.uv, params.region.xy, params.region.zw);
    return textureSampleLevel(t_src, s_linear, uv, 0.0);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_corner_pin",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: CORNER_PIN_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: corner_pin_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CornerPinParams {
    region: [f32; 4],
}
assert_block_size!(CornerPinParams);

fn corner_pin_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: CornerPinParams = frag.uniform(0);
    let uv = [
        frag.uv[0].clamp(p.region[0], p.region[2].max(p.region[0])),
        frag.uv[1].clamp(p.region[1], p.region[3].max(p.region[1])),
    ];
    sample_or_clear(frag, 0, uv)
}

/// Maps the input bounds onto an arbitrary quad with a projective transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerPinFilter {
    pub upper_left: Point,
    pub upper_right: Point,
    pub lower_left: Point,
    pub lower_right: Point,
}

impl CornerPinFilter {
    pub fn from_effect(effect: &CornerPinEffect, frame: Frame) -> Self {
        Self {
            upper_left: effect.upper_left.value_at(frame),
            upper_right: effect.upper_right.value_at(frame),
            lower_left: effect.lower_left.value_at(frame),
            lower_right: effect.lower_right.value_at(frame),
        }
    }

    /// Corners in strip order: upper left, upper right, lower left, lower right.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.upper_left,
            self.upper_right,
            self.lower_left,
            self.lower_right,
        ]
    }
}

impl FilterPass for CornerPinFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::CornerPin
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        bbox(&self.corners()).unwrap_or(src)
    }

    /// Longest pinned edge over the matching content edge, per axis.
    fn max_scale_factor(&self, content: Rect) -> Vec2 {
        let [ul, ur, ll, lr] = self.corners();
        let w = content.width().max(1e-6);
        let h = content.height().max(1e-6);
        let sx = (ur - ul).hypot().max((lr - ll).hypot()) / w;
        let sy = (ll - ul).hypot().max((lr - ur).hypot()) / h;
        Vec2::new(sx.max(1.0), sy.max(1.0))
    }

    /// Projected edges are antialiased with multisampling.
    fn sample_count(&self) -> u32 {
        4
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        block_bytes(&CornerPinParams {
            region: [origin[0], origin[1], end[0], end[1]],
        })
    }

    fn vertices(&self, args: &PassArgs<'_>) -> Vec<Vertex> {
        let b = args.input_bounds;
        let texcoords = [
            args.source_uv(Point::new(b.x0, b.y0)),
            args.source_uv(Point::new(b.x1, b.y0)),
            args.source_uv(Point::new(b.x0, b.y1)),
            args.source_uv(Point::new(b.x1, b.y1)),
        ];
        let quad = self.corners().map(|c| args.content_to_output_px(c));
        let weights = quad_corner_weights(quad).unwrap_or([1.0; 4]);
        quad.iter()
            .zip(texcoords)
            .zip(weights)
            .map(|((p, uv), w)| Vertex::new(args.output_px_to_clip(*p), w as f32, uv))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(corners: [(f64, f64); 4]) -> CornerPinFilter {
        let [ul, ur, ll, lr] = corners.map(|(x, y)| Point::new(x, y));
        CornerPinFilter {
            upper_left: ul,
            upper_right: ur,
            lower_left: ll,
            lower_right: lr,
        }
    }

    #[test]
    fn bounds_are_the_corner_box() {
        let f = pin([(5.0, -2.0), (30.0, 0.0), (0.0, 20.0), (25.0, 18.0)]);
        assert_eq!(
            f.filter_bounds(Rect::new(0.0, 0.0, 10.0, 10.0)),
            Rect::new(0.0, -2.0, 30.0, 20.0)
        );
    }

    #[test]
    fn stretching_raises_max_scale() {
        let content = Rect::new(0.0, 0.0, 10.0, 10.0);
        let f = pin([(0.0, 0.0), (30.0, 0.0), (0.0, 10.0), (30.0, 10.0)]);
        let s = f.max_scale_factor(content);
        assert!((s.x - 3.0).abs() < 1e-9);
        assert_eq!(s.y, 1.0);
        let shrink = pin([(0.0, 0.0), (5.0, 0.0), (0.0, 5.0), (5.0, 5.0)]);
        assert_eq!(shrink.max_scale_factor(content), Vec2::new(1.0, 1.0));
    }
}
