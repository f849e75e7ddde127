use crate::{
    filters::{
        layer_style::src_alpha,
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Color, Frame, Point, Rect, Vec2},
    gpu::Fragment,
    model::style::{StrokePosition, StrokeStyle},
};

/// Alpha above which a pixel counts as inside the layer.
const THRESHOLD: f32 = 0.3;
/// Angular step of the edge probe, degrees.
const STEP_DEGREES: f32 = 11.25;

const STROKE_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // rgb, opacity
    color: vec4<f32>,
    // probe radius uv, position (0 outside, 1 inside, 2 center)
    size: vec4<f32>,
    region: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

const THRESHOLD: f32 = 0.3;

fn src_alpha(uv: vec2<f32>) -> f32 {
    if (any(uv < params.region.xy) || any(uv > params.region.zw)) {
        return 0.0;
    }
    return textureSampleLevel(t_src, s_linear, uv, 0.0).a;
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let s = params.size.xy;
    var hi = 0.0;
    var lo = 1.0;
    for (var i = 0u; i <= 16u; i = i + 1u) {
        let arc = radians(f32(i) * 11.25);
        let m = vec2<f32>(cos(arc) * s.x, sin(arc) * s.y);
        for (var k = 0u; k < 4u; k = k + 1u) {
            var o = m;
            if (k % 2u == 1u) {
                o.y = -o.y;
            }
            if (k >= 2u) {
                o = o * 0.5;
            }
            let a = src_alpha(in.uv + o);
            hi = max(hi, a);
            lo = min(lo, a);
        }
    }
    let a = src_alpha(in.uv);
    let outside = a <= THRESHOLD && hi > 0.0;
    let inside = a > THRESHOLD && lo <= THRESHOLD;
    var ring = outside;
    if (params.size.z > 1.5) {
        ring = outside || inside;
    } else if (params.size.z > 0.5) {
        ring = inside;
    }
    if (!ring) {
        return vec4<f32>(0.0);
    }
    return vec4<f32>(params.color.rgb * params.color.a, params.color.a);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_stroke",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: STROKE_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: stroke_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct StrokeParams {
    color: [f32; 4],
    size: [f32; 4],
    region: [f32; 4],
}
assert_block_size!(StrokeParams);

/// Highest and lowest alpha on the probe ellipse (full and half radius) around `uv`.
fn probe(frag: &Fragment<'_>, uv: [f32; 2], size: [f32; 2], region: [f32; 4]) -> (f32, f32) {
    let mut hi: f32 = 0.0;
    let mut lo: f32 = 1.0;
    for i in 0..=16 {
        let arc = (i as f32 * STEP_DEGREES).to_radians();
        let m = [arc.cos() * size[0], arc.sin() * size[1]];
        for (sy, k) in [(1.0, 1.0), (-1.0, 1.0), (1.0, 0.5), (-1.0, 0.5)] {
            let a = src_alpha(frag, [uv[0] + m[0] * k, uv[1] + m[1] * sy * k], region);
            hi = hi.max(a);
            lo = lo.min(a);
        }
    }
    (hi, lo)
}

fn stroke_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: StrokeParams = frag.uniform(0);
    let (hi, lo) = probe(frag, frag.uv, [p.size[0], p.size[1]], p.region);
    let a = src_alpha(frag, frag.uv, p.region);
    let outside = a <= THRESHOLD && hi > 0.0;
    let inside = a > THRESHOLD && lo <= THRESHOLD;
    let ring = if p.size[2] > 1.5 {
        outside || inside
    } else if p.size[2] > 0.5 {
        inside
    } else {
        outside
    };
    if !ring {
        return [0.0; 4];
    }
    let k = p.color[3];
    [p.color[0] * k, p.color[1] * k, p.color[2] * k, k]
}

/// Solid outline along the layer alpha edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeFilter {
    pub color: Color,
    pub size: f32,
    pub opacity: f32,
    pub position: StrokePosition,
    pub style_scale: Vec2,
}

impl StrokeFilter {
    pub fn from_style(style: &StrokeStyle, frame: Frame, style_scale: Vec2) -> Self {
        Self {
            color: style.color.value_at(frame),
            size: style.size.value_at(frame).max(0.0),
            opacity: style.opacity.value_at(frame).clamp(0.0, 1.0),
            position: style.position.value_at(frame),
            style_scale,
        }
    }

    /// Distance the probe reaches from each pixel, content units.
    pub fn reach(&self) -> Vec2 {
        let s = match self.position {
            StrokePosition::Center => f64::from(self.size) / 2.0,
            StrokePosition::Outside | StrokePosition::Inside => f64::from(self.size),
        };
        Vec2::new(s * self.style_scale.x, s * self.style_scale.y)
    }
}

impl FilterPass for StrokeFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Stroke
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        match self.position {
            StrokePosition::Inside => src,
            StrokePosition::Outside | StrokePosition::Center => {
                let r = self.reach();
                src.inflate(r.x, r.y)
            }
        }
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || self.size <= 0.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let per_unit = args.uv_per_unit();
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        let r = self.reach();
        let [red, g, bl] = self.color.to_f32();
        block_bytes(&StrokeParams {
            color: [red, g, bl, self.opacity],
            size: [
                r.x as f32 * per_unit[0],
                r.y as f32 * per_unit[1],
                match self.position {
                    StrokePosition::Outside => 0.0,
                    StrokePosition::Inside => 1.0,
                    StrokePosition::Center => 2.0,
                },
                0.0,
            ],
            region: [origin[0], origin[1], end[0], end[1]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::Property;

    fn stroke(position: StrokePosition) -> StrokeFilter {
        let style = StrokeStyle {
            size: Property::Constant(4.0),
            position: Property::Constant(position),
            ..StrokeStyle::default()
        };
        StrokeFilter::from_style(&style, Frame(0), Vec2::new(1.0, 1.0))
    }

    #[test]
    fn bounds_depend_on_position() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(
            stroke(StrokePosition::Outside).filter_bounds(r),
            Rect::new(-4.0, -4.0, 14.0, 14.0)
        );
        assert_eq!(
            stroke(StrokePosition::Center).filter_bounds(r),
            Rect::new(-2.0, -2.0, 12.0, 12.0)
        );
        assert_eq!(stroke(StrokePosition::Inside).filter_bounds(r), r);
    }
}
