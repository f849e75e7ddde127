use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{clamp01, mix},
        uniforms::{Std140Writer, UniformBinding},
    },
    foundation::core::{Frame, Point},
    gpu::Fragment,
    model::style::{AlphaStop, ColorStop, GradientOverlayStyle, GradientStyle},
};

/// Stops beyond this count are dropped.
pub const MAX_STOPS: usize = 8;

const GRADIENT_OVERLAY_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // direction, radial, reverse
    axis: vec4<f32>,
    // center uv, half extent uv
    geom: vec4<f32>,
    // scale, opacity, color stop count, alpha stop count
    extra: vec4<f32>,
    region: vec4<f32>,
    // rgb, position
    colors: array<vec4<f32>, 8>,
    // opacity, position
    alphas: array<vec4<f32>, 8>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn color_at(t: f32) -> vec3<f32> {
    let n = u32(params.extra.z);
    var c = params.colors[0].rgb;
    for (var i = 1u; i < n; i = i + 1u) {
        let a = params.colors[i - 1u];
        let b = params.colors[i];
        if (t >= b.w) {
            c = b.rgb;
        } else if (t > a.w) {
            c = mix(a.rgb, b.rgb, (t - a.w) / max(b.w - a.w, 1e-6));
        }
    }
    return c;
}

fn alpha_at(t: f32) -> f32 {
    let n = u32(params.extra.w);
    if (n == 0u) {
        return 1.0;
    }
    var v = params.alphas[0].x;
    for (var i = 1u; i < n; i = i + 1u) {
        let a = params.alphas[i - 1u];
        let b = params.alphas[i];
        if (t >= b.y) {
            v = b.x;
        } else if (t > a.y) {
            v = mix(a.x, b.x, (t - a.y) / max(b.y - a.y, 1e-6));
        }
    }
    return v;
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    var src = vec4<f32>(0.0);
    if (all(in.uv >= params.region.xy) && all(in.uv <= params.region.zw)) {
        src = textureSampleLevel(t_src, s_linear, in.uv, 0.0);
    }
    let q = (in.uv - params.geom.xy) / max(params.geom.zw, vec2<f32>(1e-6));
    var t = 0.0;
    if (params.axis.z > 0.5) {
        t = length(q) / 1.41421356 / params.extra.x;
    } else {
        let d = params.axis.xy;
        t = 0.5 + 0.5 * dot(q, d) / max(abs(d.x) + abs(d.y), 1e-6) / params.extra.x;
    }
    t = clamp(t, 0.0, 1.0);
    if (params.axis.w > 0.5) {
        t = 1.0 - t;
    }
    let a = alpha_at(t) * params.extra.y * src.a;
    return vec4<f32>(color_at(t) * a, a);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_gradient_overlay",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: GRADIENT_OVERLAY_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: gradient_overlay_kernel,
};

fn vec4_at(bytes: &[u8], index: usize) -> [f32; 4] {
    bytes
        .get(index * 16..index * 16 + 16)
        .map(bytemuck::pod_read_unaligned)
        .unwrap_or([0.0; 4])
}

/// Piecewise-linear lookup over `(value, position)` pairs sorted by position.
fn ramp<const N: usize>(stops: &[([f32; N], f32)], t: f32) -> [f32; N] {
    let Some(first) = stops.first() else {
        return [0.0; N];
    };
    let mut v = first.0;
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t >= b.1 {
            v = b.0;
        } else if t > a.1 {
            let k = (t - a.1) / (b.1 - a.1).max(1e-6);
            v = std::array::from_fn(|i| mix(a.0[i], b.0[i], k));
        }
    }
    v
}

fn gradient_overlay_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let bytes = frag.uniform_bytes(0);
    let axis = vec4_at(bytes, 0);
    let geom = vec4_at(bytes, 1);
    let extra = vec4_at(bytes, 2);
    let region = vec4_at(bytes, 3);
    let colors: Vec<([f32; 3], f32)> = (0..(extra[2] as usize).min(MAX_STOPS))
        .map(|i| {
            let c = vec4_at(bytes, 4 + i);
            ([c[0], c[1], c[2]], c[3])
        })
        .collect();
    let alphas: Vec<([f32; 1], f32)> = (0..(extra[3] as usize).min(MAX_STOPS))
        .map(|i| {
            let a = vec4_at(bytes, 4 + MAX_STOPS + i);
            ([a[0]], a[1])
        })
        .collect();

    let uv = frag.uv;
    let inside = uv[0] >= region[0] && uv[0] <= region[2] && uv[1] >= region[1] && uv[1] <= region[3];
    let src = if inside { frag.sample(0, uv) } else { [0.0; 4] };
    let q = [
        (uv[0] - geom[0]) / geom[2].max(1e-6),
        (uv[1] - geom[1]) / geom[3].max(1e-6),
    ];
    let mut t = if axis[2] > 0.5 {
        q[0].hypot(q[1]) / std::f32::consts::SQRT_2 / extra[0]
    } else {
        let norm = (axis[0].abs() + axis[1].abs()).max(1e-6);
        0.5 + 0.5 * (q[0] * axis[0] + q[1] * axis[1]) / norm / extra[0]
    };
    t = clamp01(t);
    if axis[3] > 0.5 {
        t = 1.0 - t;
    }
    let opacity = if alphas.is_empty() { 1.0 } else { ramp(&alphas, t)[0] };
    let a = opacity * extra[1] * src[3];
    let c = ramp(&colors, t);
    [c[0] * a, c[1] * a, c[2] * a, a]
}

/// Gradient fill masked by the layer alpha.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientOverlayFilter {
    pub opacity: f32,
    /// Sorted by position, at most [`MAX_STOPS`].
    pub colors: Vec<ColorStop>,
    pub alphas: Vec<AlphaStop>,
    /// Degrees, counter-clockwise from the positive x axis.
    pub angle: f32,
    pub style: GradientStyle,
    pub reverse: bool,
    /// Percent.
    pub scale: f32,
}

impl GradientOverlayFilter {
    pub fn from_style(style: &GradientOverlayStyle, frame: Frame) -> Self {
        let mut colors = style.colors.clone();
        colors.sort_by(|a, b| a.position.total_cmp(&b.position));
        colors.truncate(MAX_STOPS);
        let mut alphas = style.alphas.clone();
        alphas.sort_by(|a, b| a.position.total_cmp(&b.position));
        alphas.truncate(MAX_STOPS);
        Self {
            opacity: style.opacity.value_at(frame).clamp(0.0, 1.0),
            colors,
            alphas,
            angle: style.angle.value_at(frame),
            style: style.style.value_at(frame),
            reverse: style.reverse.value_at(frame),
            scale: style.scale.value_at(frame).max(1.0),
        }
    }
}

impl FilterPass for GradientOverlayFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::GradientOverlay
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || self.colors.is_empty()
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        let center = args.source_uv(b.center());
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let flag = |v: bool| if v { 1.0 } else { 0.0 };
        let colors: Vec<[f32; 4]> = self
            .colors
            .iter()
            .map(|s| {
                let [r, g, bl] = s.color.to_f32();
                [r, g, bl, s.position]
            })
            .collect();
        let alphas: Vec<[f32; 4]> = self
            .alphas
            .iter()
            .map(|s| [s.opacity, s.position, 0.0, 0.0])
            .collect();
        Std140Writer::new()
            .vec4([cos, -sin, flag(self.style == GradientStyle::Radial), flag(self.reverse)])
            .vec4([
                center[0],
                center[1],
                (end[0] - origin[0]) / 2.0,
                (end[1] - origin[1]) / 2.0,
            ])
            .vec4([
                self.scale / 100.0,
                self.opacity,
                colors.len() as f32,
                alphas.len() as f32,
            ])
            .vec4([origin[0], origin[1], end[0], end[1]])
            .vec4_array::<MAX_STOPS>(&colors)
            .vec4_array::<MAX_STOPS>(&alphas)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        filters::runtime::{FilterSource, FilterTarget},
        foundation::core::{Color, Rect, Vec2},
        gpu::TextureId,
    };

    #[test]
    fn stops_are_sorted_and_block_is_fixed_size() {
        let style = GradientOverlayStyle {
            colors: vec![
                ColorStop {
                    position: 1.0,
                    color: Color::WHITE,
                },
                ColorStop {
                    position: 0.0,
                    color: Color::BLACK,
                },
            ],
            ..GradientOverlayStyle::default()
        };
        let f = GradientOverlayFilter::from_style(&style, Frame(0));
        assert_eq!(f.colors[0].position, 0.0);

        let source = FilterSource {
            texture: TextureId(1),
            width: 10,
            height: 10,
            scale: Vec2::new(1.0, 1.0),
        };
        let target = FilterTarget::offscreen(TextureId(2), 10, 10);
        let bounds = Rect::new(0.0, 0.0, 10.0, 10.0);
        let args = PassArgs {
            source: &source,
            target: &target,
            input_bounds: bounds,
            output_bounds: bounds,
            offset: Vec2::ZERO,
        };
        let bytes = f.uniforms(&args);
        assert_eq!(bytes.len(), 4 * 16 + 2 * MAX_STOPS * 16);
        assert_eq!(vec4_at(&bytes, 2)[2], 2.0);
        assert_eq!(vec4_at(&bytes, 5), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn ramp_interpolates_between_stops() {
        let stops = [([0.0], 0.0), ([1.0], 0.5), ([0.0], 1.0)];
        assert_eq!(ramp(&stops, 0.25), [0.5]);
        assert_eq!(ramp(&stops, 0.5), [1.0]);
        assert_eq!(ramp(&stops, 2.0), [0.0]);
    }
}
