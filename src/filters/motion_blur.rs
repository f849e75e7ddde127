use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{add4, sample_or_clear, scale4},
        uniforms::{Mat3Std140, UniformBinding, assert_block_size, block_bytes},
    },
    foundation::{
        core::{Affine, Point, Rect},
        math::bbox,
    },
    gpu::Fragment,
};

/// Fraction of the frame interval the shutter stays open (180°).
pub const SHUTTER: f64 = 0.5;

const TAPS: u32 = 16;

const MOTION_BLUR_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // source uv at shutter close
    trail: mat3x3<f32>,
    // taps
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
    let end = (params.trail * vec3<f32>(in.uv, 1.0)).xy;
    let taps = u32(params.extra.x);
    var acc = vec4<f32>(0.0);
    for (var i = 0u; i < taps; i = i + 1u) {
        let t = f32(i) / f32(taps - 1u);
        acc = acc + tap(mix(in.uv, end, t));
    }
    return acc / f32(taps);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_motion_blur",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: MOTION_BLUR_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: motion_blur_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MotionBlurParams {
    trail: Mat3Std140,
    extra: [f32; 4],
}
assert_block_size!(MotionBlurParams);

fn motion_blur_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: MotionBlurParams = frag.uniform(0);
    let end = p.trail.transform(frag.uv);
    let taps = (p.extra[0] as u32).max(2);
    let mut acc = [0.0; 4];
    for i in 0..taps {
        let t = i as f32 / (taps - 1) as f32;
        let uv = [
            frag.uv[0] + (end[0] - frag.uv[0]) * t,
            frag.uv[1] + (end[1] - frag.uv[1]) * t,
        ];
        acc = add4(acc, sample_or_clear(frag, 0, uv));
    }
    scale4(acc, 1.0 / taps as f32)
}

fn lerp_affine(a: Affine, b: Affine, t: f64) -> Affine {
    let (a, b) = (a.as_coeffs(), b.as_coeffs());
    Affine::new(std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t))
}

/// Smears the layer along its movement since the previous frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionBlurFilter {
    /// Layer matrix at the previous frame.
    pub previous: Affine,
    /// Layer matrix at the current frame.
    pub current: Affine,
}

impl MotionBlurFilter {
    pub fn new(previous: Affine, current: Affine) -> Self {
        Self { previous, current }
    }

    /// Where content sat at the previous frame, in current content coordinates.
    fn motion(&self) -> Option<Affine> {
        if self.current.determinant().abs() < 1e-12 {
            return None;
        }
        Some(self.current.inverse() * self.previous)
    }

    /// Content placement when the shutter closes.
    fn trail_end(&self) -> Option<Affine> {
        self.motion()
            .map(|m| lerp_affine(Affine::IDENTITY, m, SHUTTER))
            .filter(|t| t.determinant().abs() >= 1e-12)
    }
}

impl FilterPass for MotionBlurFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::MotionBlur
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        if self.is_identity() {
            return src;
        }
        let Some(end) = self.trail_end() else {
            return src;
        };
        let corners = [
            Point::new(src.x0, src.y0),
            Point::new(src.x1, src.y0),
            Point::new(src.x0, src.y1),
            Point::new(src.x1, src.y1),
        ]
        .map(|p| end * p);
        bbox(&corners).map_or(src, |trail| src.union(trail))
    }

    /// Bit-identical matrices mean no movement.
    fn is_identity(&self) -> bool {
        self.previous.as_coeffs() == self.current.as_coeffs() || self.trail_end().is_none()
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let b = args.input_bounds;
        let per_unit = args.uv_per_unit();
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let uv_from_content = Affine::translate((f64::from(origin[0]), f64::from(origin[1])))
            * Affine::scale_non_uniform(f64::from(per_unit[0]), f64::from(per_unit[1]))
            * Affine::translate((-b.x0, -b.y0));
        let trail = self
            .trail_end()
            .map(|end| uv_from_content * end.inverse() * uv_from_content.inverse())
            .unwrap_or(Affine::IDENTITY);
        block_bytes(&MotionBlurParams {
            trail: Mat3Std140::from_affine(trail),
            extra: [TAPS as f32, 0.0, 0.0, 0.0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_matrix_is_identity_and_keeps_bounds() {
        let m = Affine::translate((3.0, 4.0));
        let f = MotionBlurFilter::new(m, m);
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(f.is_identity());
        assert_eq!(f.filter_bounds(r), r);
    }

    #[test]
    fn translation_extends_bounds_toward_previous_position() {
        // layer moved 20 units right; content trails 10 units left over a half-open shutter
        let f = MotionBlurFilter::new(Affine::IDENTITY, Affine::translate((20.0, 0.0)));
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = f.filter_bounds(r);
        assert!((b.x0 + 10.0).abs() < 1e-9);
        assert_eq!((b.y0, b.x1, b.y1), (0.0, 10.0, 10.0));
    }

    #[test]
    fn degenerate_layer_matrix_disables_blur() {
        let f = MotionBlurFilter::new(Affine::IDENTITY, Affine::scale(0.0));
        assert!(f.is_identity());
    }
}
