use crate::{
    filters::{
        layer_style::{alpha_gather_wgsl, gathered_alpha, spread_alpha},
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Color, Frame, Point, Rect, Vec2},
    gpu::Fragment,
    model::style::DropShadowStyle,
};

const DROP_SHADOW_FRAGMENT_SHADER: &str = concat!(
    r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // rgb, opacity
    color: vec4<f32>,
    // offset uv, blur radius uv
    shape: vec4<f32>,
    // spread
    spread: vec4<f32>,
    region: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;
"#,
    alpha_gather_wgsl!(),
    r#"
@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let a = spread_alpha(gathered_alpha(in.uv - params.shape.xy, params.shape.zw), params.spread.x);
    let k = a * params.color.a;
    return vec4<f32>(params.color.rgb * k, k);
}
"#
);

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_drop_shadow",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: DROP_SHADOW_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: drop_shadow_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DropShadowParams {
    color: [f32; 4],
    shape: [f32; 4],
    spread: [f32; 4],
    region: [f32; 4],
}
assert_block_size!(DropShadowParams);

fn drop_shadow_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: DropShadowParams = frag.uniform(0);
    let uv = [frag.uv[0] - p.shape[0], frag.uv[1] - p.shape[1]];
    let a = spread_alpha(
        gathered_alpha(frag, uv, [p.shape[2], p.shape[3]], p.region),
        p.spread[0],
    );
    let k = a * p.color[3];
    [p.color[0] * k, p.color[1] * k, p.color[2] * k, k]
}

/// Shadow of the layer alpha, offset along the light angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropShadowFilter {
    pub color: Color,
    pub opacity: f32,
    /// Degrees.
    pub angle: f32,
    pub distance: f32,
    pub size: f32,
    /// `0..=1` as authored.
    pub spread: f32,
    pub style_scale: Vec2,
}

impl DropShadowFilter {
    pub fn from_style(style: &DropShadowStyle, frame: Frame, style_scale: Vec2) -> Self {
        Self {
            color: style.color.value_at(frame),
            opacity: style.opacity.value_at(frame).clamp(0.0, 1.0),
            angle: style.angle.value_at(frame),
            distance: style.distance.value_at(frame).max(0.0),
            size: style.size.value_at(frame).max(0.0),
            spread: style.spread.value_at(frame).clamp(0.0, 1.0),
            style_scale,
        }
    }

    /// Authored spread damped below full choke.
    pub fn effective_spread(&self) -> f32 {
        if self.spread == 1.0 {
            1.0
        } else {
            self.spread * 0.8
        }
    }

    /// Shadow displacement in content units.
    pub fn offset(&self) -> Vec2 {
        if self.distance <= 0.0 {
            return Vec2::ZERO;
        }
        let radians = f64::from(self.angle - 180.0).to_radians();
        let d = f64::from(self.distance);
        Vec2::new(
            radians.cos() * d * self.style_scale.x,
            -radians.sin() * d * self.style_scale.y,
        )
    }

    /// Blur extent in content units, per axis.
    pub fn extent(&self) -> Vec2 {
        let s = f64::from(self.size);
        Vec2::new(s * self.style_scale.x, s * self.style_scale.y)
    }
}

impl FilterPass for DropShadowFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::DropShadow
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        let e = self.extent();
        src.union(src.inflate(e.x, e.y) + self.offset())
    }

    fn is_identity(&self) -> bool {
        self.opacity <= 0.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let per_unit = args.uv_per_unit();
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        let offset = self.offset();
        let extent = self.extent();
        let [r, g, bl] = self.color.to_f32();
        block_bytes(&DropShadowParams {
            color: [r, g, bl, self.opacity],
            shape: [
                offset.x as f32 * per_unit[0],
                offset.y as f32 * per_unit[1],
                extent.x as f32 * per_unit[0],
                extent.y as f32 * per_unit[1],
            ],
            spread: [self.effective_spread(), 0.0, 0.0, 0.0],
            region: [origin[0], origin[1], end[0], end[1]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::Property;

    fn shadow(angle: f32, distance: f32, size: f32, scale: f64) -> DropShadowFilter {
        let style = DropShadowStyle {
            angle: Property::Constant(angle),
            distance: Property::Constant(distance),
            size: Property::Constant(size),
            ..DropShadowStyle::default()
        };
        DropShadowFilter::from_style(&style, Frame(0), Vec2::new(scale, scale))
    }

    #[test]
    fn angle_180_casts_to_the_right() {
        let f = shadow(180.0, 10.0, 0.0, 1.0);
        let o = f.offset();
        assert!((o.x - 10.0).abs() < 1e-9 && o.y.abs() < 1e-9);
        assert_eq!(
            f.filter_bounds(Rect::new(0.0, 0.0, 10.0, 10.0)),
            Rect::new(0.0, 0.0, 20.0, 10.0)
        );
    }

    #[test]
    fn style_scale_shrinks_distance_and_size() {
        let full = shadow(90.0, 8.0, 4.0, 1.0);
        let half = shadow(90.0, 8.0, 4.0, 0.5);
        assert!((half.offset().y - full.offset().y / 2.0).abs() < 1e-9);
        assert_eq!(half.extent(), full.extent() / 2.0);
    }

    #[test]
    fn spread_is_damped_unless_full() {
        let mut f = shadow(0.0, 0.0, 0.0, 1.0);
        f.spread = 0.5;
        assert_eq!(f.effective_spread(), 0.4);
        f.spread = 1.0;
        assert_eq!(f.effective_spread(), 1.0);
    }
}
