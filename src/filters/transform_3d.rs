use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs, default_vertices},
        shading::sample_or_clear,
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::{
        core::{Point, Rect},
        math::{Matrix3D, bbox},
    },
    gpu::{Fragment, Vertex},
};

const TRANSFORM_3D_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // input uv rect
    region: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    return textureSampleLevel(t_src, s_linear, clamp(in.uv, params.region.xy, params.region.zw), 0.0);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_transform_3d",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: TRANSFORM_3D_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: transform_3d_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Transform3DParams {
    region: [f32; 4],
}
assert_block_size!(Transform3DParams);

fn transform_3d_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: Transform3DParams = frag.uniform(0);
    let uv = [
        frag.uv[0].clamp(p.region[0], p.region[2].max(p.region[0])),
        frag.uv[1].clamp(p.region[1], p.region[3].max(p.region[1])),
    ];
    sample_or_clear(frag, 0, uv)
}

/// Projects the layer through a 4x4 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3DFilter {
    pub matrix: Matrix3D,
}

impl Transform3DFilter {
    pub fn new(matrix: Matrix3D) -> Self {
        Self { matrix }
    }

    /// Corners of `r` in strip order, projected, with their homogeneous weight. `None` when a
    /// corner falls behind the viewer.
    fn project(&self, r: Rect) -> Option<[(Point, f64); 4]> {
        let corners = [
            Point::new(r.x0, r.y0),
            Point::new(r.x1, r.y0),
            Point::new(r.x0, r.y1),
            Point::new(r.x1, r.y1),
        ];
        let mut out = [(Point::ZERO, 1.0); 4];
        for (slot, c) in out.iter_mut().zip(corners) {
            let [x, y, _, w] = self.matrix.map_point(c);
            if w <= 1e-6 {
                return None;
            }
            *slot = (Point::new(x / w, y / w), w);
        }
        Some(out)
    }
}

impl FilterPass for Transform3DFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Transform3D
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        self.project(src)
            .and_then(|corners| bbox(&corners.map(|(p, _)| p)))
            .unwrap_or(src)
    }

    fn is_identity(&self) -> bool {
        self.matrix == Matrix3D::IDENTITY
    }

    /// Projected edges are antialiased with multisampling.
    fn sample_count(&self) -> u32 {
        4
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        block_bytes(&Transform3DParams {
            region: [origin[0], origin[1], end[0], end[1]],
        })
    }

    fn vertices(&self, args: &PassArgs<'_>) -> Vec<Vertex> {
        let b = args.input_bounds;
        let Some(projected) = self.project(b) else {
            return default_vertices(args);
        };
        let texcoords = [
            args.source_uv(Point::new(b.x0, b.y0)),
            args.source_uv(Point::new(b.x1, b.y0)),
            args.source_uv(Point::new(b.x0, b.y1)),
            args.source_uv(Point::new(b.x1, b.y1)),
        ];
        projected
            .iter()
            .zip(texcoords)
            .map(|((p, w), uv)| {
                let px = args.content_to_output_px(*p);
                Vertex::new(args.output_px_to_clip(px), *w as f32, uv)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_matrix_keeps_bounds() {
        let f = Transform3DFilter::new(Matrix3D::IDENTITY);
        let r = Rect::new(0.0, 0.0, 40.0, 20.0);
        assert!(f.is_identity());
        assert_eq!(f.filter_bounds(r), r);
    }

    #[test]
    fn translation_moves_bounds() {
        let f = Transform3DFilter::new(Matrix3D::translate(5.0, -2.0, 0.0));
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(f.filter_bounds(r), Rect::new(5.0, -2.0, 15.0, 8.0));
    }

    #[test]
    fn perspective_tilt_shrinks_far_edge() {
        let m = Matrix3D::perspective(100.0).mul(&Matrix3D::rotate_y(0.5));
        let f = Transform3DFilter::new(m);
        let r = Rect::new(0.0, -10.0, 20.0, 10.0);
        let projected = f.project(r).unwrap();
        let near = (projected[2].0.y - projected[0].0.y).abs();
        let far = (projected[3].0.y - projected[1].0.y).abs();
        assert!((near - far).abs() > 1e-6);
    }
}
