use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::fract,
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Frame, Point, Rect, Vec2},
    gpu::Fragment,
    model::effect::MotionTileEffect,
};

const MOTION_TILE_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // tile center uv, tile size uv
    tile: vec4<f32>,
    // input uv rect
    region: vec4<f32>,
    // phase (turns), horizontal shift, mirror edges
    flags: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn wrap(v: f32, index: f32) -> f32 {
    let f = fract(v);
    if (params.flags.z > 0.5 && abs(index % 2.0) > 0.5) {
        return 1.0 - f;
    }
    return f;
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    var local = (in.uv - params.tile.xy) / params.tile.zw + 0.5;
    if (params.flags.y > 0.5) {
        if (abs(floor(local.y) % 2.0) > 0.5) {
            local.x = local.x + params.flags.x;
        }
    } else {
        if (abs(floor(local.x) % 2.0) > 0.5) {
            local.y = local.y + params.flags.x;
        }
    }
    let f = vec2<f32>(wrap(local.x, floor(local.x)), wrap(local.y, floor(local.y)));
    let uv = params.region.xy + f * (params.region.zw - params.region.xy);
    return textureSampleLevel(t_src, s_linear, uv, 0.0);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_motion_tile",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: MOTION_TILE_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: motion_tile_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MotionTileParams {
    tile: [f32; 4],
    region: [f32; 4],
    flags: [f32; 4],
}
assert_block_size!(MotionTileParams);

fn odd(v: f32) -> bool {
    (v.floor() % 2.0).abs() > 0.5
}

fn wrap(v: f32, mirror: bool) -> f32 {
    let f = fract(v);
    if mirror && odd(v) { 1.0 - f } else { f }
}

/// Tile-grid coordinate of `uv` after phase shifting, folded into the unit square.
fn tile_coord(uv: [f32; 2], p: &MotionTileParams) -> [f32; 2] {
    let mut local = [
        (uv[0] - p.tile[0]) / p.tile[2] + 0.5,
        (uv[1] - p.tile[1]) / p.tile[3] + 0.5,
    ];
    if p.flags[1] > 0.5 {
        if odd(local[1]) {
            local[0] += p.flags[0];
        }
    } else if odd(local[0]) {
        local[1] += p.flags[0];
    }
    let mirror = p.flags[2] > 0.5;
    [wrap(local[0], mirror), wrap(local[1], mirror)]
}

fn motion_tile_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: MotionTileParams = frag.uniform(0);
    let f = tile_coord(frag.uv, &p);
    let r = p.region;
    frag.sample(0, [r[0] + f[0] * (r[2] - r[0]), r[1] + f[1] * (r[3] - r[1])])
}

/// Repeats the input as tiles over a resized output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionTileFilter {
    pub tile_center: Point,
    /// Percent of the input size.
    pub tile_width: f32,
    pub tile_height: f32,
    pub output_width: f32,
    pub output_height: f32,
    pub mirror_edges: bool,
    /// Degrees.
    pub phase: f32,
    pub horizontal_phase_shift: bool,
}

impl MotionTileFilter {
    pub fn from_effect(effect: &MotionTileEffect, frame: Frame) -> Self {
        Self {
            tile_center: effect.tile_center.value_at(frame),
            tile_width: effect.tile_width.value_at(frame).max(1.0),
            tile_height: effect.tile_height.value_at(frame).max(1.0),
            output_width: effect.output_width.value_at(frame).max(0.0),
            output_height: effect.output_height.value_at(frame).max(0.0),
            mirror_edges: effect.mirror_edges.value_at(frame),
            phase: effect.phase.value_at(frame),
            horizontal_phase_shift: effect.horizontal_phase_shift.value_at(frame),
        }
    }
}

impl FilterPass for MotionTileFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::MotionTile
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        let w = src.width() * f64::from(self.output_width) / 100.0;
        let h = src.height() * f64::from(self.output_height) / 100.0;
        Rect::from_center_size(src.center(), (w, h))
    }

    fn is_identity(&self) -> bool {
        self.tile_width == 100.0
            && self.tile_height == 100.0
            && self.output_width == 100.0
            && self.output_height == 100.0
            && self.phase.rem_euclid(360.0) == 0.0
    }

    fn max_scale_factor(&self, _content: Rect) -> Vec2 {
        Vec2::new(
            f64::from(self.tile_width) / 100.0,
            f64::from(self.tile_height) / 100.0,
        )
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let b = args.input_bounds;
        let per_unit = args.uv_per_unit();
        let center = args.source_uv(self.tile_center);
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        let tile = [
            (b.width() as f32 * self.tile_width / 100.0 * per_unit[0]).max(1e-6),
            (b.height() as f32 * self.tile_height / 100.0 * per_unit[1]).max(1e-6),
        ];
        block_bytes(&MotionTileParams {
            tile: [center[0], center[1], tile[0], tile[1]],
            region: [origin[0], origin[1], end[0], end[1]],
            flags: [
                self.phase / 360.0,
                if self.horizontal_phase_shift { 1.0 } else { 0.0 },
                if self.mirror_edges { 1.0 } else { 0.0 },
                0.0,
            ],
        })
    }
}
