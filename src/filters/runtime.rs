//! The single-draw filter unit and its draw procedure.

use crate::{
    context::FilterContext,
    filters::{
        blur::BlurPassFilter,
        bulge::BulgeFilter,
        corner_pin::CornerPinFilter,
        displacement_map::DisplacementMapFilter,
        glow::GlowFilter,
        layer_style::{
            drop_shadow::DropShadowFilter, gradient_overlay::GradientOverlayFilter,
            outer_glow::OuterGlowFilter, stroke::StrokeFilter,
        },
        levels::LevelsFilter,
        mosaic::MosaicFilter,
        motion_blur::MotionBlurFilter,
        motion_tile::MotionTileFilter,
        program::{FilterKind, MAX_VERTICES, ProgramDescriptor},
        radial_blur::RadialBlurFilter,
        shading::scale4,
        transform_3d::Transform3DFilter,
        uniforms::{PARAMS_BLOCK, UniformBinding, assert_block_size, block_bytes, std140_size},
    },
    foundation::{
        core::{Affine, Point, Rect, Vec2},
        error::{FxError, FxResult},
    },
    gpu::{BufferUsage, DrawCall, Fragment, ScissorRect, TextureId, Vertex, pixel_to_clip},
};

/// Pass-through textured quad. Every program shares this vertex stage.
pub const DEFAULT_VERTEX_SHADER: &str = r#"
struct VsIn {
    @location(0) position: vec4<f32>,
    @location(1) texcoord: vec2<f32>,
};

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs(in: VsIn) -> VsOut {
    var out: VsOut;
    out.position = in.position;
    out.uv = in.texcoord;
    return out;
}
"#;

const PASSTHROUGH_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    alpha: vec4<f32>,
    // input uv rect
    region: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    if (any(in.uv < params.region.xy) || any(in.uv > params.region.zw)) {
        return vec4<f32>(0.0);
    }
    return textureSampleLevel(t_src, s_linear, in.uv, 0.0) * params.alpha.x;
}
"#;

pub static PASSTHROUGH: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_passthrough",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: PASSTHROUGH_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: passthrough_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PassthroughParams {
    alpha: [f32; 4],
    region: [f32; 4],
}
assert_block_size!(PassthroughParams);

fn passthrough_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: PassthroughParams = frag.uniform(0);
    let [u, v] = frag.uv;
    if u < p.region[0] || u > p.region[2] || v < p.region[1] || v > p.region[3] {
        return [0.0; 4];
    }
    scale4(frag.sample(0, frag.uv), p.alpha[0])
}

/// The texture a filter reads, rendered at `scale` content pixels per texel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterSource {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub scale: Vec2,
}

/// Where a filter draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterTarget {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    /// Maps filter-output pixels to target pixels.
    pub matrix: Affine,
    /// Clear the target before the first draw.
    pub clear: bool,
    pub scissor: Option<ScissorRect>,
}

impl FilterTarget {
    /// Offscreen target covering the whole texture.
    pub fn offscreen(texture: TextureId, width: u32, height: u32) -> Self {
        Self {
            texture,
            width,
            height,
            matrix: Affine::IDENTITY,
            clear: true,
            scissor: None,
        }
    }
}

/// Geometry of one draw: the input and output rects in content space and the offset between them
/// in source pixels.
#[derive(Clone, Copy, Debug)]
pub struct PassArgs<'a> {
    pub source: &'a FilterSource,
    pub target: &'a FilterTarget,
    pub input_bounds: Rect,
    pub output_bounds: Rect,
    /// `(input.origin - output.origin) * scale`.
    pub offset: Vec2,
}

impl PassArgs<'_> {
    pub fn scale(&self) -> Vec2 {
        self.source.scale
    }

    pub fn source_size(&self) -> [f32; 2] {
        [self.source.width as f32, self.source.height as f32]
    }

    /// Output rect size in pixels.
    pub fn output_size(&self) -> Vec2 {
        let s = self.scale();
        Vec2::new(
            self.output_bounds.width() * s.x,
            self.output_bounds.height() * s.y,
        )
    }

    /// Content-space point to source texcoord.
    pub fn source_uv(&self, p: Point) -> [f32; 2] {
        let s = self.scale();
        [
            ((p.x - self.input_bounds.x0) * s.x / f64::from(self.source.width.max(1))) as f32,
            ((p.y - self.input_bounds.y0) * s.y / f64::from(self.source.height.max(1))) as f32,
        ]
    }

    /// Source texcoord span of one content-space unit, per axis.
    pub fn uv_per_unit(&self) -> [f32; 2] {
        let s = self.scale();
        [
            (s.x / f64::from(self.source.width.max(1))) as f32,
            (s.y / f64::from(self.source.height.max(1))) as f32,
        ]
    }

    pub fn output_px_to_clip(&self, p: Point) -> [f32; 2] {
        let t = self.target.matrix * p;
        pixel_to_clip(t.x, t.y, self.target.width, self.target.height)
    }

    pub fn output_px_to_source_uv(&self, p: Point) -> [f32; 2] {
        [
            ((p.x - self.offset.x) / f64::from(self.source.width.max(1))) as f32,
            ((p.y - self.offset.y) / f64::from(self.source.height.max(1))) as f32,
        ]
    }

    /// Content-space point to output pixels.
    pub fn content_to_output_px(&self, p: Point) -> Point {
        let s = self.scale();
        Point::new(
            (p.x - self.output_bounds.x0) * s.x,
            (p.y - self.output_bounds.y0) * s.y,
        )
    }
}

/// Output rect as a 4-vertex strip: texcoords follow the input through `offset`.
pub fn default_vertices(args: &PassArgs<'_>) -> Vec<Vertex> {
    let size = args.output_size();
    [
        Point::new(0.0, 0.0),
        Point::new(size.x, 0.0),
        Point::new(0.0, size.y),
        Point::new(size.x, size.y),
    ]
    .iter()
    .map(|&p| Vertex::new(args.output_px_to_clip(p), 1.0, args.output_px_to_source_uv(p)))
    .collect()
}

/// Behaviour of a single-draw filter. Only [`FilterPass::kind`] and [`FilterPass::uniforms`] are
/// required; the defaults describe a bounds-preserving full-quad draw.
pub trait FilterPass {
    fn kind(&self) -> FilterKind;

    /// The rect the filter's output occupies for input `src`. Pure.
    fn filter_bounds(&self, src: Rect) -> Rect {
        src
    }

    /// `true` when drawing would reproduce the input exactly.
    fn is_identity(&self) -> bool {
        false
    }

    /// How much the filter magnifies its input, per axis.
    fn max_scale_factor(&self, _content: Rect) -> Vec2 {
        Vec2::new(1.0, 1.0)
    }

    fn sample_count(&self) -> u32 {
        1
    }

    /// The parameter block for one draw.
    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8>;

    fn vertices(&self, args: &PassArgs<'_>) -> Vec<Vertex> {
        default_vertices(args)
    }

    /// Textures bound after the source, in sampler declaration order.
    fn extra_textures(&self) -> Vec<TextureId> {
        Vec::new()
    }
}

/// Copies the source, scaled by `alpha`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassthroughFilter {
    pub alpha: f32,
}

impl Default for PassthroughFilter {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl FilterPass for PassthroughFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Passthrough
    }

    fn is_identity(&self) -> bool {
        self.alpha == 1.0
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let b = args.input_bounds;
        let origin = args.source_uv(Point::new(b.x0, b.y0));
        let end = args.source_uv(Point::new(b.x1, b.y1));
        block_bytes(&PassthroughParams {
            alpha: [self.alpha.clamp(0.0, 1.0), 0.0, 0.0, 0.0],
            region: [origin[0], origin[1], end[0], end[1]],
        })
    }
}

/// Every single-draw filter, closed over the program kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeFilter {
    Passthrough(PassthroughFilter),
    Levels(LevelsFilter),
    Mosaic(MosaicFilter),
    BlurPass(BlurPassFilter),
    Glow(GlowFilter),
    RadialBlur(RadialBlurFilter),
    Bulge(BulgeFilter),
    CornerPin(CornerPinFilter),
    MotionTile(MotionTileFilter),
    DisplacementMap(DisplacementMapFilter),
    MotionBlur(MotionBlurFilter),
    Transform3D(Transform3DFilter),
    DropShadow(DropShadowFilter),
    OuterGlow(OuterGlowFilter),
    Stroke(StrokeFilter),
    GradientOverlay(GradientOverlayFilter),
}

macro_rules! dispatch {
    ($value:expr, $f:ident => $body:expr) => {
        match $value {
            RuntimeFilter::Passthrough($f) => $body,
            RuntimeFilter::Levels($f) => $body,
            RuntimeFilter::Mosaic($f) => $body,
            RuntimeFilter::BlurPass($f) => $body,
            RuntimeFilter::Glow($f) => $body,
            RuntimeFilter::RadialBlur($f) => $body,
            RuntimeFilter::Bulge($f) => $body,
            RuntimeFilter::CornerPin($f) => $body,
            RuntimeFilter::MotionTile($f) => $body,
            RuntimeFilter::DisplacementMap($f) => $body,
            RuntimeFilter::MotionBlur($f) => $body,
            RuntimeFilter::Transform3D($f) => $body,
            RuntimeFilter::DropShadow($f) => $body,
            RuntimeFilter::OuterGlow($f) => $body,
            RuntimeFilter::Stroke($f) => $body,
            RuntimeFilter::GradientOverlay($f) => $body,
        }
    };
}

impl FilterPass for RuntimeFilter {
    fn kind(&self) -> FilterKind {
        dispatch!(self, f => f.kind())
    }

    fn filter_bounds(&self, src: Rect) -> Rect {
        dispatch!(self, f => f.filter_bounds(src))
    }

    fn is_identity(&self) -> bool {
        dispatch!(self, f => f.is_identity())
    }

    fn max_scale_factor(&self, content: Rect) -> Vec2 {
        dispatch!(self, f => f.max_scale_factor(content))
    }

    fn sample_count(&self) -> u32 {
        dispatch!(self, f => f.sample_count())
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        dispatch!(self, f => f.uniforms(args))
    }

    fn vertices(&self, args: &PassArgs<'_>) -> Vec<Vertex> {
        dispatch!(self, f => f.vertices(args))
    }

    fn extra_textures(&self) -> Vec<TextureId> {
        dispatch!(self, f => f.extra_textures())
    }
}

/// Draw `filter` once: bind its cached program and inputs, upload uniforms and vertices, and issue
/// the strip with `ONE, ONE_MINUS_SRC_ALPHA` blending.
///
/// Fails when the program is unavailable, an input is missing, or the device reports an error
/// before or after the draw. Callers fall back to unfiltered content.
pub fn draw_pass(
    ctx: &mut FilterContext,
    filter: &impl FilterPass,
    args: &PassArgs<'_>,
) -> FxResult<()> {
    let kind = filter.kind();
    let descriptor = kind.descriptor();
    let label = descriptor.label;
    let program = ctx
        .program(kind)
        .ok_or_else(|| FxError::shader(format!("program '{label}' is unavailable")))?;

    let extra = filter.extra_textures();
    let samplers = descriptor.binding.samplers;
    if extra.len() + 1 != samplers.len() {
        return Err(FxError::validation(format!(
            "'{label}' binds {} textures but declares {} samplers",
            extra.len() + 1,
            samplers.len()
        )));
    }
    let textures: Vec<(u32, TextureId)> = std::iter::once(args.source.texture)
        .chain(extra)
        .zip(samplers)
        .map(|(tex, slot)| (slot.binding, tex))
        .collect();

    let vertices = filter.vertices(args);
    if vertices.len() < 3 || vertices.len() > MAX_VERTICES {
        return Err(FxError::validation(format!(
            "'{label}' produced {} vertices",
            vertices.len()
        )));
    }
    let block = filter.uniforms(args);

    let gpu = ctx.gpu_mut();
    for (_, tex) in &textures {
        if gpu.texture_desc(*tex).is_none() {
            return Err(FxError::validation(format!("'{label}' input {tex:?} is missing")));
        }
    }
    if gpu.texture_desc(args.target.texture).is_none() {
        return Err(FxError::validation(format!("'{label}' target is missing")));
    }
    if let Some(err) = gpu.check_error() {
        return Err(FxError::gpu(format!("device error before '{label}': {err}")));
    }

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let mapped = gpu.map_buffer(program.vertex_buffer)?;
    mapped[..vertex_bytes.len()].copy_from_slice(vertex_bytes);
    gpu.unmap_buffer(program.vertex_buffer)?;

    let uniform = gpu.create_buffer(BufferUsage::Uniform, std140_size(block.len()) as u64)?;
    let drawn = (|| {
        let mapped = gpu.map_buffer(uniform)?;
        mapped[..block.len()].copy_from_slice(&block);
        gpu.unmap_buffer(uniform)?;
        gpu.draw(&DrawCall {
            label,
            program: program.id,
            target: args.target.texture,
            clear: args.target.clear,
            vertex_buffer: program.vertex_buffer,
            vertex_count: vertices.len() as u32,
            uniforms: &[(PARAMS_BLOCK.binding, uniform)],
            textures: &textures,
            scissor: args.target.scissor,
        })
    })();
    gpu.release_buffer(uniform);
    drawn?;

    if let Some(err) = gpu.check_error() {
        return Err(FxError::gpu(format!("device error after '{label}': {err}")));
    }
    tracing::trace!(program = label, vertices = vertices.len(), "filter pass drawn");
    Ok(())
}
