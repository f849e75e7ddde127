use crate::{
    filters::{
        program::{FilterKind, ProgramDescriptor},
        runtime::{DEFAULT_VERTEX_SHADER, FilterPass, PassArgs},
        shading::{add4, mix4, scale4},
        uniforms::{UniformBinding, assert_block_size, block_bytes},
    },
    foundation::core::{Frame, Point},
    gpu::Fragment,
    model::effect::MosaicEffect,
};

/// Samples per axis when averaging a block.
const AVERAGE_TAPS: u32 = 4;

const MOSAIC_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var s_linear: sampler;
@group(0) @binding(1) var t_src: texture_2d<f32>;

struct Params {
    // blocks x, blocks y, sharp colors, opacity
    blocks: vec4<f32>,
    // uv origin and uv size of the block grid
    region: vec4<f32>,
};
@group(0) @binding(3) var<uniform> params: Params;

fn cell_axis(uv: f32, origin: f32, size: f32, blocks: f32) -> vec2<f32> {
    if (blocks <= 1.0) {
        return vec2<f32>(uv, 0.0);
    }
    let cell = size / blocks;
    let start = origin + floor((uv - origin) / cell) * cell;
    return vec2<f32>(start, cell);
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let src = textureSampleLevel(t_src, s_linear, in.uv, 0.0);
    let cx = cell_axis(in.uv.x, params.region.x, params.region.z, params.blocks.x);
    let cy = cell_axis(in.uv.y, params.region.y, params.region.w, params.blocks.y);
    var color = vec4<f32>(0.0);
    if (params.blocks.z > 0.5) {
        color = textureSampleLevel(t_src, s_linear, vec2<f32>(cx.x + cx.y * 0.5, cy.x + cy.y * 0.5), 0.0);
    } else {
        for (var j = 0u; j < 4u; j = j + 1u) {
            for (var i = 0u; i < 4u; i = i + 1u) {
                let t = (vec2<f32>(f32(i), f32(j)) + 0.5) / 4.0;
                color = color + textureSampleLevel(t_src, s_linear, vec2<f32>(cx.x + cx.y * t.x, cy.x + cy.y * t.y), 0.0);
            }
        }
        color = color / 16.0;
    }
    return mix(src, color, params.blocks.w);
}
"#;

pub static DESCRIPTOR: ProgramDescriptor = ProgramDescriptor {
    label: "layerfx_mosaic",
    vertex_source: DEFAULT_VERTEX_SHADER,
    fragment_source: MOSAIC_FRAGMENT_SHADER,
    binding: UniformBinding::SOURCE_WITH_PARAMS,
    kernel: mosaic_kernel,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MosaicParams {
    blocks: [f32; 4],
    region: [f32; 4],
}
assert_block_size!(MosaicParams);

/// Start and size of the block containing `uv` on one axis; an unquantized axis has size zero.
fn cell_axis(uv: f32, origin: f32, size: f32, blocks: f32) -> (f32, f32) {
    if blocks <= 1.0 {
        return (uv, 0.0);
    }
    let cell = size / blocks;
    (origin + ((uv - origin) / cell).floor() * cell, cell)
}

fn mosaic_kernel(frag: &Fragment<'_>) -> [f32; 4] {
    let p: MosaicParams = frag.uniform(0);
    let src = frag.sample(0, frag.uv);
    let (x0, w) = cell_axis(frag.uv[0], p.region[0], p.region[2], p.blocks[0]);
    let (y0, h) = cell_axis(frag.uv[1], p.region[1], p.region[3], p.blocks[1]);
    let color = if p.blocks[2] > 0.5 {
        frag.sample(0, [x0 + w * 0.5, y0 + h * 0.5])
    } else {
        let mut acc = [0.0; 4];
        for j in 0..AVERAGE_TAPS {
            for i in 0..AVERAGE_TAPS {
                let tx = (i as f32 + 0.5) / AVERAGE_TAPS as f32;
                let ty = (j as f32 + 0.5) / AVERAGE_TAPS as f32;
                acc = add4(acc, frag.sample(0, [x0 + w * tx, y0 + h * ty]));
            }
        }
        scale4(acc, 1.0 / (AVERAGE_TAPS * AVERAGE_TAPS) as f32)
    };
    mix4(src, color, p.blocks[3])
}

/// Quantizes the input into a grid of flat blocks laid over the input bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MosaicFilter {
    pub horizontal_blocks: u16,
    pub vertical_blocks: u16,
    /// Use the block center instead of the block average.
    pub sharp_colors: bool,
    pub opacity: f32,
}

impl MosaicFilter {
    pub fn from_effect(effect: &MosaicEffect, frame: Frame, opacity: f32) -> Self {
        Self {
            horizontal_blocks: effect.horizontal_blocks.value_at_or(frame, 10).max(1),
            vertical_blocks: effect.vertical_blocks.value_at_or(frame, 10).max(1),
            sharp_colors: effect.sharp_colors.value_at(frame),
            opacity,
        }
    }
}

impl FilterPass for MosaicFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Mosaic
    }

    /// A single block on both axes covers the whole image.
    fn is_identity(&self) -> bool {
        self.opacity <= 0.0 || (self.horizontal_blocks <= 1 && self.vertical_blocks <= 1)
    }

    fn uniforms(&self, args: &PassArgs<'_>) -> Vec<u8> {
        let bounds = args.input_bounds;
        let origin = args.source_uv(Point::new(bounds.x0, bounds.y0));
        let end = args.source_uv(Point::new(bounds.x1, bounds.y1));
        block_bytes(&MosaicParams {
            blocks: [
                f32::from(self.horizontal_blocks),
                f32::from(self.vertical_blocks),
                if self.sharp_colors { 1.0 } else { 0.0 },
                self.opacity,
            ],
            region: [origin[0], origin[1], end[0] - origin[0], end[1] - origin[1]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::Property;

    #[test]
    fn one_by_one_is_identity() {
        let effect = MosaicEffect {
            horizontal_blocks: Property::Constant(1),
            vertical_blocks: Property::Constant(1),
            sharp_colors: Property::Constant(false),
        };
        assert!(MosaicFilter::from_effect(&effect, Frame(0), 1.0).is_identity());
        assert!(!MosaicFilter::from_effect(&MosaicEffect::default(), Frame(0), 1.0).is_identity());
    }

    #[test]
    fn zero_blocks_clamp_to_one() {
        let effect = MosaicEffect {
            horizontal_blocks: Property::Constant(0),
            vertical_blocks: Property::Constant(0),
            sharp_colors: Property::Constant(true),
        };
        let f = MosaicFilter::from_effect(&effect, Frame(0), 1.0);
        assert_eq!((f.horizontal_blocks, f.vertical_blocks), (1, 1));
    }

    #[test]
    fn cells_partition_the_region() {
        assert_eq!(cell_axis(0.3, 0.0, 1.0, 4.0), (0.25, 0.25));
        assert_eq!(cell_axis(0.3, 0.0, 1.0, 1.0), (0.3, 0.0));
        let (start, size) = cell_axis(0.99, 0.0, 1.0, 2.0);
        assert_eq!((start, size), (0.5, 0.5));
    }
}
