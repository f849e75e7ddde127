//! Uniform block layout.
//!
//! Every block follows std140 rules, which coincide with WGSL's uniform address space for the types
//! used here:
//! - `f32`, `i32`, `u32` align to 4 bytes; `vec2<f32>` to 8; `vec3<f32>` and `vec4<f32>` to 16.
//! - `mat3x3<f32>` is stored as three columns, each padded to a `vec4` (48 bytes).
//! - Array elements and the block size round up to 16 bytes.
//!
//! Fixed-layout blocks are `#[repr(C)]` [`bytemuck::Pod`] structs built from `[f32; 4]` rows and
//! [`Mat3Std140`]. Variable-length blocks go through [`Std140Writer`].

use crate::{
    foundation::core::Affine,
    gpu::BindingSlot,
};

/// Shared linear clamp-to-edge sampler.
pub const SAMPLER_BINDING: u32 = 0;

/// The filter input.
pub const SOURCE_TEXTURE: BindingSlot = BindingSlot {
    name: "t_src",
    binding: 1,
};

/// A secondary input such as a displacement map.
pub const MAP_TEXTURE: BindingSlot = BindingSlot {
    name: "t_map",
    binding: 2,
};

/// The per-draw parameter block.
pub const PARAMS_BLOCK: BindingSlot = BindingSlot {
    name: "params",
    binding: 3,
};

/// Which uniform blocks and samplers a program type binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformBinding {
    pub blocks: &'static [BindingSlot],
    pub samplers: &'static [BindingSlot],
}

impl UniformBinding {
    /// Source texture plus one parameter block.
    pub const SOURCE_WITH_PARAMS: Self = Self {
        blocks: &[PARAMS_BLOCK],
        samplers: &[SOURCE_TEXTURE],
    };

    /// Source and map textures plus one parameter block.
    pub const SOURCE_AND_MAP_WITH_PARAMS: Self = Self {
        blocks: &[PARAMS_BLOCK],
        samplers: &[SOURCE_TEXTURE, MAP_TEXTURE],
    };
}

/// `mat3x3<f32>` in std140 layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Mat3Std140 {
    pub cols: [[f32; 4]; 3],
}

impl Mat3Std140 {
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    pub fn from_affine(m: Affine) -> Self {
        let [a, b, c, d, e, f] = m.as_coeffs();
        Self {
            cols: [
                [a as f32, b as f32, 0.0, 0.0],
                [c as f32, d as f32, 0.0, 0.0],
                [e as f32, f as f32, 1.0, 0.0],
            ],
        }
    }

    /// From a row-major 3x3.
    pub fn from_rows(m: [[f64; 3]; 3]) -> Self {
        let col = |c: usize| [m[0][c] as f32, m[1][c] as f32, m[2][c] as f32, 0.0];
        Self {
            cols: [col(0), col(1), col(2)],
        }
    }

    /// `M * (x, y, 1)`.
    pub fn transform(&self, p: [f32; 2]) -> [f32; 3] {
        let [c0, c1, c2] = self.cols;
        [
            c0[0] * p[0] + c1[0] * p[1] + c2[0],
            c0[1] * p[0] + c1[1] * p[1] + c2[1],
            c0[2] * p[0] + c1[2] * p[1] + c2[2],
        ]
    }
}

/// Incremental std140 block builder for blocks whose length depends on parameters.
#[derive(Debug, Default)]
pub struct Std140Writer {
    buf: Vec<u8>,
}

impl Std140Writer {
    pub fn new() -> Self {
        Self::default()
    }

    fn align(&mut self, to: usize) {
        let len = self.buf.len().next_multiple_of(to);
        self.buf.resize(len, 0);
    }

    fn put(&mut self, values: &[f32]) {
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.align(4);
        self.put(&[v]);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.align(4);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn vec2(&mut self, v: [f32; 2]) -> &mut Self {
        self.align(8);
        self.put(&v);
        self
    }

    pub fn vec4(&mut self, v: [f32; 4]) -> &mut Self {
        self.align(16);
        self.put(&v);
        self
    }

    pub fn mat3(&mut self, m: &Mat3Std140) -> &mut Self {
        self.align(16);
        for col in &m.cols {
            self.put(col);
        }
        self
    }

    /// `array<vec4<f32>, N>` with `values` padded by zero vectors up to `N`.
    pub fn vec4_array<const N: usize>(&mut self, values: &[[f32; 4]]) -> &mut Self {
        self.align(16);
        for i in 0..N {
            self.put(values.get(i).unwrap_or(&[0.0; 4]));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finished block, padded to a multiple of 16 bytes.
    pub fn finish(&mut self) -> Vec<u8> {
        self.align(16);
        std::mem::take(&mut self.buf)
    }
}

/// Buffer size for a block of `len` host bytes: rounded up to 16, never zero.
pub const fn std140_size(len: usize) -> usize {
    if len == 0 { 16 } else { len.next_multiple_of(16) }
}

/// Bytes of a fixed-layout block.
pub fn block_bytes<T: bytemuck::Pod>(value: &T) -> Vec<u8> {
    bytemuck::bytes_of(value).to_vec()
}

/// Compile-time check that a block struct has a std140-compatible size.
macro_rules! assert_block_size {
    ($ty:ty) => {
        const _: () = assert!(std::mem::size_of::<$ty>() % 16 == 0);
    };
}
pub(crate) use assert_block_size;

assert_block_size!(Mat3Std140);

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn mat3_is_three_padded_columns() {
        let m = Mat3Std140::from_affine(Affine::new([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let bytes = block_bytes(&m);
        assert_eq!(bytes.len(), 48);
        assert_eq!(
            floats(&bytes),
            vec![1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0, 5.0, 6.0, 1.0, 0.0]
        );
    }

    #[test]
    fn mat3_from_rows_matches_from_affine() {
        let m = Affine::new([2.0, 0.5, -1.0, 3.0, 7.0, 9.0]);
        let [a, b, c, d, e, f] = m.as_coeffs();
        let rows = [[a, c, e], [b, d, f], [0.0, 0.0, 1.0]];
        assert_eq!(Mat3Std140::from_rows(rows), Mat3Std140::from_affine(m));
        assert_eq!(Mat3Std140::from_affine(m).transform([1.0, 1.0]), [8.0, 12.5, 1.0]);
    }

    #[test]
    fn block_sizes_round_to_16() {
        assert_eq!(std140_size(0), 16);
        assert_eq!(std140_size(20), 32);
        assert_eq!(std140_size(48), 48);
    }

    #[test]
    fn writer_aligns_members() {
        let mut w = Std140Writer::new();
        w.f32(1.0).vec2([2.0, 3.0]).f32(4.0).vec4([5.0, 6.0, 7.0, 8.0]);
        let bytes = w.finish();
        // f32 @0, vec2 @8, f32 @16, vec4 @32
        assert_eq!(bytes.len(), 48);
        assert_eq!(
            floats(&bytes),
            vec![1.0, 0.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn writer_places_mat3_after_scalar_on_16_bytes() {
        let mut w = Std140Writer::new();
        w.f32(9.0).mat3(&Mat3Std140::IDENTITY);
        let bytes = w.finish();
        assert_eq!(bytes.len(), 16 + 48);
        assert_eq!(floats(&bytes)[4..8], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn writer_pads_arrays_and_block_size() {
        let mut w = Std140Writer::new();
        w.u32(2).vec4_array::<4>(&[[1.0; 4]]);
        let bytes = w.finish();
        assert_eq!(bytes.len(), 16 + 4 * 16);
        assert_eq!(floats(&bytes)[4..8], [1.0; 4]);
        assert_eq!(floats(&bytes)[8..], [0.0; 12]);
    }
}
