pub use kurbo::{Affine, Point, Rect, Vec2};

/// Layer-local frame number.
///
/// Frames may be negative when a layer starts after the composition origin.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Frame(pub i64);

impl Frame {
    /// The frame immediately before `self`.
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

/// Straight (non-premultiplied) 8-bit RGB color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };
    pub const WHITE: Self = Self {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Normalized `[r, g, b]` in `0.0..=1.0`.
    pub fn to_f32(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }
}

/// A rendered image as premultiplied RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha. Always `true` for frames produced by this crate.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Pixel at `(x, y)`, or transparent black when out of range.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Pixels with straight alpha, as image encoders expect them.
    pub fn to_straight_alpha(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if !self.premultiplied {
            return out;
        }
        for px in out.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_alpha_divides_out_coverage() {
        let f = FrameRGBA {
            width: 2,
            height: 1,
            data: vec![64, 0, 0, 128, 0, 0, 0, 0],
            premultiplied: true,
        };
        assert_eq!(f.to_straight_alpha(), vec![128, 0, 0, 128, 0, 0, 0, 0]);
    }

    #[test]
    fn frame_prev_saturates() {
        assert_eq!(Frame(3).prev(), Frame(2));
        assert_eq!(Frame(i64::MIN).prev(), Frame(i64::MIN));
    }

    #[test]
    fn frame_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Frame(7)).unwrap(), "7");
    }

    #[test]
    fn frame_pixel_out_of_range_is_transparent() {
        let f = FrameRGBA {
            width: 1,
            height: 1,
            data: vec![1, 2, 3, 4],
            premultiplied: true,
        };
        assert_eq!(f.pixel(0, 0), [1, 2, 3, 4]);
        assert_eq!(f.pixel(1, 0), [0; 4]);
    }
}
