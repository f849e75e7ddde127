use crate::foundation::core::{Affine, Point, Rect, Vec2};

/// Round a rect outward to integer pixel edges.
pub fn round_out(r: Rect) -> Rect {
    Rect::new(r.x0.floor(), r.y0.floor(), r.x1.ceil(), r.y1.ceil())
}

/// `true` when the rect has no area.
pub fn is_empty(r: Rect) -> bool {
    !(r.width() > 0.0 && r.height() > 0.0)
}

/// Intersection of `a` and `b`, or `None` when they do not overlap.
pub fn intersect(a: Rect, b: Rect) -> Option<Rect> {
    let r = a.intersect(b);
    if is_empty(r) { None } else { Some(r) }
}

/// Per-axis scale of an affine: the lengths of its transformed unit vectors.
pub fn axis_scales(m: Affine) -> Vec2 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    Vec2::new(a.hypot(b), c.hypot(d))
}

/// Largest singular value of the linear part of `m`.
pub fn max_scale(m: Affine) -> f64 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    let t = a * a + b * b + c * c + d * d;
    let det = a * d - b * c;
    let disc = (t * t - 4.0 * det * det).max(0.0);
    ((t + disc.sqrt()) * 0.5).sqrt()
}

/// Per-axis scale that cancels the scale of `m` (zero on degenerate axes).
pub fn inverse_axis_scales(m: Affine) -> Vec2 {
    let s = axis_scales(m);
    let inv = |v: f64| if v == 0.0 { 0.0 } else { 1.0 / v };
    Vec2::new(inv(s.x), inv(s.y))
}

/// Snap `scale` to the nearest multiple of `1 / grid`, never below one grid step.
pub fn snap_scale(scale: f64, grid: u32) -> f64 {
    let grid = f64::from(grid.max(1));
    ((scale * grid).round() / grid).max(1.0 / grid)
}

/// Inverse of `m`, or `None` when it is singular.
pub fn invert(m: Affine) -> Option<Affine> {
    let det = m.determinant();
    (det.is_finite() && det.abs() > 1e-12).then(|| m.inverse())
}

/// `true` when the linear part of `m` has rotation or skew.
pub fn has_skew(m: Affine) -> bool {
    let [_, b, c, _, _, _] = m.as_coeffs();
    b != 0.0 || c != 0.0
}

/// Bounding box of a list of points, or `None` when empty.
pub fn bbox(points: &[Point]) -> Option<Rect> {
    let (first, rest) = points.split_first()?;
    Some(
        rest.iter()
            .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p)),
    )
}

/// Column-major 4x4 matrix used by 3D layer projection.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Matrix3D(pub [f64; 16]);

impl Default for Matrix3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix3D {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    fn at(&self, row: usize, col: usize) -> f64 {
        self.0[col * 4 + row]
    }

    pub fn mul(&self, rhs: &Self) -> Self {
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| self.at(row, k) * rhs.at(k, col)).sum();
            }
        }
        Self(out)
    }

    pub fn translate(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = x;
        m.0[13] = y;
        m.0[14] = z;
        m
    }

    pub fn rotate_y(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        let mut m = Self::IDENTITY;
        m.0[0] = c;
        m.0[2] = -s;
        m.0[8] = s;
        m.0[10] = c;
        m
    }

    pub fn rotate_x(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        let mut m = Self::IDENTITY;
        m.0[5] = c;
        m.0[6] = s;
        m.0[9] = -s;
        m.0[10] = c;
        m
    }

    /// Perspective divide helper: `w' = 1 - z / distance`, so points at `z = 0` keep their size.
    pub fn perspective(distance: f64) -> Self {
        let mut m = Self::IDENTITY;
        if distance > 0.0 {
            m.0[11] = -1.0 / distance;
        }
        m
    }

    /// Apply to `(x, y, 0, 1)` and return the homogeneous result `[x, y, z, w]`.
    pub fn map_point(&self, p: Point) -> [f64; 4] {
        let v = [p.x, p.y, 0.0, 1.0];
        let mut out = [0.0; 4];
        for (row, o) in out.iter_mut().enumerate() {
            *o = (0..4).map(|k| self.at(row, k) * v[k]).sum();
        }
        out
    }
}

/// Projective map sending the unit square corners `(0,0) (1,0) (0,1) (1,1)` to `quad` in the same
/// order. Returned as a row-major 3x3, or `None` when the quad is degenerate.
pub fn square_to_quad(quad: [Point; 4]) -> Option<[[f64; 3]; 3]> {
    let [p0, p1, p2, p3] = quad;
    let sx = p0.x - p1.x - p2.x + p3.x;
    let sy = p0.y - p1.y - p2.y + p3.y;
    let (g, h) = if sx.abs() < 1e-12 && sy.abs() < 1e-12 {
        (0.0, 0.0)
    } else {
        let dx1 = p1.x - p3.x;
        let dx2 = p2.x - p3.x;
        let dy1 = p1.y - p3.y;
        let dy2 = p2.y - p3.y;
        let det = dx1 * dy2 - dx2 * dy1;
        if det.abs() < 1e-12 {
            return None;
        }
        ((sx * dy2 - dx2 * sy) / det, (dx1 * sy - sx * dy1) / det)
    };
    let a = p1.x - p0.x + g * p1.x;
    let b = p2.x - p0.x + h * p2.x;
    let d = p1.y - p0.y + g * p1.y;
    let e = p2.y - p0.y + h * p2.y;
    Some([[a, b, p0.x], [d, e, p0.y], [g, h, 1.0]])
}

/// Homogeneous weight of each corner of `quad` for projective texturing of a unit-square texture.
///
/// Drawing the quad with per-vertex `(x*q, y*q, q)` and interpolating texcoords perspective-correctly
/// reproduces [`square_to_quad`].
pub fn quad_corner_weights(quad: [Point; 4]) -> Option<[f64; 4]> {
    let m = square_to_quad(quad)?;
    let w = |u: f64, v: f64| m[2][0] * u + m[2][1] * v + m[2][2];
    let ws = [w(0.0, 0.0), w(1.0, 0.0), w(0.0, 1.0), w(1.0, 1.0)];
    if ws.iter().any(|w| *w <= 1e-9) {
        return None;
    }
    Some(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_out_expands_to_integers() {
        let r = round_out(Rect::new(0.2, -1.5, 3.1, 4.0));
        assert_eq!(r, Rect::new(0.0, -2.0, 4.0, 4.0));
    }

    #[test]
    fn max_scale_of_rotation_is_one() {
        let m = Affine::rotate(0.7);
        assert!((max_scale(m) - 1.0).abs() < 1e-9);
        let m = Affine::scale_non_uniform(2.0, 3.0);
        assert!((max_scale(m) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn inverse_axis_scales_cancels_scale() {
        let s = inverse_axis_scales(Affine::scale_non_uniform(2.0, 4.0));
        assert_eq!(s, Vec2::new(0.5, 0.25));
        let s = inverse_axis_scales(Affine::scale_non_uniform(0.0, 1.0));
        assert_eq!(s, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn snap_scale_uses_twentieths() {
        assert!((snap_scale(1.01, 20) - 1.0).abs() < 1e-12);
        assert!((snap_scale(1.04, 20) - 1.05).abs() < 1e-12);
        assert!((snap_scale(0.0, 20) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn square_to_quad_maps_corners() {
        let quad = [
            Point::new(10.0, 10.0),
            Point::new(50.0, 0.0),
            Point::new(0.0, 40.0),
            Point::new(60.0, 60.0),
        ];
        let m = square_to_quad(quad).unwrap();
        let map = |u: f64, v: f64| {
            let w = m[2][0] * u + m[2][1] * v + m[2][2];
            Point::new(
                (m[0][0] * u + m[0][1] * v + m[0][2]) / w,
                (m[1][0] * u + m[1][1] * v + m[1][2]) / w,
            )
        };
        for (uv, expected) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
            .iter()
            .zip(quad)
        {
            let p = map(uv.0, uv.1);
            assert!((p - expected).hypot() < 1e-9, "{p:?} != {expected:?}");
        }
    }

    #[test]
    fn parallelogram_has_unit_weights() {
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
        ];
        let ws = quad_corner_weights(quad).unwrap();
        assert!(ws.iter().all(|w| (w - 1.0).abs() < 1e-12));
    }

    #[test]
    fn matrix3d_perspective_shrinks_far_points() {
        let m = Matrix3D::perspective(100.0).mul(&Matrix3D::translate(0.0, 0.0, -100.0));
        let [x, _, _, w] = m.map_point(Point::new(10.0, 0.0));
        assert!((x / w - 5.0).abs() < 1e-9);
    }
}
