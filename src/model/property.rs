use crate::foundation::{
    core::{Affine, Color, Frame, Point, Vec2},
    math::Matrix3D,
};

/// Values that can be blended between keyframes.
pub trait Interpolate: Clone {
    fn interpolate(&self, other: &Self, t: f64) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t as f32
    }
}

impl Interpolate for f64 {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for u16 {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        let v = f64::from(*self) + (f64::from(*other) - f64::from(*self)) * t;
        v.round().clamp(0.0, f64::from(u16::MAX)) as u16
    }
}

impl Interpolate for Point {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self.lerp(*other, t)
    }
}

impl Interpolate for Vec2 {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self.lerp(*other, t)
    }
}

impl Interpolate for Affine {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        let a = self.as_coeffs();
        let b = other.as_coeffs();
        let mut out = [0.0; 6];
        for i in 0..6 {
            out[i] = a[i] + (b[i] - a[i]) * t;
        }
        Affine::new(out)
    }
}

impl Interpolate for Matrix3D {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        let mut out = [0.0; 16];
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.0[i] + (other.0[i] - self.0[i]) * t;
        }
        Matrix3D(out)
    }
}

impl Interpolate for Color {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        let ch = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
        Color::new(
            ch(self.r, other.r),
            ch(self.g, other.g),
            ch(self.b, other.b),
        )
    }
}

/// Discrete values hold until the next keyframe.
macro_rules! impl_hold_interpolate {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Interpolate for $ty {
                fn interpolate(&self, other: &Self, t: f64) -> Self {
                    if t >= 1.0 { other.clone() } else { self.clone() }
                }
            }
        )*
    };
}
pub(crate) use impl_hold_interpolate;

impl_hold_interpolate!(bool);

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe<T> {
    pub frame: Frame,
    pub value: T,
    /// Keep `value` until the next keyframe instead of interpolating.
    #[serde(default)]
    pub hold: bool,
}

/// An animatable parameter. Serialized either as a bare value or as `{ "keyframes": [...] }`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Property<T> {
    Constant(T),
    Animated { keyframes: Vec<Keyframe<T>> },
}

impl<T> From<T> for Property<T> {
    fn from(value: T) -> Self {
        Property::Constant(value)
    }
}

impl<T: Interpolate> Property<T> {
    /// Value at `frame`, clamped to the first and last keyframes.
    ///
    /// An animated property with no keyframes is malformed; `fallback` is returned for it.
    pub fn value_at_or(&self, frame: Frame, fallback: T) -> T {
        match self {
            Property::Constant(v) => v.clone(),
            Property::Animated { keyframes } => {
                let Some(first) = keyframes.first() else {
                    return fallback;
                };
                if frame <= first.frame {
                    return first.value.clone();
                }
                for pair in keyframes.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    if frame < b.frame {
                        if a.hold || b.frame <= a.frame {
                            return a.value.clone();
                        }
                        let t = (frame.0 - a.frame.0) as f64 / (b.frame.0 - a.frame.0) as f64;
                        return a.value.interpolate(&b.value, t);
                    }
                }
                keyframes
                    .last()
                    .map(|k| k.value.clone())
                    .unwrap_or(fallback)
            }
        }
    }

    /// `true` when the property can change over time.
    pub fn is_animated(&self) -> bool {
        matches!(self, Property::Animated { keyframes } if keyframes.len() > 1)
    }
}

impl<T: Interpolate + Default> Property<T> {
    pub fn value_at(&self, frame: Frame) -> T {
        self.value_at_or(frame, T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf<T>(frame: i64, value: T) -> Keyframe<T> {
        Keyframe {
            frame: Frame(frame),
            value,
            hold: false,
        }
    }

    #[test]
    fn constant_is_constant() {
        let p = Property::Constant(3.0f32);
        assert_eq!(p.value_at(Frame(-10)), 3.0);
        assert!(!p.is_animated());
    }

    #[test]
    fn keyframes_interpolate_and_clamp() {
        let p = Property::Animated {
            keyframes: vec![kf(0, 0.0f32), kf(10, 10.0)],
        };
        assert_eq!(p.value_at(Frame(-5)), 0.0);
        assert_eq!(p.value_at(Frame(5)), 5.0);
        assert_eq!(p.value_at(Frame(20)), 10.0);
        assert!(p.is_animated());
    }

    #[test]
    fn hold_keyframes_step() {
        let mut a = kf(0, 1.0f32);
        a.hold = true;
        let p = Property::Animated {
            keyframes: vec![a, kf(10, 2.0)],
        };
        assert_eq!(p.value_at(Frame(9)), 1.0);
        assert_eq!(p.value_at(Frame(10)), 2.0);
    }

    #[test]
    fn empty_keyframes_use_fallback() {
        let p: Property<f32> = Property::Animated { keyframes: vec![] };
        assert_eq!(p.value_at_or(Frame(0), 7.0), 7.0);
    }

    #[test]
    fn deserializes_bare_values_and_keyframes() {
        let p: Property<f32> = serde_json::from_str("4.5").unwrap();
        assert_eq!(p, Property::Constant(4.5));
        let p: Property<f32> =
            serde_json::from_str(r#"{"keyframes":[{"frame":0,"value":1},{"frame":2,"value":3}]}"#)
                .unwrap();
        assert_eq!(p.value_at(Frame(1)), 2.0);
        let p: Property<Point> = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        assert_eq!(p.value_at(Frame(0)), Point::new(1.0, 2.0));
    }

    #[test]
    fn affine_interpolates_coefficients() {
        let a = Affine::translate((0.0, 0.0));
        let b = Affine::translate((10.0, 20.0));
        let m = a.interpolate(&b, 0.5);
        assert_eq!(m, Affine::translate((5.0, 10.0)));
    }
}
