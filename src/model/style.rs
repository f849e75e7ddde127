use crate::{
    foundation::core::{Color, Frame},
    model::property::{Interpolate, Property, impl_hold_interpolate},
};

fn default_true() -> bool {
    true
}

/// A layer style. Styles are drawn together with the layer content in a single pass.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerStyle {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: StyleKind,
}

/// Whether a style draws under or over the layer content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StylePosition {
    Below,
    Above,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StyleKind {
    DropShadow(DropShadowStyle),
    OuterGlow(OuterGlowStyle),
    Stroke(StrokeStyle),
    GradientOverlay(GradientOverlayStyle),
}

impl LayerStyle {
    pub fn new(kind: StyleKind) -> Self {
        Self {
            enabled: true,
            kind,
        }
    }

    pub fn position(&self) -> StylePosition {
        match self.kind {
            StyleKind::DropShadow(_) | StyleKind::OuterGlow(_) => StylePosition::Below,
            StyleKind::Stroke(_) | StyleKind::GradientOverlay(_) => StylePosition::Above,
        }
    }

    pub fn visible_at(&self, frame: Frame) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.kind {
            StyleKind::DropShadow(s) => s.opacity.value_at(frame) > 0.0,
            StyleKind::OuterGlow(s) => s.opacity.value_at(frame) > 0.0,
            StyleKind::Stroke(s) => s.opacity.value_at(frame) > 0.0 && s.size.value_at(frame) > 0.0,
            StyleKind::GradientOverlay(s) => {
                s.opacity.value_at(frame) > 0.0 && !s.colors.is_empty()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DropShadowStyle {
    pub color: Property<Color>,
    /// `0..=1`.
    pub opacity: Property<f32>,
    /// Light angle in degrees; the shadow falls opposite it.
    pub angle: Property<f32>,
    pub distance: Property<f32>,
    pub size: Property<f32>,
    /// `0..=1`.
    pub spread: Property<f32>,
}

impl Default for DropShadowStyle {
    fn default() -> Self {
        Self {
            color: Property::Constant(Color::BLACK),
            opacity: Property::Constant(0.75),
            angle: Property::Constant(120.0),
            distance: Property::Constant(5.0),
            size: Property::Constant(5.0),
            spread: Property::Constant(0.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OuterGlowStyle {
    pub color: Property<Color>,
    pub opacity: Property<f32>,
    pub size: Property<f32>,
    pub spread: Property<f32>,
}

impl Default for OuterGlowStyle {
    fn default() -> Self {
        Self {
            color: Property::Constant(Color::new(255, 255, 190)),
            opacity: Property::Constant(0.75),
            size: Property::Constant(5.0),
            spread: Property::Constant(0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokePosition {
    #[default]
    Outside,
    Inside,
    Center,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StrokeStyle {
    pub color: Property<Color>,
    pub size: Property<f32>,
    pub opacity: Property<f32>,
    pub position: Property<StrokePosition>,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Property::Constant(Color::new(255, 0, 0)),
            size: Property::Constant(3.0),
            opacity: Property::Constant(1.0),
            position: Property::Constant(StrokePosition::Outside),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientStyle {
    #[default]
    Linear,
    Radial,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColorStop {
    /// `0..=1` along the gradient.
    pub position: f32,
    pub color: Color,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AlphaStop {
    pub position: f32,
    pub opacity: f32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GradientOverlayStyle {
    pub opacity: Property<f32>,
    pub colors: Vec<ColorStop>,
    /// Empty means fully opaque.
    pub alphas: Vec<AlphaStop>,
    pub angle: Property<f32>,
    pub style: Property<GradientStyle>,
    pub reverse: Property<bool>,
    /// Percent.
    pub scale: Property<f32>,
}

impl Default for GradientOverlayStyle {
    fn default() -> Self {
        Self {
            opacity: Property::Constant(1.0),
            colors: vec![
                ColorStop {
                    position: 0.0,
                    color: Color::BLACK,
                },
                ColorStop {
                    position: 1.0,
                    color: Color::WHITE,
                },
            ],
            alphas: Vec::new(),
            angle: Property::Constant(90.0),
            style: Property::Constant(GradientStyle::Linear),
            reverse: Property::Constant(false),
            scale: Property::Constant(100.0),
        }
    }
}

impl_hold_interpolate!(StrokePosition, GradientStyle);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_split_below_and_above() {
        let shadow = LayerStyle::new(StyleKind::DropShadow(DropShadowStyle::default()));
        let stroke = LayerStyle::new(StyleKind::Stroke(StrokeStyle::default()));
        assert_eq!(shadow.position(), StylePosition::Below);
        assert_eq!(stroke.position(), StylePosition::Above);
    }

    #[test]
    fn deserializes_style_with_defaults() {
        let s: LayerStyle =
            serde_json::from_str(r#"{"type":"drop_shadow","distance":10,"color":{"r":255,"g":0,"b":0}}"#)
                .unwrap();
        let StyleKind::DropShadow(d) = &s.kind else {
            panic!("wrong kind");
        };
        assert_eq!(d.distance.value_at(Frame(0)), 10.0);
        assert_eq!(d.angle.value_at(Frame(0)), 120.0);
        assert!(s.visible_at(Frame(0)));
    }

    #[test]
    fn gradient_without_colors_is_hidden() {
        let mut g = GradientOverlayStyle::default();
        g.colors.clear();
        assert!(!LayerStyle::new(StyleKind::GradientOverlay(g)).visible_at(Frame(0)));
    }
}
