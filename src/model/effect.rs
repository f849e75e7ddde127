use std::sync::Arc;

use crate::{
    foundation::core::{Frame, FrameRGBA, Point},
    model::property::{Interpolate, Property, impl_hold_interpolate},
};

fn default_true() -> bool {
    true
}

fn full_opacity() -> Property<f32> {
    Property::Constant(1.0)
}

/// One effect attached to a layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Effect {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Blend between the effect input (`0`) and its result (`1`).
    #[serde(default = "full_opacity")]
    pub opacity: Property<f32>,
    #[serde(flatten)]
    pub kind: EffectKind,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            enabled: true,
            opacity: full_opacity(),
            kind,
        }
    }

    pub fn effect_type(&self) -> EffectType {
        match &self.kind {
            EffectKind::LevelsIndividual(_) => EffectType::LevelsIndividual,
            EffectKind::Mosaic(_) => EffectType::Mosaic,
            EffectKind::FastBlur(_) => EffectType::FastBlur,
            EffectKind::Glow(_) => EffectType::Glow,
            EffectKind::RadialBlur(_) => EffectType::RadialBlur,
            EffectKind::DisplacementMap(_) => EffectType::DisplacementMap,
            EffectKind::Bulge(_) => EffectType::Bulge,
            EffectKind::CornerPin(_) => EffectType::CornerPin,
            EffectKind::MotionTile(_) => EffectType::MotionTile,
        }
    }

    /// `true` when the effect only reads pixels inside the visible content.
    pub fn process_visible_area_only(&self) -> bool {
        !matches!(
            self.kind,
            EffectKind::Bulge(_) | EffectKind::CornerPin(_) | EffectKind::MotionTile(_)
        )
    }

    pub fn effect_opacity(&self, frame: Frame) -> f32 {
        self.opacity.value_at_or(frame, 1.0).clamp(0.0, 1.0)
    }

    pub fn visible_at(&self, frame: Frame) -> bool {
        if !self.enabled || self.effect_opacity(frame) <= 0.0 {
            return false;
        }
        match &self.kind {
            EffectKind::FastBlur(e) => e.blurriness.value_at(frame) > 0.0,
            EffectKind::Glow(e) => e.radius.value_at(frame) > 0.0 && e.intensity.value_at(frame) > 0.0,
            EffectKind::RadialBlur(e) => e.amount.value_at(frame) != 0.0,
            EffectKind::DisplacementMap(e) => {
                e.map.is_some()
                    && (e.max_horizontal.value_at(frame) != 0.0
                        || e.max_vertical.value_at(frame) != 0.0)
            }
            EffectKind::LevelsIndividual(_)
            | EffectKind::Mosaic(_)
            | EffectKind::Bulge(_)
            | EffectKind::CornerPin(_)
            | EffectKind::MotionTile(_) => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectType {
    LevelsIndividual,
    Mosaic,
    FastBlur,
    Glow,
    RadialBlur,
    DisplacementMap,
    Bulge,
    CornerPin,
    MotionTile,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    LevelsIndividual(LevelsEffect),
    Mosaic(MosaicEffect),
    FastBlur(FastBlurEffect),
    Glow(GlowEffect),
    RadialBlur(RadialBlurEffect),
    DisplacementMap(DisplacementMapEffect),
    Bulge(BulgeEffect),
    CornerPin(CornerPinEffect),
    MotionTile(MotionTileEffect),
}

/// One channel of a levels adjustment, on the `0..=255` scale.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LevelsChannel {
    pub input_black: Property<f32>,
    pub input_white: Property<f32>,
    pub gamma: Property<f32>,
    pub output_black: Property<f32>,
    pub output_white: Property<f32>,
}

impl Default for LevelsChannel {
    fn default() -> Self {
        Self {
            input_black: Property::Constant(0.0),
            input_white: Property::Constant(255.0),
            gamma: Property::Constant(1.0),
            output_black: Property::Constant(0.0),
            output_white: Property::Constant(255.0),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LevelsEffect {
    pub master: LevelsChannel,
    pub red: LevelsChannel,
    pub green: LevelsChannel,
    pub blue: LevelsChannel,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MosaicEffect {
    pub horizontal_blocks: Property<u16>,
    pub vertical_blocks: Property<u16>,
    pub sharp_colors: Property<bool>,
}

impl Default for MosaicEffect {
    fn default() -> Self {
        Self {
            horizontal_blocks: Property::Constant(10),
            vertical_blocks: Property::Constant(10),
            sharp_colors: Property::Constant(false),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurDimensions {
    #[default]
    All,
    Horizontal,
    Vertical,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FastBlurEffect {
    pub blurriness: Property<f32>,
    pub dimensions: Property<BlurDimensions>,
    pub repeat_edge_pixels: Property<bool>,
}

impl Default for FastBlurEffect {
    fn default() -> Self {
        Self {
            blurriness: Property::Constant(0.0),
            dimensions: Property::Constant(BlurDimensions::All),
            repeat_edge_pixels: Property::Constant(false),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GlowEffect {
    /// Percent, `0..=100`.
    pub threshold: Property<f32>,
    pub radius: Property<f32>,
    pub intensity: Property<f32>,
}

impl Default for GlowEffect {
    fn default() -> Self {
        Self {
            threshold: Property::Constant(60.0),
            radius: Property::Constant(10.0),
            intensity: Property::Constant(1.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadialBlurMode {
    #[default]
    Spin,
    Zoom,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadialBlurAntialias {
    #[default]
    Low,
    High,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RadialBlurEffect {
    pub amount: Property<f32>,
    pub center: Property<Point>,
    pub mode: Property<RadialBlurMode>,
    pub antialias: Property<RadialBlurAntialias>,
}

impl Default for RadialBlurEffect {
    fn default() -> Self {
        Self {
            amount: Property::Constant(10.0),
            center: Property::Constant(Point::ZERO),
            mode: Property::Constant(RadialBlurMode::Spin),
            antialias: Property::Constant(RadialBlurAntialias::Low),
        }
    }
}

/// Which map channel drives one displacement axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementMapSource {
    #[default]
    Red,
    Green,
    Blue,
    Alpha,
    Luminance,
    Hue,
    Lightness,
    Saturation,
    Full,
    Half,
    Off,
}

impl DisplacementMapSource {
    pub fn index(self) -> u32 {
        self as u32
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementMapBehavior {
    #[default]
    CenterMap,
    StretchMapToFit,
    TileMap,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DisplacementMapEffect {
    /// Asset name of the map image; resolved into [`DisplacementMapEffect::map`] by the loader.
    pub map_asset: Option<String>,
    #[serde(skip)]
    pub map: Option<Arc<FrameRGBA>>,
    pub use_for_horizontal: Property<DisplacementMapSource>,
    pub max_horizontal: Property<f32>,
    pub use_for_vertical: Property<DisplacementMapSource>,
    pub max_vertical: Property<f32>,
    pub map_behavior: Property<DisplacementMapBehavior>,
    pub wrap_pixels_around: Property<bool>,
    pub expand_output: Property<bool>,
}

impl Default for DisplacementMapEffect {
    fn default() -> Self {
        Self {
            map_asset: None,
            map: None,
            use_for_horizontal: Property::Constant(DisplacementMapSource::Red),
            max_horizontal: Property::Constant(5.0),
            use_for_vertical: Property::Constant(DisplacementMapSource::Green),
            max_vertical: Property::Constant(5.0),
            map_behavior: Property::Constant(DisplacementMapBehavior::CenterMap),
            wrap_pixels_around: Property::Constant(false),
            expand_output: Property::Constant(true),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BulgeEffect {
    pub horizontal_radius: Property<f32>,
    pub vertical_radius: Property<f32>,
    pub center: Property<Point>,
    pub height: Property<f32>,
    pub taper_radius: Property<f32>,
    pub pinning: Property<bool>,
}

impl Default for BulgeEffect {
    fn default() -> Self {
        Self {
            horizontal_radius: Property::Constant(50.0),
            vertical_radius: Property::Constant(50.0),
            center: Property::Constant(Point::ZERO),
            height: Property::Constant(1.0),
            taper_radius: Property::Constant(0.0),
            pinning: Property::Constant(false),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CornerPinEffect {
    pub upper_left: Property<Point>,
    pub upper_right: Property<Point>,
    pub lower_left: Property<Point>,
    pub lower_right: Property<Point>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MotionTileEffect {
    pub tile_center: Property<Point>,
    /// Percent of the layer width.
    pub tile_width: Property<f32>,
    pub tile_height: Property<f32>,
    pub output_width: Property<f32>,
    pub output_height: Property<f32>,
    pub mirror_edges: Property<bool>,
    /// Degrees.
    pub phase: Property<f32>,
    pub horizontal_phase_shift: Property<bool>,
}

impl Default for MotionTileEffect {
    fn default() -> Self {
        Self {
            tile_center: Property::Constant(Point::ZERO),
            tile_width: Property::Constant(100.0),
            tile_height: Property::Constant(100.0),
            output_width: Property::Constant(100.0),
            output_height: Property::Constant(100.0),
            mirror_edges: Property::Constant(false),
            phase: Property::Constant(0.0),
            horizontal_phase_shift: Property::Constant(false),
        }
    }
}

impl_hold_interpolate!(
    BlurDimensions,
    RadialBlurMode,
    RadialBlurAntialias,
    DisplacementMapSource,
    DisplacementMapBehavior,
);
