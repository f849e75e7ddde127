use crate::{
    foundation::{
        core::{Affine, Frame, Rect},
        math::Matrix3D,
    },
    model::{effect::Effect, property::Property, style::LayerStyle},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    Solid,
    Text,
    Shape,
    #[default]
    Image,
    PreCompose,
}

fn identity() -> Property<Affine> {
    Property::Constant(Affine::IDENTITY)
}

/// The parts of a layer the filter pipeline reads.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub layer_type: LayerType,
    pub width: f64,
    pub height: f64,
    /// Composition frame at which the layer's content starts.
    #[serde(default)]
    pub start_time: Frame,
    /// Layer-to-parent transform, evaluated in content frames.
    #[serde(default = "identity")]
    pub transform: Property<Affine>,
    /// Present on 3D layers: projects content into the parent plane.
    #[serde(default)]
    pub transform_3d: Option<Property<Matrix3D>>,
    #[serde(default)]
    pub motion_blur: bool,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub layer_styles: Vec<LayerStyle>,
}

impl Layer {
    pub fn new(layer_type: LayerType, width: f64, height: f64) -> Self {
        Self {
            name: String::new(),
            layer_type,
            width,
            height,
            start_time: Frame(0),
            transform: identity(),
            transform_3d: None,
            motion_blur: false,
            effects: Vec::new(),
            layer_styles: Vec::new(),
        }
    }

    /// Declared content bounds.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width.max(0.0), self.height.max(0.0))
    }

    /// Layer-local frame for composition frame `frame`.
    pub fn content_frame(&self, frame: Frame) -> Frame {
        Frame(frame.0.saturating_sub(self.start_time.0))
    }

    pub fn matrix_at(&self, content_frame: Frame) -> Affine {
        self.transform.value_at_or(content_frame, Affine::IDENTITY)
    }

    pub fn matrix_3d_at(&self, content_frame: Frame) -> Option<Matrix3D> {
        self.transform_3d
            .as_ref()
            .map(|m| m.value_at_or(content_frame, Matrix3D::IDENTITY))
    }
}

/// The layer and frame a filter list is built for.
#[derive(Clone, Copy, Debug)]
pub struct FilterModifier<'a> {
    pub layer: &'a Layer,
    /// Composition frame.
    pub layer_frame: Frame,
}

impl<'a> FilterModifier<'a> {
    pub fn new(layer: &'a Layer, layer_frame: Frame) -> Self {
        Self { layer, layer_frame }
    }

    /// Frame at which the layer's properties are evaluated.
    pub fn content_frame(&self) -> Frame {
        self.layer.content_frame(self.layer_frame)
    }
}
