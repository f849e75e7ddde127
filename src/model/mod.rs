//! Layer, effect and style descriptions read by the filter pipeline.
//!
//! Every animatable parameter is a [`property::Property`]; the pipeline only evaluates them, it never
//! mutates the model.

pub mod effect;
pub mod layer;
pub mod property;
pub mod style;

pub use effect::{Effect, EffectKind, EffectType};
pub use layer::{FilterModifier, Layer, LayerType};
pub use property::{Interpolate, Keyframe, Property};
pub use style::{LayerStyle, StyleKind, StylePosition};
