#![forbid(unsafe_code)]
//! Per-layer effect and layer-style filter pipeline.
//!
//! A layer's effects, 3D projection, motion blur and layer styles are turned into a chain of
//! single-draw GPU filters each frame ([`render::FilterList`]) and run by
//! [`render::draw_with_filter`] through a shared [`FilterContext`].

pub mod context;
pub mod filters;
pub mod foundation;
pub mod gpu;
pub mod model;
pub mod render;
pub mod scene;

pub use context::{FilterContext, RenderSettings};
pub use filters::{FilterKind, LayerFilter, ProgramCache, RuntimeFilter};
pub use foundation::core::{Affine, Color, Frame, FrameRGBA, Rect, Vec2};
pub use foundation::error::{FxError, FxResult};
pub use gpu::{Gpu, GpuStats, soft::SoftGpu};
pub use model::{Effect, EffectKind, FilterModifier, Layer, LayerStyle, LayerType, Property, StyleKind};
pub use render::{
    Canvas, Content, FilterList, FilterOutcome, UnfilteredReason, draw_with_filter,
    measure_filter_bounds,
};
pub use scene::{LayerSource, Scene, SceneLayer, measure_scene, render_scene};
