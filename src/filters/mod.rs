//! Filter programs and the per-effect dispatch.
//!
//! Every single-draw filter lives in its own module as a parameter struct, a WGSL fragment stage,
//! a matching CPU kernel and a [`runtime::FilterPass`] impl. Multi-draw filters (gaussian blur,
//! layer styles) compose those passes.

pub mod blur;
pub mod bulge;
pub mod corner_pin;
pub mod displacement_map;
pub mod effect_filter;
pub mod glow;
pub mod layer_style;
pub mod levels;
pub mod mosaic;
pub mod motion_blur;
pub mod motion_tile;
pub mod program;
pub mod radial_blur;
pub mod runtime;
pub mod shading;
pub mod transform_3d;
pub mod uniforms;

pub use effect_filter::LayerFilter;
pub use program::{FilterKind, Program, ProgramCache};
pub use runtime::{FilterPass, FilterSource, FilterTarget, PassArgs, RuntimeFilter};
