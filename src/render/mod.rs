//! Canvas, filter lists and the renderer that runs a layer's filter chain.

pub mod canvas;
pub mod filter_list;
pub mod filter_renderer;
pub mod texture_pool;

pub use canvas::{Canvas, Content, Image, Picture, PictureRecorder};
pub use filter_list::{EffectNode, FilterList};
pub use filter_renderer::{FilterOutcome, UnfilteredReason, draw_with_filter, measure_filter_bounds};
pub use texture_pool::{TexturePool, TexturePoolOpts, TexturePoolStats};
