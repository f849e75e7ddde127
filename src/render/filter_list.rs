use crate::{
    filters::effect_filter::LayerFilter,
    foundation::{
        core::{Affine, Rect, Vec2},
        math::{inverse_axis_scales, invert, snap_scale},
    },
    model::{
        effect::{EffectKind, EffectType},
        layer::{FilterModifier, LayerType},
        style::StyleKind,
    },
};

/// One visible effect and the filter built for it this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectNode {
    pub effect_type: EffectType,
    pub process_visible_area_only: bool,
    pub filter: LayerFilter,
}

/// Per-layer, per-frame snapshot of everything the renderer needs.
///
/// Built fresh for every frame and read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterList {
    pub layer_type: LayerType,
    /// Content-to-parent transform at the content frame.
    pub layer_matrix: Affine,
    /// Declared layer bounds, content space.
    pub layer_bounds: Rect,
    /// Upper bound on the working scale. Infinite when unbounded.
    pub scale_factor_limit: f64,
    /// Every effect on the layer, visible or not, reads only visible content.
    pub process_visible_area_only: bool,
    /// Content is rasterized at parent size and filtered in parent space.
    pub use_parent_size_input: bool,
    pub effect_scale: Vec2,
    pub layer_style_scale: Vec2,
    pub effects: Vec<EffectNode>,
    pub transform_3d: Option<LayerFilter>,
    pub motion_blur: Option<LayerFilter>,
    pub layer_styles: Option<LayerFilter>,
    /// Some filter pulls transparent pixels in from beyond its input edge, so bounds may not be
    /// trimmed to the clip before the chain runs.
    pub skip_clip_bounds: bool,
}

impl FilterList {
    /// Snapshot `modifier`'s layer at its frame.
    pub fn make(modifier: &FilterModifier<'_>) -> Self {
        let layer = modifier.layer;
        let layer_frame = modifier.layer_frame;
        let content_frame = modifier.content_frame();
        let layer_matrix = layer.matrix_at(content_frame);
        let matrix_3d = layer.matrix_3d_at(content_frame);

        let scale_factor_limit = if layer.layer_type == LayerType::Image && matrix_3d.is_none() {
            1.0
        } else {
            f64::INFINITY
        };

        let process_visible_area_only = layer.effects.iter().all(|e| e.process_visible_area_only());
        let need_parent_size_input = !layer.effects.is_empty()
            && matches!(layer.layer_type, LayerType::Shape | LayerType::Text);
        let use_parent_size_input = !process_visible_area_only && need_parent_size_input;

        let unit = Vec2::new(1.0, 1.0);
        let mut effect_scale = unit;
        let mut layer_style_scale = unit;
        if !use_parent_size_input {
            layer_style_scale = inverse_axis_scales(layer_matrix);
            if need_parent_size_input {
                effect_scale = layer_style_scale;
            }
        }

        let mut skip_clip_bounds = false;
        let effects: Vec<EffectNode> = layer
            .effects
            .iter()
            .filter(|e| e.visible_at(layer_frame))
            .filter_map(|e| {
                if let EffectKind::FastBlur(blur) = &e.kind
                    && !blur.repeat_edge_pixels.value_at(layer_frame)
                {
                    skip_clip_bounds = true;
                }
                let filter = LayerFilter::from_effect(e, layer_frame, effect_scale)?;
                Some(EffectNode {
                    effect_type: e.effect_type(),
                    process_visible_area_only: e.process_visible_area_only(),
                    filter,
                })
            })
            .collect();

        let styles: Vec<_> = layer
            .layer_styles
            .iter()
            .filter(|s| s.visible_at(layer_frame))
            .cloned()
            .collect();
        if styles
            .iter()
            .any(|s| matches!(s.kind, StyleKind::DropShadow(_)))
        {
            skip_clip_bounds = true;
        }
        let layer_styles = LayerFilter::from_styles(&styles, layer_frame, layer_style_scale)
            .filter(|f| !f.is_identity());

        let transform_3d = matrix_3d.map(LayerFilter::transform_3d);
        let motion_blur = if layer.motion_blur && transform_3d.is_none() {
            let previous = layer.matrix_at(content_frame.prev());
            let filter = if previous.as_coeffs() == layer_matrix.as_coeffs() {
                None
            } else if use_parent_size_input {
                // the chain runs in parent space: content moved by previous * current^-1
                invert(layer_matrix)
                    .map(|inverse| LayerFilter::motion_blur(previous * inverse, Affine::IDENTITY))
            } else {
                Some(LayerFilter::motion_blur(previous, layer_matrix))
            };
            let filter = filter.filter(|f| !f.is_identity());
            if filter.is_none() {
                tracing::debug!(layer = %layer.name, "transform unchanged, motion blur skipped");
            }
            filter
        } else {
            None
        };

        Self {
            layer_type: layer.layer_type,
            layer_matrix,
            layer_bounds: layer.bounds(),
            scale_factor_limit,
            process_visible_area_only,
            use_parent_size_input,
            effect_scale,
            layer_style_scale,
            effects,
            transform_3d,
            motion_blur,
            layer_styles,
            skip_clip_bounds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
            && self.transform_3d.is_none()
            && self.motion_blur.is_none()
            && self.layer_styles.is_none()
    }

    /// Index of the last effect that reads beyond the visible area, if any. Bounds are not tested
    /// against the clip before it.
    pub fn clip_index(&self) -> Option<usize> {
        self.effects
            .iter()
            .rposition(|node| !node.process_visible_area_only)
    }

    /// Working scale for rasterizing `content_bounds` under `canvas_scale`: the canvas scale times
    /// each effect's magnification, clamped by the layer limit and `max_texture_size`, then
    /// snapped to `1 / scale_grid`.
    pub fn content_scale(
        &self,
        content_bounds: Rect,
        canvas_scale: f64,
        max_texture_size: u32,
        scale_grid: u32,
    ) -> f64 {
        let magnification: f64 = self
            .effects
            .iter()
            .map(|node| {
                let f = node.filter.max_scale_factor(content_bounds);
                f.x.max(f.y)
            })
            .product();
        let mut scale = (canvas_scale * magnification).min(self.scale_factor_limit);
        let longest = content_bounds.width().max(content_bounds.height());
        if longest > 0.0 {
            scale = scale.min(f64::from(max_texture_size) / longest);
        }
        snap_scale(scale, scale_grid)
    }

    /// Every filter in draw order: effects, 3D projection, motion blur, styles.
    pub fn filters(&self) -> impl Iterator<Item = &LayerFilter> {
        self.effects
            .iter()
            .map(|node| &node.filter)
            .chain(self.transform_3d.as_ref())
            .chain(self.motion_blur.as_ref())
            .chain(self.layer_styles.as_ref())
    }
}
