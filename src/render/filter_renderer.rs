//! Per-layer orchestration: bounds bookkeeping, working scale, buffer ping-pong and final
//! composite.
//!
//! Filters run in a fixed order: effects in list order, then the 3D projection, then motion blur,
//! then layer styles. Content is rasterized once at a working scale and every filter reads the
//! previous one's output. Failures never reach the caller: the layer falls back to its
//! unfiltered content.

use crate::{
    context::FilterContext,
    filters::{
        blur::offset_between,
        effect_filter::LayerFilter,
        runtime::{FilterSource, FilterTarget},
    },
    foundation::{
        core::{Affine, Rect, Vec2},
        error::{FxError, FxResult},
        math::{has_skew, intersect, invert, max_scale, round_out},
    },
    gpu::TextureId,
    model::layer::FilterModifier,
    render::{
        canvas::{Canvas, Content, Image, Picture, PictureRecorder},
        filter_list::FilterList,
    },
};

/// Why a layer was drawn without its filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnfilteredReason {
    /// Nothing to apply this frame.
    NoFilters,
    /// Every remaining filter reproduces its input.
    Identity,
    /// The filtered output cannot reach the clip.
    ClippedOut,
    /// The canvas has no device target, or its matrix cannot be inverted.
    NoTarget,
    /// A program, allocation or draw failed.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOutcome {
    Filtered,
    Unfiltered(UnfilteredReason),
}

/// One filter of the chain and the rect, in filter space, its output covers.
#[derive(Clone, Copy, Debug)]
struct FilterNode<'a> {
    filter: &'a LayerFilter,
    bounds: Rect,
}

fn contains(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}

/// The rect the content occupies before any filter, in filter space.
fn content_bounds(list: &FilterList, content: &dyn Content) -> Rect {
    if list.process_visible_area_only {
        round_out(content.bounds())
    } else {
        list.layer_bounds
    }
}

/// Grow `bounds` through every filter of `list`, unclipped.
fn transform_filter_bounds(bounds: Rect, list: &FilterList) -> Rect {
    list.filters()
        .fold(bounds, |b, f| round_out(f.filter_bounds(b)))
}

/// The canvas clip in filter space. `None` when the canvas is unclipped.
fn clip_bounds(canvas: &Canvas, list: &FilterList) -> Option<Rect> {
    let clip = canvas.device_clip()?;
    let mut matrix = canvas.matrix();
    if list.use_parent_size_input {
        let Some(inverse) = invert(list.layer_matrix) else {
            return Some(Rect::ZERO);
        };
        matrix = matrix * inverse;
    }
    Some(match invert(matrix) {
        Some(inverse) => inverse.transform_rect_bbox(clip),
        None => Rect::ZERO,
    })
}

fn clip_to(bounds: Rect, clip: Option<Rect>) -> Option<Rect> {
    match clip {
        Some(c) => intersect(bounds, c),
        None => Some(bounds),
    }
}

/// Filter nodes for `list` and the content bounds to rasterize. `None` when the output cannot
/// reach the clip. Identity filters that leave the bounds unchanged are left out.
fn make_filter_nodes(
    list: &FilterList,
    content_bounds: Rect,
    clip: Option<Rect>,
) -> Option<(Rect, Vec<FilterNode<'_>>)> {
    let clip_index = list.clip_index();
    let mut clip = clip;
    // Motion blur samples pixels outside the clip.
    if let (Some(c), Some(motion_blur)) = (clip, list.motion_blur.as_ref()) {
        clip = Some(round_out(motion_blur.filter_bounds(c)));
    }

    let mut content_bounds = content_bounds;
    if !list.skip_clip_bounds
        && clip_index.is_none()
        && let Some(c) = clip
    {
        content_bounds = intersect(content_bounds, c)?;
    }

    let mut nodes = Vec::new();
    let mut bounds = content_bounds;
    for (idx, node) in list.effects.iter().enumerate() {
        let mut next = round_out(node.filter.filter_bounds(bounds));
        if clip_index.is_none_or(|ci| idx >= ci) {
            next = clip_to(next, clip)?;
        }
        if !(node.filter.is_identity() && next == bounds) {
            nodes.push(FilterNode {
                filter: &node.filter,
                bounds: next,
            });
        }
        bounds = next;
    }
    for filter in [&list.transform_3d, &list.motion_blur, &list.layer_styles]
        .into_iter()
        .flatten()
    {
        let next = clip_to(round_out(filter.filter_bounds(bounds)), clip)?;
        if !(filter.is_identity() && next == bounds) {
            nodes.push(FilterNode {
                filter,
                bounds: next,
            });
        }
        bounds = next;
    }
    Some((content_bounds, nodes))
}

/// Draw every node, ping-ponging through pooled buffers; the last node draws into `target`.
fn apply_filters(
    ctx: &mut FilterContext,
    nodes: &[FilterNode<'_>],
    content_bounds: Rect,
    source: FilterSource,
    target: &FilterTarget,
) -> FxResult<()> {
    let scale = source.scale;
    let msaa_samples = ctx.settings().msaa_samples;
    let mut current = source;
    let mut last_bounds = content_bounds;
    let mut held: Option<TextureId> = None;
    let result = (|| {
        let Some((last, leading)) = nodes.split_last() else {
            return Ok(());
        };
        for node in leading {
            let width = (node.bounds.width() * scale.x).ceil().max(1.0) as u32;
            let height = (node.bounds.height() * scale.y).ceil().max(1.0) as u32;
            let samples = if node.filter.needs_msaa() {
                msaa_samples
            } else {
                1
            };
            let texture = ctx.acquire_texture(width, height, samples)?;
            let drawn = node.filter.draw(
                ctx,
                &current,
                &FilterTarget::offscreen(texture, width, height),
                last_bounds,
                node.bounds,
                offset_between(last_bounds, node.bounds, scale),
            );
            if let Some(previous) = held.replace(texture) {
                ctx.recycle_texture(previous);
            }
            drawn?;
            current = FilterSource {
                texture,
                width,
                height,
                scale,
            };
            last_bounds = node.bounds;
        }
        last.filter.draw(
            ctx,
            &current,
            target,
            last_bounds,
            last.bounds,
            offset_between(last_bounds, last.bounds, scale),
        )
    })();
    if let Some(texture) = held {
        ctx.recycle_texture(texture);
    }
    result
}

/// A target on the canvas itself when the last filter can draw there directly.
fn direct_target(
    ctx: &FilterContext,
    canvas: &Canvas,
    list: &FilterList,
    nodes: &[FilterNode<'_>],
    content_bounds: Rect,
    scale: f64,
) -> Option<FilterTarget> {
    if !ctx.settings().allow_direct_target {
        return None;
    }
    // Blurs downsample well offscreen.
    if list.effects.last().is_some_and(|n| n.filter.is_blur()) {
        return None;
    }
    let last = nodes.last()?;
    if last.filter.needs_msaa() || canvas.alpha() != 1.0 {
        return None;
    }
    let matrix = canvas.matrix();
    if has_skew(matrix) {
        return None;
    }
    let (texture, width, height) = canvas.target()?;
    let surface = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
    // Vertices are placed from unclipped bounds, so that is what must fit.
    let drawn = matrix.transform_rect_bbox(transform_filter_bounds(content_bounds, list));
    let drawn = intersect(drawn, surface).unwrap_or(Rect::ZERO);
    if !contains(canvas.device_clip()?, drawn) {
        return None;
    }
    let scissor = canvas.scissor()?;
    Some(FilterTarget {
        texture,
        width,
        height,
        matrix: matrix
            * Affine::translate(last.bounds.origin().to_vec2())
            * Affine::scale(1.0 / scale),
        clear: false,
        scissor: Some(scissor),
    })
}

fn draw_filtered(
    ctx: &mut FilterContext,
    canvas: &mut Canvas,
    list: &FilterList,
    nodes: &[FilterNode<'_>],
    picture: &Picture,
    content_bounds: Rect,
) -> FxResult<()> {
    let last = nodes
        .last()
        .ok_or_else(|| FxError::validation("no filter to draw"))?;
    let scale = list.content_scale(
        content_bounds,
        max_scale(canvas.matrix()),
        ctx.gpu().max_texture_size(),
        ctx.settings().scale_grid,
    );
    let source_image = Image::from_picture(ctx, picture, content_bounds, scale)?;
    let source = FilterSource {
        texture: source_image.texture,
        width: source_image.width,
        height: source_image.height,
        scale: Vec2::new(scale, scale),
    };

    let result = (|| {
        if let Some(target) = direct_target(ctx, canvas, list, nodes, content_bounds, scale) {
            tracing::debug!(scale, nodes = nodes.len(), "filtering onto canvas");
            return apply_filters(ctx, nodes, content_bounds, source, &target);
        }
        tracing::debug!(scale, nodes = nodes.len(), "filtering offscreen");
        let width = (last.bounds.width() * scale).ceil().max(1.0) as u32;
        let height = (last.bounds.height() * scale).ceil().max(1.0) as u32;
        let samples = if last.filter.needs_msaa() {
            ctx.settings().msaa_samples
        } else {
            1
        };
        let texture = ctx.acquire_texture(width, height, samples)?;
        let drawn = apply_filters(
            ctx,
            nodes,
            content_bounds,
            source,
            &FilterTarget::offscreen(texture, width, height),
        )
        .and_then(|()| {
            let image = Image {
                texture,
                width,
                height,
            };
            canvas.draw_image(
                ctx,
                &image,
                Affine::translate(last.bounds.origin().to_vec2()) * Affine::scale(1.0 / scale),
            )
        });
        ctx.recycle_texture(texture);
        drawn
    })();
    ctx.recycle_texture(source_image.texture);
    result
}

fn draw_unfiltered(
    ctx: &mut FilterContext,
    canvas: &mut Canvas,
    content: &dyn Content,
    reason: UnfilteredReason,
) -> FilterOutcome {
    if let Err(e) = content.draw(ctx, canvas) {
        tracing::warn!(error = %e, "failed to draw unfiltered content");
    }
    FilterOutcome::Unfiltered(reason)
}

/// Draw `content` for the layer of `modifier` onto `canvas` with all of its filters applied.
///
/// Never fails: on any filter failure the unfiltered content is drawn instead, and the outcome
/// says why.
#[tracing::instrument(
    skip_all,
    fields(layer = %modifier.layer.name, frame = modifier.layer_frame.0)
)]
pub fn draw_with_filter(
    ctx: &mut FilterContext,
    canvas: &mut Canvas,
    modifier: &FilterModifier<'_>,
    content: &dyn Content,
) -> FilterOutcome {
    let list = FilterList::make(modifier);
    if list.is_empty() {
        return draw_unfiltered(ctx, canvas, content, UnfilteredReason::NoFilters);
    }
    if canvas.target().is_none() {
        tracing::warn!("canvas has no device target, drawing unfiltered");
        return draw_unfiltered(ctx, canvas, content, UnfilteredReason::NoTarget);
    }
    let layer_inverse = if list.use_parent_size_input {
        let Some(inverse) = invert(list.layer_matrix) else {
            tracing::warn!("layer matrix is not invertible, drawing unfiltered");
            return draw_unfiltered(ctx, canvas, content, UnfilteredReason::NoTarget);
        };
        Some(inverse)
    } else {
        None
    };

    let bounds = content_bounds(&list, content);
    let clip = clip_bounds(canvas, &list);
    let Some((bounds, nodes)) = make_filter_nodes(&list, bounds, clip) else {
        tracing::debug!("filter output misses the clip");
        return draw_unfiltered(ctx, canvas, content, UnfilteredReason::ClippedOut);
    };
    if nodes.is_empty() {
        tracing::debug!("every filter is identity");
        return draw_unfiltered(ctx, canvas, content, UnfilteredReason::Identity);
    }

    let mut recorder = PictureRecorder::new();
    let recording = recorder.begin_recording();
    if list.use_parent_size_input {
        recording.concat(list.layer_matrix);
    }
    if let Err(e) = content.draw(ctx, recording) {
        tracing::warn!(error = %e, "failed to record layer content");
        return FilterOutcome::Unfiltered(UnfilteredReason::Failed);
    }
    let picture = recorder.finish_recording_as_picture().unwrap_or_default();

    canvas.save();
    if let Some(inverse) = layer_inverse {
        canvas.concat(inverse);
    }
    let drawn = draw_filtered(ctx, canvas, &list, &nodes, &picture, bounds);
    canvas.restore();
    match drawn {
        Ok(()) => FilterOutcome::Filtered,
        Err(e) => {
            tracing::warn!(error = %e, "filter chain failed, drawing unfiltered");
            draw_unfiltered(ctx, canvas, content, UnfilteredReason::Failed)
        }
    }
}

/// The rect, in content space, that filtering `bounds` for the layer of `modifier` would cover.
/// Issues no draws.
pub fn measure_filter_bounds(bounds: Rect, modifier: &FilterModifier<'_>) -> Rect {
    let list = FilterList::make(modifier);
    let start = if list.process_visible_area_only {
        round_out(bounds)
    } else {
        list.layer_bounds
    };
    let measured = transform_filter_bounds(start, &list);
    match (list.use_parent_size_input, invert(list.layer_matrix)) {
        (true, Some(inverse)) => inverse.transform_rect_bbox(measured),
        _ => measured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::Frame,
        model::{
            effect::{Effect, EffectKind, FastBlurEffect, MosaicEffect},
            layer::{Layer, LayerType},
            property::Property,
        },
    };

    fn blur(amount: f32) -> Effect {
        Effect::new(EffectKind::FastBlur(FastBlurEffect {
            blurriness: Property::Constant(amount),
            ..FastBlurEffect::default()
        }))
    }

    fn layer_with(effects: Vec<Effect>) -> Layer {
        let mut layer = Layer::new(LayerType::Solid, 20.0, 20.0);
        layer.effects = effects;
        layer
    }

    #[test]
    fn nodes_grow_and_clip() {
        let layer = layer_with(vec![blur(4.0)]);
        let list = FilterList::make(&FilterModifier::new(&layer, Frame(0)));
        let content = Rect::new(0.0, 0.0, 20.0, 20.0);
        let (_, nodes) = make_filter_nodes(&list, content, None).unwrap();
        assert_eq!(nodes.len(), 1);
        let grown = nodes[0].bounds;
        assert!(contains(grown, content) && grown != content);

        let clip = Some(Rect::new(0.0, 0.0, 10.0, 10.0));
        let (clipped_content, nodes) = make_filter_nodes(&list, content, clip).unwrap();
        assert_eq!(nodes[0].bounds, Rect::new(0.0, 0.0, 10.0, 10.0));
        // A blur without repeated edges keeps the whole content.
        assert_eq!(clipped_content, content);
    }

    #[test]
    fn disjoint_clip_yields_nothing() {
        let layer = layer_with(vec![Effect::new(EffectKind::Mosaic(MosaicEffect::default()))]);
        let list = FilterList::make(&FilterModifier::new(&layer, Frame(0)));
        let content = Rect::new(0.0, 0.0, 20.0, 20.0);
        assert!(make_filter_nodes(&list, content, Some(Rect::new(50.0, 50.0, 60.0, 60.0))).is_none());
    }

    #[test]
    fn identity_filters_are_skipped() {
        let layer = layer_with(vec![Effect::new(EffectKind::Mosaic(MosaicEffect {
            horizontal_blocks: Property::Constant(1),
            vertical_blocks: Property::Constant(1),
            ..MosaicEffect::default()
        }))]);
        let list = FilterList::make(&FilterModifier::new(&layer, Frame(0)));
        let (_, nodes) = make_filter_nodes(&list, Rect::new(0.0, 0.0, 20.0, 20.0), None).unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn measured_bounds_match_unclipped_nodes() {
        let layer = layer_with(vec![blur(3.0), blur(2.0)]);
        let modifier = FilterModifier::new(&layer, Frame(0));
        let list = FilterList::make(&modifier);
        let content = Rect::new(0.0, 0.0, 20.0, 20.0);
        let (_, nodes) = make_filter_nodes(&list, content, None).unwrap();
        let last = nodes.last().unwrap().bounds;
        assert_eq!(measure_filter_bounds(content, &modifier), last);
    }
}
