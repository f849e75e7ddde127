use std::sync::Arc;

use layerfx::{
    Affine, Color, Effect, EffectKind, FilterContext, FilterModifier, FilterOutcome, Frame,
    FrameRGBA, Layer, LayerStyle, LayerType, Property, Rect, SoftGpu, StyleKind, UnfilteredReason,
    Vec2, draw_with_filter,
    foundation::{core::Point, math::Matrix3D},
    gpu::TextureDesc,
    measure_filter_bounds,
    model::{
        effect::{
            BulgeEffect, CornerPinEffect, DisplacementMapEffect, DisplacementMapSource,
            FastBlurEffect, GlowEffect, LevelsChannel, LevelsEffect, MosaicEffect,
            MotionTileEffect, RadialBlurEffect, RadialBlurMode,
        },
        property::Keyframe,
        style::{
            ColorStop, DropShadowStyle, GradientOverlayStyle, OuterGlowStyle, StrokeStyle,
        },
    },
    render::{Canvas, Content, FilterList, Image},
};

const SIZE: u32 = 16;
const CANVAS: u32 = 48;

struct Pixels {
    image: Image,
}

impl Content for Pixels {
    fn bounds(&self) -> Rect {
        self.image.bounds()
    }

    fn draw(&self, ctx: &mut FilterContext, canvas: &mut Canvas) -> layerfx::FxResult<()> {
        canvas.draw_image(ctx, &self.image, Affine::IDENTITY)
    }
}

/// Left half red, right half blue, opaque.
fn two_tone() -> FrameRGBA {
    let mut data = Vec::with_capacity((SIZE * SIZE * 4) as usize);
    for _y in 0..SIZE {
        for x in 0..SIZE {
            if x < SIZE / 2 {
                data.extend_from_slice(&[255, 0, 0, 255]);
            } else {
                data.extend_from_slice(&[0, 0, 255, 255]);
            }
        }
    }
    FrameRGBA {
        width: SIZE,
        height: SIZE,
        data,
        premultiplied: true,
    }
}

fn layer_with(effects: Vec<Effect>) -> Layer {
    let mut layer = Layer::new(LayerType::Solid, f64::from(SIZE), f64::from(SIZE));
    layer.name = "under test".to_owned();
    layer.effects = effects;
    layer
}

fn render_at(
    ctx: &mut FilterContext,
    layer: &Layer,
    frame: Frame,
    placement: Affine,
) -> (FilterOutcome, FrameRGBA) {
    let target = ctx
        .gpu_mut()
        .create_texture(TextureDesc::new(CANVAS, CANVAS))
        .unwrap();
    let image = Image::upload(ctx, &two_tone()).unwrap();
    let content = Pixels { image };

    let mut canvas = Canvas::new(target, CANVAS, CANVAS);
    canvas.concat(placement * layer.matrix_at(layer.content_frame(frame)));
    let outcome = draw_with_filter(ctx, &mut canvas, &FilterModifier::new(layer, frame), &content);

    let out = ctx.read_texture(target).unwrap();
    ctx.release_texture(image.texture);
    ctx.release_texture(target);
    (outcome, out)
}

fn render(ctx: &mut FilterContext, layer: &Layer) -> (FilterOutcome, FrameRGBA) {
    render_at(ctx, layer, Frame(0), Affine::translate((16.0, 16.0)))
}

fn unfiltered() -> FrameRGBA {
    render(&mut FilterContext::soft(), &layer_with(vec![])).1
}

fn mosaic(blocks: u16) -> Effect {
    Effect::new(EffectKind::Mosaic(MosaicEffect {
        horizontal_blocks: Property::Constant(blocks),
        vertical_blocks: Property::Constant(blocks),
        ..MosaicEffect::default()
    }))
}

fn blur(amount: f32) -> Effect {
    Effect::new(EffectKind::FastBlur(FastBlurEffect {
        blurriness: Property::Constant(amount),
        ..FastBlurEffect::default()
    }))
}

fn styled(kinds: Vec<StyleKind>) -> Layer {
    let mut layer = layer_with(vec![]);
    layer.layer_styles = kinds.into_iter().map(LayerStyle::new).collect();
    layer
}

fn green() -> Property<Color> {
    Property::Constant(Color::new(0, 255, 0))
}

fn near(actual: [u8; 4], expected: [u8; 4], tolerance: u8) -> bool {
    actual
        .iter()
        .zip(expected)
        .all(|(&a, e)| a.abs_diff(e) <= tolerance)
}

const CLEAR: [u8; 4] = [0, 0, 0, 0];
const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

#[test]
fn no_effects_draws_content_as_is() {
    let (outcome, out) = render(&mut FilterContext::soft(), &layer_with(vec![]));
    assert_eq!(outcome, FilterOutcome::Unfiltered(UnfilteredReason::NoFilters));
    assert_eq!(out.pixel(16, 16), [255, 0, 0, 255]);
    assert_eq!(out.pixel(31, 31), [0, 0, 255, 255]);
    assert_eq!(out.pixel(15, 16), [0, 0, 0, 0]);
}

#[test]
fn identity_effects_match_unfiltered_output() {
    let reference = unfiltered();
    for effect in [
        Effect::new(EffectKind::LevelsIndividual(LevelsEffect::default())),
        mosaic(1),
        Effect::new(EffectKind::Bulge(BulgeEffect {
            horizontal_radius: Property::Constant(0.0),
            vertical_radius: Property::Constant(0.0),
            height: Property::Constant(0.0),
            ..BulgeEffect::default()
        })),
    ] {
        let mut ctx = FilterContext::soft();
        let (outcome, out) = render(&mut ctx, &layer_with(vec![effect.clone()]));
        assert_eq!(
            outcome,
            FilterOutcome::Unfiltered(UnfilteredReason::Identity),
            "{:?}",
            effect.effect_type()
        );
        assert_eq!(out, reference);
    }
}

#[test]
fn effect_order_changes_the_result() {
    let mut ctx = FilterContext::soft();
    let (a, mosaic_then_blur) = render(&mut ctx, &layer_with(vec![mosaic(4), blur(3.0)]));
    let (b, blur_then_mosaic) = render(&mut ctx, &layer_with(vec![blur(3.0), mosaic(4)]));
    assert_eq!(a, FilterOutcome::Filtered);
    assert_eq!(b, FilterOutcome::Filtered);
    assert_ne!(mosaic_then_blur, blur_then_mosaic);
}

#[test]
fn layer_outside_the_clip_skips_its_filters() {
    let mut ctx = FilterContext::soft();
    let layer = layer_with(vec![mosaic(4)]);
    let (outcome, out) = render_at(&mut ctx, &layer, Frame(0), Affine::translate((500.0, 500.0)));
    assert_eq!(outcome, FilterOutcome::Unfiltered(UnfilteredReason::ClippedOut));
    assert_eq!(ctx.gpu_stats().draws_of("layerfx_mosaic"), 0);
    assert!(out.data.iter().all(|&b| b == 0));
}

#[test]
fn motion_blur_runs_only_while_the_layer_moves() {
    let mut layer = layer_with(vec![]);
    layer.motion_blur = true;

    let mut ctx = FilterContext::soft();
    let (outcome, _) = render_at(&mut ctx, &layer, Frame(5), Affine::IDENTITY);
    assert_eq!(outcome, FilterOutcome::Unfiltered(UnfilteredReason::NoFilters));
    assert_eq!(ctx.gpu_stats().draws_of("layerfx_motion_blur"), 0);

    layer.transform = Property::Animated {
        keyframes: vec![
            Keyframe {
                frame: Frame(0),
                value: Affine::translate((0.0, 16.0)),
                hold: false,
            },
            Keyframe {
                frame: Frame(10),
                value: Affine::translate((30.0, 16.0)),
                hold: false,
            },
        ],
    };
    let (outcome, _) = render_at(&mut ctx, &layer, Frame(5), Affine::IDENTITY);
    assert_eq!(outcome, FilterOutcome::Filtered);
    assert_eq!(ctx.gpu_stats().draws_of("layerfx_motion_blur"), 1);
}

#[test]
fn programs_compile_once_per_context() {
    let layer = layer_with(vec![mosaic(4)]);
    let mut first = FilterContext::soft();
    render(&mut first, &layer);
    let compiled = first.gpu_stats().programs_compiled;
    render(&mut first, &layer);
    assert_eq!(first.gpu_stats().programs_compiled, compiled);
    assert_eq!(first.gpu_stats().draws_of("layerfx_mosaic"), 2);

    let mut second = FilterContext::soft();
    render(&mut second, &layer);
    assert_eq!(second.gpu_stats().programs_compiled, compiled);
    assert!(second.programs().contains(layerfx::FilterKind::Mosaic));
}

#[test]
fn failed_compile_falls_back_to_unfiltered_content() {
    let mut ctx = FilterContext::new(Box::new(SoftGpu::new().fail_compile_of("layerfx_mosaic")));
    let (outcome, out) = render(&mut ctx, &layer_with(vec![mosaic(4)]));
    assert_eq!(outcome, FilterOutcome::Unfiltered(UnfilteredReason::Failed));
    assert_eq!(out, unfiltered());

    // The failure is remembered; the next frame does not recompile.
    let before = ctx.gpu_stats().programs_compiled;
    let (outcome, _) = render(&mut ctx, &layer_with(vec![mosaic(4)]));
    assert_eq!(outcome, FilterOutcome::Unfiltered(UnfilteredReason::Failed));
    assert_eq!(ctx.gpu_stats().programs_compiled, before);
}

#[test]
fn device_error_mid_chain_falls_back_to_unfiltered_content() {
    let gpu = SoftGpu::new().raise_error_on_draw_of("layerfx_mosaic");
    let mut ctx = FilterContext::new(Box::new(gpu));
    let (outcome, out) = render(&mut ctx, &layer_with(vec![mosaic(4), blur(2.0)]));
    assert_eq!(outcome, FilterOutcome::Unfiltered(UnfilteredReason::Failed));
    assert_eq!(out, unfiltered());
    assert_eq!(ctx.gpu_stats().draws_of("layerfx_blur_pass"), 0);
}

#[test]
fn drawn_pixels_stay_inside_measured_bounds() {
    let layer = layer_with(vec![blur(4.0)]);
    let measured = measure_filter_bounds(layer.bounds(), &FilterModifier::new(&layer, Frame(0)));
    assert!(measured.x0 < 0.0 && measured.x1 > f64::from(SIZE));

    let (_, out) = render(&mut FilterContext::soft(), &layer);
    let device = measured + Vec2::new(16.0, 16.0);
    let mut spilled = false;
    for y in 0..CANVAS {
        for x in 0..CANVAS {
            if out.pixel(x, y)[3] == 0 {
                continue;
            }
            let (fx, fy) = (f64::from(x) + 0.5, f64::from(y) + 0.5);
            assert!(
                fx > device.x0 && fx < device.x1 && fy > device.y0 && fy < device.y1,
                "pixel ({x}, {y}) outside {device:?}"
            );
            spilled |= !(16..32).contains(&x);
        }
    }
    assert!(spilled);
}

#[test]
fn layer_styles_scale_against_the_layer_transform() {
    let shadow = || {
        LayerStyle::new(StyleKind::DropShadow(DropShadowStyle {
            angle: Property::Constant(0.0),
            distance: Property::Constant(10.0),
            size: Property::Constant(0.0),
            ..DropShadowStyle::default()
        }))
    };
    let growth = |scale: f64| {
        let mut layer = Layer::new(LayerType::Solid, 40.0, 40.0);
        layer.transform = Property::Constant(Affine::scale(scale));
        layer.layer_styles = vec![shadow()];
        let b = measure_filter_bounds(layer.bounds(), &FilterModifier::new(&layer, Frame(0)));
        b.width() - 40.0
    };
    let unscaled = growth(1.0);
    let doubled = growth(2.0);
    assert!(unscaled >= 9.0, "{unscaled}");
    assert!((unscaled - 2.0 * doubled).abs() <= 2.0, "{unscaled} vs {doubled}");
}

#[test]
fn magnifying_effects_raise_the_working_scale() {
    let r = Rect::new(0.0, 0.0, 100.0, 100.0);
    let scale_with = |effect: Effect| {
        let mut layer = Layer::new(LayerType::Solid, 100.0, 100.0);
        layer.effects = vec![effect];
        FilterList::make(&FilterModifier::new(&layer, Frame(0))).content_scale(r, 1.0, 8192, 20)
    };

    let tile = scale_with(Effect::new(EffectKind::MotionTile(MotionTileEffect {
        tile_width: Property::Constant(200.0),
        tile_height: Property::Constant(200.0),
        ..MotionTileEffect::default()
    })));
    assert_eq!(tile, 2.0);

    let pin = scale_with(Effect::new(EffectKind::CornerPin(CornerPinEffect {
        upper_left: Property::Constant(Point::new(0.0, 0.0)),
        upper_right: Property::Constant(Point::new(300.0, 0.0)),
        lower_left: Property::Constant(Point::new(0.0, 100.0)),
        lower_right: Property::Constant(Point::new(300.0, 100.0)),
    })));
    assert_eq!(pin, 3.0);
}

// The layer covers device 16..32 on both axes: red left of x = 24, blue from there on. Row 24 is
// inside the layer, so pixels left of 16 or right of 31 on that row sit in a filter's expansion.

#[test]
fn glow_below_threshold_leaves_expansion_clear() {
    let glow = Effect::new(EffectKind::Glow(GlowEffect {
        threshold: Property::Constant(100.0),
        radius: Property::Constant(6.0),
        intensity: Property::Constant(1.0),
    }));
    let (outcome, out) = render(&mut FilterContext::soft(), &layer_with(vec![glow]));
    assert_eq!(outcome, FilterOutcome::Filtered);
    assert_eq!(out.pixel(12, 24), CLEAR);
    assert_eq!(out.pixel(15, 24), CLEAR);
    assert_eq!(out.pixel(20, 24), RED);
    assert_eq!(out.pixel(28, 24), BLUE);
}

#[test]
fn glow_spreads_bright_colors_into_expansion() {
    let glow = Effect::new(EffectKind::Glow(GlowEffect {
        threshold: Property::Constant(0.0),
        radius: Property::Constant(6.0),
        intensity: Property::Constant(1.0),
    }));
    let (_, out) = render(&mut FilterContext::soft(), &layer_with(vec![glow]));
    // only red lies within reach of x = 13
    let [r, g, b, a] = out.pixel(13, 24);
    assert!(a > 0 && r > 0, "{:?}", out.pixel(13, 24));
    assert_eq!((g, b), (0, 0));
    assert!(r <= a);
    assert_eq!(out.pixel(9, 24), CLEAR);
}

#[test]
fn radial_spin_mixes_colors_across_the_arc() {
    let spin = Effect::new(EffectKind::RadialBlur(RadialBlurEffect {
        amount: Property::Constant(60.0),
        center: Property::Constant(Point::new(8.0, 8.0)),
        mode: Property::Constant(RadialBlurMode::Spin),
        ..RadialBlurEffect::default()
    }));
    let reference = unfiltered();
    assert_eq!(reference.pixel(24, 18), BLUE);
    let (_, out) = render(&mut FilterContext::soft(), &layer_with(vec![spin]));
    let [r, _, b, _] = out.pixel(24, 18);
    assert!(r > 0 && b > 0, "{:?}", out.pixel(24, 18));
    assert_eq!(out.pixel(15, 24), CLEAR);
}

#[test]
fn full_displacement_shifts_content_into_expansion() {
    let map = FrameRGBA {
        width: 4,
        height: 4,
        data: vec![128; 64],
        premultiplied: true,
    };
    let displace = Effect::new(EffectKind::DisplacementMap(DisplacementMapEffect {
        map: Some(Arc::new(map)),
        use_for_horizontal: Property::Constant(DisplacementMapSource::Full),
        max_horizontal: Property::Constant(4.0),
        use_for_vertical: Property::Constant(DisplacementMapSource::Off),
        max_vertical: Property::Constant(0.0),
        expand_output: Property::Constant(true),
        ..DisplacementMapEffect::default()
    }));
    let (outcome, out) = render(&mut FilterContext::soft(), &layer_with(vec![displace]));
    assert_eq!(outcome, FilterOutcome::Filtered);
    // every output pixel reads the input 4 units to its right
    assert_eq!(out.pixel(12, 24), RED);
    assert_eq!(out.pixel(19, 24), RED);
    assert_eq!(out.pixel(20, 24), BLUE);
    assert_eq!(out.pixel(27, 24), BLUE);
    assert_eq!(out.pixel(29, 24), CLEAR);
    assert_eq!(out.pixel(34, 24), CLEAR);
}

#[test]
fn corner_pin_stretches_content_to_the_pinned_quad() {
    let pin = Effect::new(EffectKind::CornerPin(CornerPinEffect {
        upper_left: Property::Constant(Point::new(0.0, 0.0)),
        upper_right: Property::Constant(Point::new(24.0, 0.0)),
        lower_left: Property::Constant(Point::new(0.0, 16.0)),
        lower_right: Property::Constant(Point::new(24.0, 16.0)),
    }));
    let (_, out) = render(&mut FilterContext::soft(), &layer_with(vec![pin]));
    // the red half now spans 16..28
    assert_eq!(out.pixel(22, 24), RED);
    assert_eq!(out.pixel(24, 24), RED);
    assert_eq!(out.pixel(30, 24), BLUE);
    assert_eq!(out.pixel(38, 24), BLUE);
    assert_eq!(out.pixel(41, 24), CLEAR);
}

#[test]
fn transform_3d_translation_moves_the_layer() {
    let mut layer = layer_with(vec![]);
    layer.transform_3d = Some(Property::Constant(Matrix3D::translate(4.0, 0.0, 0.0)));
    let (outcome, out) = render(&mut FilterContext::soft(), &layer);
    assert_eq!(outcome, FilterOutcome::Filtered);
    assert_eq!(out.pixel(17, 24), CLEAR);
    assert_eq!(out.pixel(21, 24), RED);
    assert_eq!(out.pixel(29, 24), BLUE);
    assert_eq!(out.pixel(34, 24), BLUE);
    assert_eq!(out.pixel(36, 24), CLEAR);
}

#[test]
fn motion_tile_repeats_and_mirrors_into_expansion() {
    let tile = |mirror: bool| {
        Effect::new(EffectKind::MotionTile(MotionTileEffect {
            tile_center: Property::Constant(Point::new(8.0, 8.0)),
            output_width: Property::Constant(200.0),
            mirror_edges: Property::Constant(mirror),
            ..MotionTileEffect::default()
        }))
    };
    let (_, repeated) = render(&mut FilterContext::soft(), &layer_with(vec![tile(false)]));
    // left of the layer continues with the right (blue) half of the previous tile
    assert_eq!(repeated.pixel(12, 24), BLUE);
    assert_eq!(repeated.pixel(20, 24), RED);
    assert_eq!(repeated.pixel(36, 24), RED);
    assert_eq!(repeated.pixel(6, 24), CLEAR);

    let (_, mirrored) = render(&mut FilterContext::soft(), &layer_with(vec![tile(true)]));
    assert_eq!(mirrored.pixel(12, 24), RED);
    assert_eq!(mirrored.pixel(36, 24), BLUE);
}

#[test]
fn motion_blur_trail_holds_only_smeared_content() {
    let mut layer = layer_with(vec![]);
    layer.motion_blur = true;
    layer.transform = Property::Animated {
        keyframes: vec![
            Keyframe {
                frame: Frame(0),
                value: Affine::translate((0.0, 16.0)),
                hold: false,
            },
            Keyframe {
                frame: Frame(10),
                value: Affine::translate((30.0, 16.0)),
                hold: false,
            },
        ],
    };
    // at frame 5 the layer sits at x = 15 and moved 3 units since frame 4
    let (outcome, out) = render_at(&mut FilterContext::soft(), &layer, Frame(5), Affine::IDENTITY);
    assert_eq!(outcome, FilterOutcome::Filtered);
    let [r, g, b, a] = out.pixel(14, 24);
    assert!(a > 0 && a < 255, "{:?}", out.pixel(14, 24));
    assert!(r > 0 && g == 0 && b == 0);
    assert_eq!(out.pixel(12, 24), CLEAR);
    assert_eq!(out.pixel(19, 24), RED);
}

#[test]
fn levels_and_mosaic_shade_content() {
    let levels = Effect::new(EffectKind::LevelsIndividual(LevelsEffect {
        master: LevelsChannel {
            output_white: Property::Constant(128.0),
            ..LevelsChannel::default()
        },
        ..LevelsEffect::default()
    }));
    let (_, out) = render(&mut FilterContext::soft(), &layer_with(vec![levels]));
    assert!(near(out.pixel(20, 24), [128, 0, 0, 255], 1), "{:?}", out.pixel(20, 24));
    assert!(near(out.pixel(28, 24), [0, 0, 128, 255], 1), "{:?}", out.pixel(28, 24));

    // three columns: the middle one straddles the seam and averages both halves
    let columns = Effect::new(EffectKind::Mosaic(MosaicEffect {
        horizontal_blocks: Property::Constant(3),
        vertical_blocks: Property::Constant(1),
        ..MosaicEffect::default()
    }));
    let (_, out) = render(&mut FilterContext::soft(), &layer_with(vec![columns]));
    for x in [22, 24, 26] {
        assert!(near(out.pixel(x, 24), [128, 0, 128, 255], 2), "{:?}", out.pixel(x, 24));
    }
    assert_eq!(out.pixel(17, 24), RED);
    assert_eq!(out.pixel(31, 24), BLUE);
}

#[test]
fn drop_shadow_expansion_carries_only_the_shadow() {
    let layer = styled(vec![StyleKind::DropShadow(DropShadowStyle {
        opacity: Property::Constant(1.0),
        angle: Property::Constant(180.0),
        distance: Property::Constant(6.0),
        size: Property::Constant(0.0),
        ..DropShadowStyle::default()
    })]);
    let (outcome, out) = render(&mut FilterContext::soft(), &layer);
    assert_eq!(outcome, FilterOutcome::Filtered);
    assert_eq!(out.pixel(34, 24), [0, 0, 0, 255]);
    assert_eq!(out.pixel(36, 24), [0, 0, 0, 255]);
    assert_eq!(out.pixel(20, 24), RED);
    assert_eq!(out.pixel(28, 24), BLUE);
    assert_eq!(out.pixel(12, 24), CLEAR);
}

#[test]
fn outer_glow_expansion_carries_only_the_glow_color() {
    let layer = styled(vec![StyleKind::OuterGlow(OuterGlowStyle {
        color: green(),
        opacity: Property::Constant(1.0),
        size: Property::Constant(6.0),
        ..OuterGlowStyle::default()
    })]);
    let (_, out) = render(&mut FilterContext::soft(), &layer);
    for x in [13, 15] {
        let [r, g, b, a] = out.pixel(x, 24);
        assert!(a > 0 && g > 0, "{:?}", out.pixel(x, 24));
        assert_eq!((r, b), (0, 0), "x = {x}");
    }
    let [r, g, b, _] = out.pixel(33, 24);
    assert!(g > 0 && r == 0 && b == 0, "{:?}", out.pixel(33, 24));
    assert_eq!(out.pixel(20, 24), RED);
    assert_eq!(out.pixel(28, 24), BLUE);
}

#[test]
fn outside_stroke_rings_the_layer_without_content_underneath() {
    let layer = styled(vec![StyleKind::Stroke(StrokeStyle {
        color: green(),
        size: Property::Constant(3.0),
        opacity: Property::Constant(0.5),
        ..StrokeStyle::default()
    })]);
    let (_, out) = render(&mut FilterContext::soft(), &layer);
    assert!(near(out.pixel(14, 24), [0, 128, 0, 128], 1), "{:?}", out.pixel(14, 24));
    assert!(near(out.pixel(33, 24), [0, 128, 0, 128], 1), "{:?}", out.pixel(33, 24));
    assert_eq!(out.pixel(11, 24), CLEAR);
    assert_eq!(out.pixel(20, 24), RED);
    assert_eq!(out.pixel(28, 24), BLUE);
}

#[test]
fn gradient_overlay_paints_only_where_the_layer_is() {
    let layer = styled(vec![
        StyleKind::GradientOverlay(GradientOverlayStyle {
            colors: vec![ColorStop {
                position: 0.0,
                color: Color::new(0, 255, 0),
            }],
            ..GradientOverlayStyle::default()
        }),
        StyleKind::DropShadow(DropShadowStyle {
            opacity: Property::Constant(1.0),
            angle: Property::Constant(180.0),
            distance: Property::Constant(6.0),
            size: Property::Constant(0.0),
            ..DropShadowStyle::default()
        }),
    ]);
    let (_, out) = render(&mut FilterContext::soft(), &layer);
    assert_eq!(out.pixel(20, 24), [0, 255, 0, 255]);
    assert_eq!(out.pixel(28, 24), [0, 255, 0, 255]);
    assert_eq!(out.pixel(34, 24), [0, 0, 0, 255]);
    assert_eq!(out.pixel(12, 24), CLEAR);
}
