//! JSON scene description and a frame driver over the filter renderer.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    context::{FilterContext, RenderSettings},
    foundation::{
        core::{Affine, Color, Frame, FrameRGBA, Rect},
        error::{FxError, FxResult},
    },
    gpu::TextureDesc,
    model::{
        effect::EffectKind,
        layer::{FilterModifier, Layer},
    },
    render::{
        canvas::{Canvas, Content, Image},
        filter_renderer::{FilterOutcome, draw_with_filter, measure_filter_bounds},
    },
};

/// Pixels a layer draws before filtering.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSource {
    /// PNG file, relative to the scene file.
    Image { path: PathBuf },
    Solid { color: Color },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneLayer {
    pub source: LayerSource,
    #[serde(flatten)]
    pub layer: Layer,
    #[serde(skip)]
    pub pixels: Option<Arc<FrameRGBA>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background: Option<Color>,
    #[serde(default)]
    pub settings: RenderSettings,
    /// Named images referenced by effects, relative to the scene file.
    #[serde(default)]
    pub assets: BTreeMap<String, PathBuf>,
    /// Bottom to top.
    pub layers: Vec<SceneLayer>,
}

impl Scene {
    pub fn from_json(s: &str) -> FxResult<Self> {
        let scene: Self = serde_json::from_str(s)?;
        scene.validate()?;
        Ok(scene)
    }

    /// Parse the scene at `path` and load every image it references.
    pub fn load(path: &Path) -> FxResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FxError::validation(format!("read scene '{}': {e}", path.display())))?;
        let mut scene = Self::from_json(&text)?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        scene.resolve_assets(root)?;
        Ok(scene)
    }

    pub fn validate(&self) -> FxResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FxError::validation("scene width/height must be > 0"));
        }
        self.settings.validate()?;
        for (i, l) in self.layers.iter().enumerate() {
            if !(l.layer.width > 0.0 && l.layer.height > 0.0) {
                return Err(FxError::validation(format!(
                    "layer {i} ('{}') must have a positive size",
                    l.layer.name
                )));
            }
            for effect in &l.layer.effects {
                if let EffectKind::DisplacementMap(d) = &effect.kind
                    && let Some(name) = &d.map_asset
                    && !self.assets.contains_key(name)
                {
                    return Err(FxError::validation(format!(
                        "layer {i} references unknown asset '{name}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Decode layer images and displacement maps, resolving paths against `root`.
    pub fn resolve_assets(&mut self, root: &Path) -> FxResult<()> {
        let mut decoded: BTreeMap<String, Arc<FrameRGBA>> = BTreeMap::new();
        for (name, rel) in &self.assets {
            decoded.insert(name.clone(), Arc::new(decode_png(&root.join(rel))?));
        }
        for l in &mut self.layers {
            if let LayerSource::Image { path } = &l.source {
                l.pixels = Some(Arc::new(decode_png(&root.join(path))?));
            }
            for effect in &mut l.layer.effects {
                if let EffectKind::DisplacementMap(d) = &mut effect.kind
                    && let Some(name) = &d.map_asset
                {
                    d.map = decoded.get(name).cloned();
                }
            }
        }
        Ok(())
    }
}

/// Decode a PNG into straight-alpha RGBA8.
pub fn decode_png(path: &Path) -> FxResult<FrameRGBA> {
    let img = image::open(path)
        .map_err(|e| FxError::validation(format!("decode image '{}': {e}", path.display())))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(FrameRGBA {
        width,
        height,
        data: img.into_raw(),
        premultiplied: false,
    })
}

fn solid_pixels(color: Color, width: u32, height: u32) -> FrameRGBA {
    FrameRGBA {
        width,
        height,
        data: [color.r, color.g, color.b, 255].repeat((width as usize) * (height as usize)),
        premultiplied: true,
    }
}

/// A layer's source image stretched over its declared bounds.
struct LayerContent {
    image: Image,
    bounds: Rect,
}

impl Content for LayerContent {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn draw(&self, ctx: &mut FilterContext, canvas: &mut Canvas) -> FxResult<()> {
        let fit = Affine::scale_non_uniform(
            self.bounds.width() / f64::from(self.image.width.max(1)),
            self.bounds.height() / f64::from(self.image.height.max(1)),
        );
        canvas.draw_image(ctx, &self.image, fit)
    }
}

/// Render composition frame `frame` of `scene`.
#[tracing::instrument(skip_all, fields(frame = frame.0, layers = scene.layers.len()))]
pub fn render_scene(scene: &Scene, frame: Frame, ctx: &mut FilterContext) -> FxResult<FrameRGBA> {
    let target = ctx
        .gpu_mut()
        .create_texture(TextureDesc::new(scene.width, scene.height))?;
    let drawn = (|| {
        let clear = match scene.background {
            Some(c) => {
                let [r, g, b] = c.to_f32();
                [r, g, b, 1.0]
            }
            None => ctx.settings().clear_rgba,
        };
        ctx.gpu_mut().clear_texture(target, clear)?;
        let mut canvas = Canvas::new(target, scene.width, scene.height);
        for l in &scene.layers {
            draw_layer(ctx, &mut canvas, l, frame)?;
        }
        ctx.read_texture(target)
    })();
    ctx.release_texture(target);
    drawn
}

fn draw_layer(
    ctx: &mut FilterContext,
    canvas: &mut Canvas,
    l: &SceneLayer,
    frame: Frame,
) -> FxResult<()> {
    let layer = &l.layer;
    let bounds = layer.bounds();
    let pixels = match (&l.source, &l.pixels) {
        (LayerSource::Solid { color }, _) => Arc::new(solid_pixels(
            *color,
            bounds.width().ceil().max(1.0) as u32,
            bounds.height().ceil().max(1.0) as u32,
        )),
        (LayerSource::Image { .. }, Some(p)) => Arc::clone(p),
        (LayerSource::Image { path }, None) => {
            return Err(FxError::validation(format!(
                "layer '{}' image '{}' was not loaded",
                layer.name,
                path.display()
            )));
        }
    };
    let image = Image::upload(ctx, &pixels)?;
    let content = LayerContent { image, bounds };

    canvas.save();
    canvas.concat(layer.matrix_at(layer.content_frame(frame)));
    let outcome = draw_with_filter(ctx, canvas, &FilterModifier::new(layer, frame), &content);
    canvas.restore();
    ctx.release_texture(image.texture);
    match outcome {
        FilterOutcome::Filtered => tracing::debug!(layer = %layer.name, "layer filtered"),
        FilterOutcome::Unfiltered(reason) => {
            tracing::debug!(layer = %layer.name, ?reason, "layer drawn unfiltered")
        }
    }
    Ok(())
}

/// Filter bounds of every layer at `frame`, in each layer's content space.
pub fn measure_scene(scene: &Scene, frame: Frame) -> Vec<(String, Rect)> {
    scene
        .layers
        .iter()
        .map(|l| {
            let bounds =
                measure_filter_bounds(l.layer.bounds(), &FilterModifier::new(&l.layer, frame));
            (l.layer.name.clone(), bounds)
        })
        .collect()
}
