use crate::config::{Configuration, FontSpec};
use crate::error::RenderError;
use crate::projection::{aspect_ratio, project_shape, shapes_bounds, Fit, Projection};
use crate::scale::ColorScale;
use crate::types::{Period, PeriodDataset};
use geo::{MultiPolygon, Rect};
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

const STROKE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const STROKE_WIDTH: f32 = 1.0;

/// Drawing capability behind one panel.
pub trait Surface: Send {
    /// Reallocates the drawing area. Fails when no context can back it.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;
    fn clear(&mut self);
    fn fill(&mut self, shape: &MultiPolygon<f64>, color: Rgba<u8>);
    fn stroke(&mut self, shape: &MultiPolygon<f64>, color: Rgba<u8>, width: f32);
    fn label(&mut self, text: &str, font: &FontSpec);
    /// Called once a full frame has been drawn.
    fn present(&mut self) -> Result<(), RenderError>;
}

/// In-memory raster surface backed by tiny-skia.
#[derive(Default)]
pub struct PixmapSurface {
    pixmap: Option<Pixmap>,
    label: Option<String>,
}

impl PixmapSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Straight-alpha copy of the current frame.
    pub fn to_image(&self) -> Option<RgbaImage> {
        let pixmap = self.pixmap.as_ref()?;
        let data = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();
        RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
    }

    fn paint(color: Rgba<u8>) -> Paint<'static> {
        let [r, g, b, a] = color.0;
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        paint
    }
}

/// Every ring of every polygon as one path, for even-odd filling.
fn to_path(shape: &MultiPolygon<f64>) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for polygon in &shape.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            let mut coords = ring.coords();
            let Some(first) = coords.next() else { continue };
            pb.move_to(first.x as f32, first.y as f32);
            for c in coords {
                pb.line_to(c.x as f32, c.y as f32);
            }
            pb.close();
        }
    }
    pb.finish()
}

impl Surface for PixmapSurface {
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        let pixmap = Pixmap::new(width, height).ok_or(RenderError::NoContext { width, height })?;
        self.pixmap = Some(pixmap);
        Ok(())
    }

    fn clear(&mut self) {
        if let Some(pixmap) = self.pixmap.as_mut() {
            pixmap.fill(tiny_skia::Color::TRANSPARENT);
        }
    }

    fn fill(&mut self, shape: &MultiPolygon<f64>, color: Rgba<u8>) {
        let (Some(pixmap), Some(path)) = (self.pixmap.as_mut(), to_path(shape)) else {
            return;
        };
        pixmap.fill_path(&path, &Self::paint(color), FillRule::EvenOdd, Transform::identity(), None);
    }

    fn stroke(&mut self, shape: &MultiPolygon<f64>, color: Rgba<u8>, width: f32) {
        let (Some(pixmap), Some(path)) = (self.pixmap.as_mut(), to_path(shape)) else {
            return;
        };
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &Self::paint(color), &stroke, Transform::identity(), None);
    }

    fn label(&mut self, text: &str, _font: &FontSpec) {
        self.label = Some(text.to_string());
    }

    fn present(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Unrendered,
    Rendered { width: u32, height: u32 },
}

/// One map panel: a period's values drawn over the shared shapes.
///
/// Geometry is projected once at unit scale; each render only re-fits it to
/// the current pixel size.
pub struct PanelRenderer {
    period: Period,
    shapes: Vec<(MultiPolygon<f64>, Option<f64>)>,
    bounds: Option<Rect<f64>>,
    aspect: f64,
    scale: Arc<ColorScale>,
    no_data: Rgba<u8>,
    label_font: FontSpec,
    surface: Box<dyn Surface>,
    state: PanelState,
}

impl PanelRenderer {
    pub fn new(
        dataset: &PeriodDataset,
        projection: &dyn Projection,
        scale: Arc<ColorScale>,
        config: &Configuration,
        surface: Box<dyn Surface>,
    ) -> Self {
        let shapes: Vec<_> = dataset
            .entries
            .iter()
            .map(|e| (project_shape(projection, &e.feature.geometry), e.value))
            .collect();
        let bounds = shapes_bounds(shapes.iter().map(|(s, _)| s));
        Self {
            period: dataset.period.clone(),
            aspect: aspect_ratio(bounds),
            shapes,
            bounds,
            scale,
            no_data: config.color_no_data,
            label_font: config.label_font.clone(),
            surface,
            state: PanelState::Unrendered,
        }
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    /// height / width of the projected shapes.
    pub fn aspect_ratio(&self) -> f64 {
        self.aspect
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Fits the shapes to `width` and redraws the whole panel.
    pub fn render(&mut self, width: u32) -> Result<(), RenderError> {
        let height = ((width as f64 * self.aspect).round() as u32).max(1);
        let fit = Fit::to_size(self.bounds, width, height);

        self.surface.resize(width, height)?;
        self.surface.clear();
        for (shape, value) in &self.shapes {
            let color = value.and_then(|v| self.scale.color(v)).unwrap_or(self.no_data);
            let fitted = fit.apply(shape);
            self.surface.fill(&fitted, color);
            self.surface.stroke(&fitted, STROKE_COLOR, STROKE_WIDTH);
        }
        self.surface.label(self.period.as_str(), &self.label_font);
        self.surface.present()?;

        tracing::debug!(period = %self.period, width, height, "panel rendered");
        self.state = PanelState::Rendered { width, height };
        Ok(())
    }
}
