//! A host that writes panels to PNG files and the rest of the widget's
//! visible state to a manifest beside them.

use crate::config::FontSpec;
use crate::error::RenderError;
use crate::legend::Legend;
use crate::render::{PixmapSurface, Surface};
use crate::types::Period;
use crate::widget::Host;
use anyhow::{Context, Result};
use geo::MultiPolygon;
use image::Rgba;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const MANIFEST_FILE: &str = "manifest.json";

/// What one panel currently shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PanelRecord {
    pub period: String,
    pub file: String,
    pub label: Option<String>,
    pub label_font: Option<FontSpec>,
    pub width: u32,
    pub height: u32,
    pub redraws: u32,
}

#[derive(Serialize)]
struct Manifest<'a> {
    title: Option<&'a str>,
    legend: Option<&'a Legend>,
    panels: Vec<PanelRecord>,
}

pub struct DirectoryHost {
    dir: PathBuf,
    attributes: HashMap<String, String>,
    width: u32,
    title: Option<String>,
    legend: Option<Legend>,
    panels: Vec<Arc<Mutex<PanelRecord>>>,
}

impl DirectoryHost {
    pub fn new(dir: impl Into<PathBuf>, attributes: HashMap<String, String>, width: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;
        Ok(Self {
            dir,
            attributes,
            width,
            title: None,
            legend: None,
            panels: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn panels(&self) -> Vec<PanelRecord> {
        self.panels
            .iter()
            .map(|p| p.lock().map(|r| r.clone()).unwrap_or_else(|e| e.into_inner().clone()))
            .collect()
    }

    /// Writes the legend and panel records as JSON, returning the path.
    pub fn write_manifest(&self) -> Result<PathBuf> {
        let manifest = Manifest {
            title: self.title.as_deref(),
            legend: self.legend.as_ref(),
            panels: self.panels(),
        };
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

impl Host for DirectoryHost {
    fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    fn container_width(&self) -> u32 {
        self.width
    }

    fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
    }

    fn append_legend(&mut self, legend: Legend) {
        self.legend = Some(legend);
    }

    fn create_panel(&mut self, index: usize, period: &Period) -> Result<Box<dyn Surface>, RenderError> {
        let file = format!("panel-{}-{}.png", index, file_safe(period.as_str()));
        let record = Arc::new(Mutex::new(PanelRecord {
            period: period.to_string(),
            file: file.clone(),
            ..PanelRecord::default()
        }));
        self.panels.push(Arc::clone(&record));
        Ok(Box::new(FileSurface {
            raster: PixmapSurface::new(),
            path: self.dir.join(file),
            label_font: None,
            record,
        }))
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Rasterizes in memory and saves a PNG at every presented frame.
struct FileSurface {
    raster: PixmapSurface,
    path: PathBuf,
    label_font: Option<FontSpec>,
    record: Arc<Mutex<PanelRecord>>,
}

impl Surface for FileSurface {
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.raster.resize(width, height)
    }

    fn clear(&mut self) {
        self.raster.clear();
    }

    fn fill(&mut self, shape: &MultiPolygon<f64>, color: Rgba<u8>) {
        self.raster.fill(shape, color);
    }

    fn stroke(&mut self, shape: &MultiPolygon<f64>, color: Rgba<u8>, width: f32) {
        self.raster.stroke(shape, color, width);
    }

    fn label(&mut self, text: &str, font: &FontSpec) {
        self.raster.label(text, font);
        self.label_font = Some(font.clone());
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let img = self
            .raster
            .to_image()
            .ok_or(RenderError::NoContext { width: 0, height: 0 })?;
        img.save(&self.path)?;

        let mut record = self.record.lock().unwrap_or_else(|e| e.into_inner());
        record.label = self.raster.label_text().map(str::to_string);
        record.label_font = self.label_font.clone();
        record.width = img.width();
        record.height = img.height();
        record.redraws += 1;
        tracing::debug!(path = ?self.path, width = record.width, height = record.height, "saved panel");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::{MemoryFetcher, ABC_TABLE, ABC_TOPOLOGY};
    use crate::projection::ProjectionRegistry;
    use crate::widget::{mount, Capabilities};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn attributes(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(file_safe("2000"), "2000");
        assert_eq!(file_safe("Q1 2020/21"), "Q1_2020_21");
    }

    #[tokio::test(start_paused = true)]
    async fn writes_pngs_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let caps = Capabilities {
            fetcher: MemoryFetcher::new(&[("geo.json", ABC_TOPOLOGY), ("data.csv", ABC_TABLE)]),
            projections: ProjectionRegistry::default(),
        };
        let mut host = DirectoryHost::new(
            tmp.path().join("widget-0"),
            attributes(&[
                ("data-geo-src", "geo.json"),
                ("data-src", "data.csv"),
                ("data-map-projection", "equirectangular"),
                ("data-columns", "2"),
                ("data-title", "Rate"),
            ]),
            600,
        )
        .unwrap();

        let widget = mount(&mut host, &caps).await.unwrap();
        widget.resize(400);
        tokio::time::sleep(Duration::from_millis(150)).await;
        widget.close().await;

        let panels = host.panels();
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].file, "panel-0-2000.png");
        assert_eq!(panels[1].label.as_deref(), Some("2001"));
        assert_eq!(panels[0].width, 200);
        assert_eq!(panels[0].redraws, 2);

        let png = image::open(host.dir().join("panel-1-2001.png")).unwrap();
        assert_eq!(png.width(), 200);
        assert_eq!(png.height(), panels[1].height);

        let path = host.write_manifest().unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(manifest["title"], "Rate");
        assert_eq!(manifest["legend"]["title"], "Rate");
        assert_eq!(manifest["legend"]["entries"].as_array().unwrap().len(), 5);
        assert_eq!(manifest["panels"][0]["period"], "2000");
        assert_eq!(manifest["panels"][0]["label_font"]["size"], "16px");
    }
}
