use crate::color::to_hex;
use crate::config::{Configuration, FontSpec};
use crate::scale::ColorScale;
use serde::Serialize;

/// What the host shows above the panel grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: Option<String>,
    pub title_font: FontSpec,
    pub entries: Vec<LegendEntry>,
}

/// One swatch: the bucket's color and extent, labelled by its upper bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub color: String,
    pub lower: f64,
    pub upper: f64,
    pub label: String,
}

impl Legend {
    /// `None` when the legend is disabled.
    pub fn build(config: &Configuration, scale: &ColorScale) -> Option<Self> {
        if config.legend_disable {
            return None;
        }
        let title = if config.legend_title_disable {
            None
        } else {
            config.title.clone()
        };
        let entries = scale
            .palette()
            .iter()
            .enumerate()
            .filter_map(|(bucket, &color)| {
                let (lower, upper) = scale.extent(bucket)?;
                Some(LegendEntry {
                    color: to_hex(color),
                    lower,
                    upper,
                    label: format!("{:.1}", upper),
                })
            })
            .collect();
        Some(Self {
            title,
            title_font: config.legend_title_font.clone(),
            entries,
        })
    }
}
