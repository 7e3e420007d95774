use crate::color::{parse_color, sample};
use crate::error::ConfigError;
use crate::projection::{ProjectionRegistry, DEFAULT_PROJECTION};
use anyhow::{anyhow, Context, Result};
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_COLUMNS: usize = 3;
pub const DEFAULT_NUMBER_OF_COLORS: usize = 5;
pub const DEFAULT_COLOR_LOWEST: &str = "#deebf7";
pub const DEFAULT_COLOR_HIGHEST: &str = "#08519c";
pub const DEFAULT_COLOR_NO_DATA: &str = "#cccccc";
pub const DEFAULT_FONT_FAMILY: &str = "sans-serif";
pub const DEFAULT_FONT_SIZE: &str = "16px";
pub const DEFAULT_NAME_PROPERTY: &str = "name";

/// CSS font values, passed through untouched to whatever draws the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FontSpec {
    pub family: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaletteSpec {
    /// `colors` list, used verbatim.
    Explicit(Vec<Rgba<u8>>),
    /// `numberOfColors` stops from `colorLowest` to `colorHighest`.
    Interpolated {
        lowest: Rgba<u8>,
        highest: Rgba<u8>,
        count: usize,
    },
}

impl PaletteSpec {
    pub fn colors(&self) -> Vec<Rgba<u8>> {
        match self {
            PaletteSpec::Explicit(colors) => colors.clone(),
            PaletteSpec::Interpolated { lowest, highest, count } => sample(*lowest, *highest, *count),
        }
    }
}

/// Validated options of one widget instance.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub geo_src: String,
    pub src: String,
    pub columns: usize,
    pub rows: Option<usize>,
    pub projection: String,
    pub title: Option<String>,
    pub palette: PaletteSpec,
    pub color_no_data: Rgba<u8>,
    pub legend_disable: bool,
    pub legend_title_disable: bool,
    pub legend_title_font: FontSpec,
    pub label_font: FontSpec,
    pub geo_object: Option<String>,
    pub name_property: String,
    pub name_column: Option<String>,
}

impl Configuration {
    /// Resolves raw host attributes. Keys may be logical (`geoSrc`) or
    /// data-attribute style (`data-geo-src`). Empty values count as absent.
    pub fn resolve(
        attributes: &HashMap<String, String>,
        projections: &ProjectionRegistry,
    ) -> Result<Self, ConfigError> {
        let attrs: HashMap<String, &str> = attributes
            .iter()
            .map(|(k, v)| (normalize_key(k), v.trim()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let get = |key: &str| attrs.get(key).copied();

        let geo_src = get("geoSrc").ok_or(ConfigError::MissingOption("geoSrc"))?;
        let src = get("src").ok_or(ConfigError::MissingOption("src"))?;

        let projection = match get("mapProjection") {
            Some(name) if projections.contains(name) => name.to_string(),
            Some(name) => return Err(ConfigError::UnknownProjection(name.to_string())),
            None => DEFAULT_PROJECTION.to_string(),
        };

        let columns = positive_int(&get, "columns")?.unwrap_or(DEFAULT_COLUMNS);
        let rows = positive_int(&get, "rows")?;

        let count = positive_int(&get, "numberOfColors")?.unwrap_or(DEFAULT_NUMBER_OF_COLORS);
        let palette = match get("colors") {
            Some(list) => PaletteSpec::Explicit(
                list.split(':')
                    .map(|c| color_option("colors", c))
                    .collect::<Result<_, _>>()?,
            ),
            None => PaletteSpec::Interpolated {
                lowest: color_option("colorLowest", get("colorLowest").unwrap_or(DEFAULT_COLOR_LOWEST))?,
                highest: color_option("colorHighest", get("colorHighest").unwrap_or(DEFAULT_COLOR_HIGHEST))?,
                count,
            },
        };
        let color_no_data = color_option("colorNoData", get("colorNoData").unwrap_or(DEFAULT_COLOR_NO_DATA))?;

        let font = |family: &str, size: &str| FontSpec {
            family: get(family).unwrap_or(DEFAULT_FONT_FAMILY).to_string(),
            size: get(size).unwrap_or(DEFAULT_FONT_SIZE).to_string(),
        };

        Ok(Self {
            geo_src: geo_src.to_string(),
            src: src.to_string(),
            columns,
            rows,
            projection,
            title: get("title").map(str::to_string),
            palette,
            color_no_data,
            legend_disable: get("legendDisable") == Some("true"),
            legend_title_disable: get("legendTitleDisable") == Some("true"),
            legend_title_font: font("legendTitleFontFamily", "legendTitleFontSize"),
            label_font: font("labelFontFamily", "labelFontSize"),
            geo_object: get("geoObject").map(str::to_string),
            name_property: get("nameProperty").unwrap_or(DEFAULT_NAME_PROPERTY).to_string(),
            name_column: get("nameColumn").map(str::to_string),
        })
    }

    /// How many panels the grid holds; `None` when rows are unbounded or
    /// the grid is too large to count.
    pub fn panel_limit(&self) -> Option<usize> {
        self.rows?.checked_mul(self.columns)
    }
}

/// `data-geo-src` / `geo-src` -> `geoSrc`; camelCase keys pass through.
fn normalize_key(key: &str) -> String {
    let key = key.trim();
    let key = key.strip_prefix("data-").unwrap_or(key);
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '-' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn positive_int<'a>(
    get: &impl Fn(&str) -> Option<&'a str>,
    key: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(ConfigError::InvalidNumber {
                key,
                value: raw.to_string(),
            }),
        },
    }
}

fn color_option(key: &'static str, raw: &str) -> Result<Rgba<u8>, ConfigError> {
    parse_color(raw).map_err(|source| ConfigError::InvalidColor { key, source })
}

/// Page file: one `[[widget]]` table per host element, in document order.
#[derive(Debug, Deserialize, Clone)]
pub struct PageConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "widget")]
    pub widgets: Vec<toml::Table>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_container_width")]
    pub width: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            width: default_container_width(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_container_width() -> u32 {
    960
}

impl PageConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read page file: {:?}", path))?;
        let config: PageConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML page file")?;
        Ok(config)
    }

    /// Attribute maps of every widget, scalars stringified.
    pub fn widget_attributes(&self) -> Result<Vec<HashMap<String, String>>> {
        self.widgets
            .iter()
            .enumerate()
            .map(|(i, table)| {
                table
                    .iter()
                    .map(|(key, value)| {
                        let value = match value {
                            toml::Value::String(s) => s.clone(),
                            toml::Value::Integer(n) => n.to_string(),
                            toml::Value::Float(n) => n.to_string(),
                            toml::Value::Boolean(b) => b.to_string(),
                            other => {
                                return Err(anyhow!(
                                    "widget {}: attribute `{}` must be a scalar, got {}",
                                    i,
                                    key,
                                    other.type_str()
                                ))
                            }
                        };
                        Ok((key.clone(), value))
                    })
                    .collect()
            })
            .collect()
    }
}
