use thiserror::Error;

/// A color string that does not match any accepted color syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color: {0:?}")]
pub struct ColorError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option `{0}`")]
    MissingOption(&'static str),

    #[error("unknown projection {0:?}")]
    UnknownProjection(String),

    #[error("option `{key}` must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("option `{key}`: {source}")]
    InvalidColor {
        key: &'static str,
        #[source]
        source: ColorError,
    },
}

/// Fetch or parse failure. Carries the resource it came from and the cause.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {src}")]
    Fetch {
        src: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse {src}")]
    Parse {
        src: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no drawing context available for a {width}x{height} surface")]
    NoContext { width: u32, height: u32 },

    #[error("failed to write panel image")]
    Image(#[from] image::ImageError),
}

/// Anything that halts one widget instance.
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),
}
