pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod fetch;
pub mod host;
pub mod legend;
pub mod projection;
pub mod render;
pub mod resize;
pub mod scale;
pub mod topology;
pub mod types;
pub mod widget;

use anyhow::bail;
use clap::{Parser, Subcommand};
use config::{Configuration, PageConfig};
use fetch::SourceFetcher;
use host::DirectoryHost;
use projection::ProjectionRegistry;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use widget::{mount, Capabilities};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every widget of a page file to PNG panels
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "page.toml")]
        config: PathBuf,
        /// Resize the container to this width after the first draw
        #[arg(long, value_name = "PX")]
        resize: Option<u32>,
    },
    /// Validate every widget's options without fetching anything
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "page.toml")]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, resize } => render(config, *resize).await,
        Commands::Check { config } => check(config),
    }
}

async fn render(path: &Path, resize: Option<u32>) -> anyhow::Result<()> {
    let page = PageConfig::load_from_file(path)?;
    let widgets = page.widget_attributes()?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let caps = Capabilities {
        fetcher: SourceFetcher::new(base_dir),
        projections: ProjectionRegistry::default(),
    };
    tracing::info!(widgets = widgets.len(), page = ?path, "rendering page");

    let total = widgets.len();
    let mut mounted = Vec::new();
    let mut failed = 0;
    for (i, attributes) in widgets.into_iter().enumerate() {
        let dir = page.output.dir.join(format!("widget-{}", i));
        let mut host = match DirectoryHost::new(dir, attributes, page.output.width) {
            Ok(host) => host,
            Err(e) => {
                failed += 1;
                tracing::error!("widget {}: {:#}", i, e);
                continue;
            }
        };
        match mount(&mut host, &caps).await {
            Ok(widget) => mounted.push((i, host, widget)),
            Err(e) => {
                failed += 1;
                tracing::error!("widget {}: {:#}", i, anyhow::Error::new(e));
            }
        }
    }

    if let Some(width) = resize {
        for (_, _, widget) in &mounted {
            widget.resize(width);
        }
    }

    for (i, host, widget) in mounted {
        let panels = widget.panel_count();
        widget.close().await;
        match host.write_manifest() {
            Ok(manifest) => tracing::info!(panels, manifest = ?manifest, "widget written"),
            Err(e) => {
                failed += 1;
                tracing::error!("widget {}: {:#}", i, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} widgets failed", failed, total);
    }
    Ok(())
}

fn check(path: &Path) -> anyhow::Result<()> {
    let page = PageConfig::load_from_file(path)?;
    let projections = ProjectionRegistry::default();
    let widgets = page.widget_attributes()?;

    let mut failed = 0;
    for (i, attributes) in widgets.iter().enumerate() {
        match Configuration::resolve(attributes, &projections) {
            Ok(config) => tracing::info!(
                "widget {}: {} + {}, {} projection, {} colors",
                i,
                config.geo_src,
                config.src,
                config.projection,
                config.palette.colors().len()
            ),
            Err(e) => {
                failed += 1;
                tracing::error!("widget {}: {}", i, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} widgets are misconfigured", failed, widgets.len());
    }
    Ok(())
}
