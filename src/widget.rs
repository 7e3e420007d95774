//! Mounting one widget onto one host element.

use crate::config::Configuration;
use crate::data::load_data;
use crate::error::{ConfigError, RenderError, WidgetError};
use crate::fetch::Fetch;
use crate::legend::Legend;
use crate::projection::ProjectionRegistry;
use crate::render::{PanelRenderer, Surface};
use crate::resize::PanelHandle;
use crate::scale::ColorScale;
use crate::types::Period;
use std::collections::HashMap;
use std::sync::Arc;

/// The element a widget is mounted on.
pub trait Host {
    fn attributes(&self) -> &HashMap<String, String>;
    /// Current width of the grid container, in pixels.
    fn container_width(&self) -> u32;
    fn set_title(&mut self, title: &str);
    fn append_legend(&mut self, legend: Legend);
    /// A drawing surface for the panel at `index`; failure skips that panel.
    fn create_panel(&mut self, index: usize, period: &Period) -> Result<Box<dyn Surface>, RenderError>;
}

/// What a widget needs from its environment.
pub struct Capabilities<F> {
    pub fetcher: F,
    pub projections: ProjectionRegistry,
}

/// A mounted widget: its live panels, in period order.
pub struct Widget {
    columns: usize,
    panels: Vec<PanelHandle>,
}

/// Resolves the host's options, loads and joins the data, publishes the
/// legend and draws one panel per period. Options are validated before any
/// fetch; a panel that cannot draw is skipped without failing the others.
pub async fn mount<H: Host, F: Fetch>(host: &mut H, caps: &Capabilities<F>) -> Result<Widget, WidgetError> {
    let config = Configuration::resolve(host.attributes(), &caps.projections)?;
    let projection = caps
        .projections
        .get(&config.projection)
        .ok_or_else(|| ConfigError::UnknownProjection(config.projection.clone()))?;

    let datasets = load_data(&config, &caps.fetcher).await?;
    let scale = Arc::new(ColorScale::build(&datasets, config.palette.colors()));
    match scale.domain() {
        Some((min, max)) => tracing::info!(min, max, buckets = scale.palette().len(), "color scale built"),
        None => tracing::warn!("no values to scale, every feature renders as no data"),
    }

    if let Some(title) = &config.title {
        host.set_title(title);
    }
    if let Some(legend) = Legend::build(&config, &scale) {
        host.append_legend(legend);
    }

    let limit = config.panel_limit().unwrap_or(usize::MAX);
    if datasets.len() > limit {
        tracing::info!("grid holds {} of {} periods", limit, datasets.len());
    }

    let width = panel_width(host.container_width(), config.columns);
    let mut panels = Vec::new();
    for (index, dataset) in datasets.iter().take(limit).enumerate() {
        let surface = match host.create_panel(index, &dataset.period) {
            Ok(surface) => surface,
            Err(e) => {
                tracing::warn!(period = %dataset.period, error = %e, "skipping panel");
                continue;
            }
        };
        let mut panel = PanelRenderer::new(dataset, projection.as_ref(), Arc::clone(&scale), &config, surface);
        if let Err(e) = panel.render(width) {
            tracing::warn!(period = %dataset.period, error = %e, "skipping panel");
            continue;
        }
        panels.push(PanelHandle::spawn(panel));
    }

    Ok(Widget {
        columns: config.columns,
        panels,
    })
}

fn panel_width(container_width: u32, columns: usize) -> u32 {
    let columns = u32::try_from(columns).unwrap_or(u32::MAX);
    (container_width / columns).max(1)
}

impl Widget {
    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }

    /// Feeds a new container width to every panel; each redraws once the
    /// resizes settle.
    pub fn resize(&self, container_width: u32) {
        let width = panel_width(container_width, self.columns);
        for panel in &self.panels {
            panel.resize(width);
        }
    }

    /// Waits for pending redraws and stops every panel.
    pub async fn close(self) {
        for panel in self.panels {
            panel.close().await;
        }
    }
}
