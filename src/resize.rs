//! Debounced redraw on resize.
//!
//! Each panel owns a task fed by a channel of widths. A width arms a timer;
//! every further width within the window re-arms it, so a burst collapses to
//! one redraw at the last width once the events stop.

use crate::render::PanelRenderer;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Waits until `window` passes without a new event. Returns the last value
/// seen, and whether the channel closed meanwhile.
pub async fn settle<T>(rx: &mut mpsc::UnboundedReceiver<T>, first: T, window: Duration) -> (T, bool) {
    let mut last = first;
    let timer = sleep(window);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            _ = &mut timer => return (last, false),
            next = rx.recv() => match next {
                Some(value) => {
                    last = value;
                    timer.as_mut().reset(Instant::now() + window);
                }
                None => {
                    timer.await;
                    return (last, true);
                }
            },
        }
    }
}

/// Handle to a panel's resize task.
pub struct PanelHandle {
    events: mpsc::UnboundedSender<u32>,
    task: JoinHandle<PanelRenderer>,
}

impl PanelHandle {
    /// Takes an already rendered panel and redraws it on debounced resizes.
    pub fn spawn(panel: PanelRenderer) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watch(panel, rx));
        Self { events, task }
    }

    pub fn resize(&self, width: u32) {
        // The task only ends once every sender is gone.
        let _ = self.events.send(width);
    }

    /// Stops listening; a pending redraw still fires before this returns.
    pub async fn close(self) -> Option<PanelRenderer> {
        drop(self.events);
        match self.task.await {
            Ok(panel) => Some(panel),
            Err(e) => {
                tracing::error!(error = %e, "panel task failed");
                None
            }
        }
    }
}

async fn watch(mut panel: PanelRenderer, mut rx: mpsc::UnboundedReceiver<u32>) -> PanelRenderer {
    while let Some(first) = rx.recv().await {
        let (width, closed) = settle(&mut rx, first, DEBOUNCE).await;
        if let Err(e) = panel.render(width) {
            tracing::warn!(period = %panel.period(), error = %e, "redraw failed");
        }
        if closed {
            break;
        }
    }
    panel
}
