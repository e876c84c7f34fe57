//! Offline replay of recorded scroll traces through a reading session.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pagemark_core::estimator::{MeasuredPages, ScrollMetrics};
use pagemark_core::model::{DocumentId, ProgressEstimate};
use pagemark_core::resume::ResumeChoice;
use pagemark_core::session::{ScrollUpdate, SessionOpening, ViewerCommand};
use pagemark_core::settings::TrackerSettings;
use serde::Deserialize;
use services::{ProgressGateway, ReadingSession};
use tokio::time::Instant;

/// A recorded viewer session: geometry plus timestamped scroll positions.
///
/// `page_tops` may be empty when pages were never measured; the estimator
/// then assumes equal-height pages.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrollTrace {
    pub pages: u32,
    #[serde(default)]
    pub page_tops: Vec<f64>,
    pub content_height: f64,
    pub viewport_height: f64,
    #[serde(default)]
    pub events: Vec<TraceEvent>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TraceEvent {
    pub at_ms: u64,
    pub scroll_top: f64,
}

impl ScrollTrace {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid trace.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// # Errors
    ///
    /// Returns an error for malformed JSON, a trace without pages, or
    /// geometry smaller than its viewport.
    pub fn parse(raw: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let trace: Self = serde_json::from_str(raw)?;
        if trace.pages == 0 {
            return Err("trace must declare at least one page".into());
        }
        if !(trace.content_height.is_finite() && trace.viewport_height.is_finite())
            || trace.content_height < trace.viewport_height
        {
            return Err("content_height must be finite and at least viewport_height".into());
        }
        Ok(trace)
    }

    fn geometry(&self) -> MeasuredPages {
        MeasuredPages::new(self.page_tops.clone(), self.content_height)
    }

    fn metrics(&self, scroll_top: f64) -> ScrollMetrics {
        ScrollMetrics::new(
            scroll_top,
            self.content_height - self.viewport_height,
            self.viewport_height,
        )
    }
}

/// What happened while replaying a trace.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub opening: SessionOpening,
    pub commands: Vec<ViewerCommand>,
    pub updates: Vec<(u64, ScrollUpdate)>,
    pub last_position: ProgressEstimate,
}

/// Replay `trace` against `gateway`, honouring the recorded gaps between
/// events, then close the session and wait for its writes.
///
/// # Errors
///
/// Returns an error if the session cannot be opened.
pub async fn replay(
    gateway: Arc<dyn ProgressGateway>,
    document_id: DocumentId,
    trace: &ScrollTrace,
    settings: TrackerSettings,
    choice: ResumeChoice,
) -> Result<ReplayReport, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let (mut session, opening) =
        ReadingSession::open(gateway, document_id, trace.pages, settings).await?;

    let mut commands = Vec::new();
    match opening {
        SessionOpening::Started {
            command: Some(command),
            ..
        } => commands.push(command),
        SessionOpening::AwaitingChoice { .. } => {
            let outcome = session.choose(choice)?;
            commands.push(outcome.command);
        }
        SessionOpening::Started { command: None, .. } => {}
    }

    let geometry = trace.geometry();
    let mut updates = Vec::new();
    for event in &trace.events {
        tokio::time::sleep_until(started + Duration::from_millis(event.at_ms)).await;
        if let Some(update) = session.on_scroll(&trace.metrics(event.scroll_top), &geometry) {
            updates.push((event.at_ms, update));
        }
    }

    let last_position = session.current();
    if let Some(writes) = session.close() {
        writes.await?;
    }

    Ok(ReplayReport {
        opening,
        commands,
        updates,
        last_position,
    })
}
