use std::sync::Arc;

use pagemark_core::estimator::{PageGeometry, ScrollMetrics};
use pagemark_core::model::{DocumentId, ProgressEstimate, ProgressWrite};
use pagemark_core::resume::{ResumeChoice, ResumeState};
use pagemark_core::session::{ChoiceOutcome, DocumentSession, ScrollUpdate, SessionOpening};
use pagemark_core::settings::TrackerSettings;
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::gateway::ProgressGateway;
use crate::progress_sync::ProgressSync;

/// One open document wired to a progress gateway.
///
/// Scroll events are estimated and rate-limited here; writes leave through
/// [`ProgressSync`] without blocking the caller.
pub struct ReadingSession {
    session: DocumentSession,
    sync: ProgressSync,
}

impl ReadingSession {
    /// Load the stored position and open the session.
    ///
    /// A failed or unreadable load is treated as "no prior progress".
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Document` when `total_pages` is zero.
    pub async fn open(
        gateway: Arc<dyn ProgressGateway>,
        document_id: DocumentId,
        total_pages: u32,
        settings: TrackerSettings,
    ) -> Result<(Self, SessionOpening), SessionError> {
        let persisted = match gateway.get_progress(&document_id).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    document = %document_id,
                    error = %err,
                    "could not load saved progress; starting fresh"
                );
                None
            }
        };

        let sync = ProgressSync::start(gateway, settings.min_interval_ms);
        let (session, opening) = DocumentSession::open(
            document_id,
            total_pages,
            persisted.as_ref(),
            settings,
            sync.now_ms(),
        )?;

        match &opening {
            SessionOpening::Started { start, .. } => tracing::info!(
                document = %session.document_id(),
                page = start.page.value(),
                percent = start.percent.value(),
                "reading session started"
            ),
            SessionOpening::AwaitingChoice { saved } => tracing::info!(
                document = %session.document_id(),
                page = saved.page.value(),
                percent = saved.percent.value(),
                "awaiting resume choice"
            ),
        }

        Ok((Self { session, sync }, opening))
    }

    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        self.session.document_id()
    }

    #[must_use]
    pub fn state(&self) -> &ResumeState {
        self.session.state()
    }

    #[must_use]
    pub fn current(&self) -> ProgressEstimate {
        self.session.current()
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.session.is_tracking()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    /// True while a deferred write is armed.
    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        self.sync.has_pending()
    }

    /// Feed one scroll event from the viewer.
    pub fn on_scroll(
        &mut self,
        metrics: &ScrollMetrics,
        geometry: &dyn PageGeometry,
    ) -> Option<ScrollUpdate> {
        let now = self.sync.now_ms();
        let update = self.session.on_scroll(metrics, geometry, now)?;

        if update.completed_now {
            tracing::info!(document = %self.session.document_id(), "document finished");
        }
        self.sync.record(ProgressWrite::new(
            self.session.document_id().clone(),
            update.estimate,
        ));
        Some(update)
    }

    /// Resolve the resume prompt. A restart is written immediately.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Document` when no prompt is open.
    pub fn choose(&mut self, choice: ResumeChoice) -> Result<ChoiceOutcome, SessionError> {
        let outcome = self.session.choose(choice, self.sync.now_ms())?;
        tracing::info!(
            document = %self.session.document_id(),
            ?choice,
            page = outcome.start.page.value(),
            "resume choice applied"
        );
        if let Some(write) = &outcome.write {
            self.sync.send_now(write.clone());
        }
        Ok(outcome)
    }

    /// Close the session and issue the final write, if one is due.
    ///
    /// The handle resolves once pending writes have been attempted.
    pub fn close(mut self) -> Option<JoinHandle<()>> {
        let final_write = self.session.close();
        tracing::info!(
            document = %self.session.document_id(),
            final_write = final_write.is_some(),
            "reading session closed"
        );
        self.sync.close(final_write)
    }
}
