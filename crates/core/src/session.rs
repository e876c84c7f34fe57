//! Live state of one open document.
//!
//! `DocumentSession` ties the estimator to the resume flow. It performs no
//! I/O: it tells the host which page to scroll to and which writes to issue,
//! and expects monotonic [`SessionMillis`] timestamps on every call.

use thiserror::Error;

use crate::estimator::{PageGeometry, ProgressEstimator, ScrollMetrics};
use crate::model::{
    DocumentId, PageNumber, PersistedProgress, ProgressEstimate, ProgressPercent, ProgressWrite,
};
use crate::resume::{ResumeChoice, ResumeController, ResumeError, ResumeState};
use crate::settings::TrackerSettings;
use crate::time::SessionMillis;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DocumentSessionError {
    #[error("the viewer reported no pages")]
    NoPages,
    #[error(transparent)]
    Resume(#[from] ResumeError),
}

/// Instruction for the hosting viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    /// Scroll to `page`. Scroll events are ignored for `settle_ms` so the
    /// animation cannot overwrite the target with a transient reading.
    ScrollToPage { page: PageNumber, settle_ms: SessionMillis },
}

/// How a session began.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionOpening {
    /// Tracking is live from `start`.
    Started {
        start: ProgressEstimate,
        command: Option<ViewerCommand>,
    },
    /// The reader must pick resume or restart before tracking starts.
    AwaitingChoice { saved: ProgressEstimate },
}

/// Result of resolving the resume prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceOutcome {
    pub start: ProgressEstimate,
    pub command: ViewerCommand,
    /// Write to issue right away, bypassing the rate limit.
    pub write: Option<ProgressWrite>,
}

/// A significant change produced by a scroll event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollUpdate {
    pub estimate: ProgressEstimate,
    /// Set exactly once per session, on the event that first reaches 100 %.
    pub completed_now: bool,
}

#[derive(Debug, Clone)]
pub struct DocumentSession {
    document_id: DocumentId,
    total_pages: u32,
    settings: TrackerSettings,
    estimator: ProgressEstimator,
    controller: ResumeController,
    current: ProgressEstimate,
    last_reported: Option<ProgressEstimate>,
    completed: bool,
    suppress_until: Option<SessionMillis>,
}

impl DocumentSession {
    /// Open a session once the viewer has loaded `total_pages` pages.
    ///
    /// `persisted` is the stored record, or `None` if there is none or it
    /// could not be read.
    ///
    /// # Errors
    ///
    /// Returns `DocumentSessionError::NoPages` when `total_pages` is zero.
    pub fn open(
        document_id: DocumentId,
        total_pages: u32,
        persisted: Option<&PersistedProgress>,
        settings: TrackerSettings,
        now: SessionMillis,
    ) -> Result<(Self, SessionOpening), DocumentSessionError> {
        if total_pages == 0 {
            return Err(DocumentSessionError::NoPages);
        }

        let mut session = Self {
            document_id,
            total_pages,
            settings,
            estimator: ProgressEstimator::new(&settings),
            controller: ResumeController::new(),
            current: ProgressEstimate::start(),
            last_reported: None,
            completed: false,
            suppress_until: None,
        };

        let loaded = *session.controller.on_loaded(persisted)?;
        let opening = match loaded {
            ResumeState::AwaitingResumeChoice { saved } => SessionOpening::AwaitingChoice {
                saved: session.fit(saved),
            },
            _ => {
                let begun = session.controller.begin()?;
                let start = session.fit(begun);
                session.adopt(start);
                let command = (start.page > PageNumber::first())
                    .then(|| session.jump(start.page, settings.restart_settle_ms, now));
                SessionOpening::Started { start, command }
            }
        };

        Ok((session, opening))
    }

    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    #[must_use]
    pub fn state(&self) -> &ResumeState {
        self.controller.state()
    }

    /// Position shown to the reader right now.
    #[must_use]
    pub fn current(&self) -> ProgressEstimate {
        self.current
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.controller.is_tracking()
    }

    /// True while a programmatic scroll is settling.
    #[must_use]
    pub fn is_suppressed(&self, now: SessionMillis) -> bool {
        self.suppress_until.is_some_and(|until| now < until)
    }

    /// Feed one scroll event.
    ///
    /// Returns `Some` only for significant changes while tracking. Completion
    /// is sticky: once 100 % is reached the session keeps reporting 100 %
    /// while the page still follows the viewport.
    pub fn on_scroll(
        &mut self,
        metrics: &ScrollMetrics,
        geometry: &dyn PageGeometry,
        now: SessionMillis,
    ) -> Option<ScrollUpdate> {
        if !self.controller.is_tracking() || self.is_suppressed(now) {
            return None;
        }
        self.suppress_until = None;

        let mut estimate = self.estimator.estimate(metrics, geometry, self.total_pages);
        if self.completed {
            estimate.percent = ProgressPercent::COMPLETE;
        }
        self.current = estimate;

        let completed_now = !self.completed && estimate.percent.is_complete();
        if completed_now {
            self.completed = true;
        }

        if !completed_now && !self.estimator.is_significant(self.last_reported, estimate) {
            return None;
        }
        self.last_reported = Some(estimate);
        Some(ScrollUpdate {
            estimate,
            completed_now,
        })
    }

    /// Resolve the resume prompt.
    ///
    /// # Errors
    ///
    /// Returns `DocumentSessionError::Resume` if no prompt is open.
    pub fn choose(
        &mut self,
        choice: ResumeChoice,
        now: SessionMillis,
    ) -> Result<ChoiceOutcome, DocumentSessionError> {
        let chosen = self.controller.choose(choice)?;
        let start = self.fit(chosen);
        self.adopt(start);

        let (settle_ms, write) = match choice {
            ResumeChoice::Resume => (self.settings.resume_settle_ms, None),
            ResumeChoice::Restart => (
                self.settings.restart_settle_ms,
                Some(ProgressWrite::restart(self.document_id.clone())),
            ),
        };
        let command = self.jump(start.page, settle_ms, now);

        Ok(ChoiceOutcome {
            start,
            command,
            write,
        })
    }

    /// Close the session. Returns the final write, if one is due.
    ///
    /// Only a session that was tracking writes on close; closing while the
    /// prompt is open leaves the stored record untouched.
    pub fn close(&mut self) -> Option<ProgressWrite> {
        self.suppress_until = None;
        self.controller
            .close()
            .then(|| ProgressWrite::new(self.document_id.clone(), self.current))
    }

    fn adopt(&mut self, start: ProgressEstimate) {
        self.current = start;
        self.last_reported = Some(start);
        self.completed = start.percent.is_complete();
    }

    fn jump(&mut self, page: PageNumber, settle_ms: SessionMillis, now: SessionMillis) -> ViewerCommand {
        self.suppress_until = Some(now.saturating_add(settle_ms));
        ViewerCommand::ScrollToPage { page, settle_ms }
    }

    fn fit(&self, estimate: ProgressEstimate) -> ProgressEstimate {
        ProgressEstimate::new(estimate.page.clamp_to(self.total_pages), estimate.percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::MeasuredPages;
    use crate::time::fixed_now;

    const VIEWPORT: f64 = 800.0;

    fn doc() -> DocumentId {
        DocumentId::new("doc-1").unwrap()
    }

    fn record(page: u32, percent: f64) -> PersistedProgress {
        PersistedProgress {
            document_id: doc(),
            current_page: PageNumber::new(page).unwrap(),
            progress_percent: ProgressPercent::clamped(percent),
            total_pages: Some(10),
            last_accessed_at: fixed_now(),
        }
    }

    /// Ten 1000-unit pages; returns geometry and scrollable height.
    fn geometry() -> (MeasuredPages, f64) {
        let offsets = (0..10).map(|i| f64::from(i) * 1000.0).collect();
        (MeasuredPages::new(offsets, 10_000.0), 10_000.0 - VIEWPORT)
    }

    fn scroll(session: &mut DocumentSession, top: f64, now: SessionMillis) -> Option<ScrollUpdate> {
        let (geometry, scrollable) = geometry();
        session.on_scroll(&ScrollMetrics::new(top, scrollable, VIEWPORT), &geometry, now)
    }

    #[test]
    fn zero_pages_refuses_to_open() {
        let err = DocumentSession::open(doc(), 0, None, TrackerSettings::default(), 0).unwrap_err();
        assert_eq!(err, DocumentSessionError::NoPages);
    }

    #[test]
    fn partial_record_gates_tracking_until_choice() {
        let (mut session, opening) =
            DocumentSession::open(doc(), 10, Some(&record(5, 45.0)), TrackerSettings::default(), 0)
                .unwrap();

        assert!(matches!(opening, SessionOpening::AwaitingChoice { saved } if saved.page.value() == 5));
        assert!(!session.is_tracking());
        assert_eq!(session.current(), ProgressEstimate::start());
        assert!(scroll(&mut session, 4_000.0, 10).is_none());
        assert_eq!(session.current(), ProgressEstimate::start());
    }

    #[test]
    fn resume_jumps_and_suppresses_scroll_during_settle() {
        let (mut session, _) =
            DocumentSession::open(doc(), 10, Some(&record(5, 45.0)), TrackerSettings::default(), 0)
                .unwrap();

        let outcome = session.choose(ResumeChoice::Resume, 1_000).unwrap();
        assert_eq!(outcome.start.page.value(), 5);
        assert_eq!(outcome.start.percent.value(), 45.0);
        assert!(outcome.write.is_none());
        assert_eq!(
            outcome.command,
            ViewerCommand::ScrollToPage {
                page: PageNumber::new(5).unwrap(),
                settle_ms: 600,
            }
        );

        // Mid-animation reading near page 2 is ignored.
        assert!(scroll(&mut session, 1_200.0, 1_300).is_none());
        assert_eq!(session.current().page.value(), 5);

        // After the settle window, tracking resumes.
        let update = scroll(&mut session, 5_500.0, 1_700).unwrap();
        assert_eq!(update.estimate.page.value(), 6);
    }

    #[test]
    fn restart_resets_and_requests_zero_write() {
        let (mut session, _) =
            DocumentSession::open(doc(), 10, Some(&record(5, 45.0)), TrackerSettings::default(), 0)
                .unwrap();

        let outcome = session.choose(ResumeChoice::Restart, 0).unwrap();
        let write = outcome.write.unwrap();
        assert_eq!(write.current_page, PageNumber::first());
        assert_eq!(write.progress_percent, ProgressPercent::ZERO);
        assert_eq!(session.current(), ProgressEstimate::start());
        assert!(session.is_suppressed(499));
        assert!(!session.is_suppressed(500));
    }

    #[test]
    fn finished_record_opens_directly_and_is_already_complete() {
        let (mut session, opening) =
            DocumentSession::open(doc(), 10, Some(&record(10, 100.0)), TrackerSettings::default(), 0)
                .unwrap();

        let SessionOpening::Started { start, command } = opening else {
            panic!("expected a direct start");
        };
        assert_eq!(start.page.value(), 10);
        assert!(command.is_some());
        assert!(session.is_complete());

        // Scrolling back keeps the sticky 100 % and never re-notifies.
        let update = scroll(&mut session, 0.0, 1_000).unwrap();
        assert_eq!(update.estimate.page.value(), 1);
        assert!(update.estimate.percent.is_complete());
        assert!(!update.completed_now);
    }

    #[test]
    fn completion_is_reported_once() {
        let (mut session, _) =
            DocumentSession::open(doc(), 10, None, TrackerSettings::default(), 0).unwrap();

        let (_, scrollable) = geometry();
        let update = scroll(&mut session, scrollable, 100).unwrap();
        assert!(update.completed_now);
        assert_eq!(update.estimate.page.value(), 10);

        let again = scroll(&mut session, scrollable - 3_000.0, 200).unwrap();
        assert!(!again.completed_now);
        assert!(again.estimate.percent.is_complete());
    }

    #[test]
    fn small_moves_are_not_reported() {
        let (mut session, opening) =
            DocumentSession::open(doc(), 10, None, TrackerSettings::default(), 0).unwrap();
        assert!(matches!(opening, SessionOpening::Started { command: None, .. }));

        assert!(scroll(&mut session, 30.0, 10).is_none());
        assert_eq!(session.current().page.value(), 1);
        assert!(scroll(&mut session, 200.0, 20).is_some());
    }

    #[test]
    fn close_writes_only_when_tracking() {
        let (mut awaiting, _) =
            DocumentSession::open(doc(), 10, Some(&record(5, 45.0)), TrackerSettings::default(), 0)
                .unwrap();
        assert!(awaiting.close().is_none());

        let (mut active, _) =
            DocumentSession::open(doc(), 10, None, TrackerSettings::default(), 0).unwrap();
        let _ = scroll(&mut active, 3_500.0, 10);
        let write = active.close().unwrap();
        assert_eq!(write.current_page.value(), 4);
        assert!(active.close().is_none());
        assert!(scroll(&mut active, 100.0, 20).is_none());
    }

    #[test]
    fn stored_page_beyond_total_is_clamped() {
        let (session, opening) =
            DocumentSession::open(doc(), 3, Some(&record(9, 100.0)), TrackerSettings::default(), 0)
                .unwrap();
        assert!(matches!(opening, SessionOpening::Started { start, .. } if start.page.value() == 3));
        assert_eq!(session.current().page.value(), 3);
    }
}
