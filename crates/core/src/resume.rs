use thiserror::Error;

use crate::model::{PersistedProgress, ProgressEstimate};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResumeError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
}

/// The reader's answer to the resume prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    /// Continue from the saved position.
    Resume,
    /// Start over from page 1 and overwrite the saved position.
    Restart,
}

/// Lifecycle of one open document, as seen by resume handling.
///
/// ```text
/// Loading ─┬─> DirectStart ──────────┬─> Active ─> Closed
///          └─> AwaitingResumeChoice ─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResumeState {
    Loading,
    DirectStart { start: ProgressEstimate },
    AwaitingResumeChoice { saved: ProgressEstimate },
    Active,
    Closed,
}

impl ResumeState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ResumeState::Loading => "loading",
            ResumeState::DirectStart { .. } => "starting",
            ResumeState::AwaitingResumeChoice { .. } => "awaiting a resume choice",
            ResumeState::Active => "active",
            ResumeState::Closed => "closed",
        }
    }
}

/// Decides, once the stored record is known, whether to prompt the reader.
///
/// Only a started-but-unfinished record (`0 < percent < 100`) prompts. A
/// fresh or finished document opens directly at its stored page. There is no
/// timeout: while a prompt is open, tracking stays off.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeController {
    state: ResumeState,
}

impl Default for ResumeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumeController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ResumeState::Loading,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ResumeState {
        &self.state
    }

    /// True only in `Active`, the one state where scroll tracking runs.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        matches!(self.state, ResumeState::Active)
    }

    /// Apply the stored record fetched at open.
    ///
    /// `None` covers both "never read" and "record unreadable".
    ///
    /// # Errors
    ///
    /// Returns `ResumeError::InvalidTransition` outside `Loading`.
    pub fn on_loaded(
        &mut self,
        persisted: Option<&PersistedProgress>,
    ) -> Result<&ResumeState, ResumeError> {
        self.expect_state("apply a stored record", |s| {
            matches!(s, ResumeState::Loading)
        })?;

        let stored = persisted.map(PersistedProgress::estimate);
        self.state = match stored {
            Some(saved) if saved.percent.is_partial() => ResumeState::AwaitingResumeChoice { saved },
            Some(start) => ResumeState::DirectStart { start },
            None => ResumeState::DirectStart {
                start: ProgressEstimate::start(),
            },
        };
        Ok(&self.state)
    }

    /// Leave `DirectStart` and begin tracking.
    ///
    /// # Errors
    ///
    /// Returns `ResumeError::InvalidTransition` outside `DirectStart`.
    pub fn begin(&mut self) -> Result<ProgressEstimate, ResumeError> {
        match self.state {
            ResumeState::DirectStart { start } => {
                self.state = ResumeState::Active;
                Ok(start)
            }
            other => Err(ResumeError::InvalidTransition {
                from: other.name(),
                action: "begin tracking",
            }),
        }
    }

    /// Resolve the resume prompt. Returns the position the session starts from.
    ///
    /// # Errors
    ///
    /// Returns `ResumeError::InvalidTransition` when no prompt is open.
    pub fn choose(&mut self, choice: ResumeChoice) -> Result<ProgressEstimate, ResumeError> {
        match self.state {
            ResumeState::AwaitingResumeChoice { saved } => {
                self.state = ResumeState::Active;
                Ok(match choice {
                    ResumeChoice::Resume => saved,
                    ResumeChoice::Restart => ProgressEstimate::start(),
                })
            }
            other => Err(ResumeError::InvalidTransition {
                from: other.name(),
                action: "choose resume or restart",
            }),
        }
    }

    /// Enter `Closed`. Returns `true` if the session was tracking.
    pub fn close(&mut self) -> bool {
        let was_tracking = self.is_tracking();
        self.state = ResumeState::Closed;
        was_tracking
    }

    fn expect_state(
        &self,
        action: &'static str,
        allowed: impl Fn(&ResumeState) -> bool,
    ) -> Result<(), ResumeError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(ResumeError::InvalidTransition {
                from: self.state.name(),
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentId, PageNumber, ProgressPercent};
    use crate::time::fixed_now;

    fn record(page: u32, percent: f64) -> PersistedProgress {
        PersistedProgress {
            document_id: DocumentId::new("doc").unwrap(),
            current_page: PageNumber::new(page).unwrap(),
            progress_percent: ProgressPercent::clamped(percent),
            total_pages: Some(20),
            last_accessed_at: fixed_now(),
        }
    }

    #[test]
    fn partial_progress_awaits_choice() {
        let mut controller = ResumeController::new();
        let state = *controller.on_loaded(Some(&record(9, 45.0))).unwrap();
        assert!(matches!(state, ResumeState::AwaitingResumeChoice { saved } if saved.page.value() == 9));
        assert!(!controller.is_tracking());
        assert!(controller.begin().is_err());
    }

    #[test]
    fn fresh_and_finished_records_start_directly() {
        for (page, percent) in [(1, 0.0), (20, 100.0)] {
            let mut controller = ResumeController::new();
            controller.on_loaded(Some(&record(page, percent))).unwrap();
            let start = controller.begin().unwrap();
            assert_eq!(start.page.value(), page);
            assert!(controller.is_tracking());
        }
    }

    #[test]
    fn missing_record_starts_at_page_one() {
        let mut controller = ResumeController::new();
        controller.on_loaded(None).unwrap();
        assert_eq!(controller.begin().unwrap(), ProgressEstimate::start());
    }

    #[test]
    fn resume_returns_saved_position_and_restart_returns_start() {
        let mut resume = ResumeController::new();
        resume.on_loaded(Some(&record(9, 45.0))).unwrap();
        let start = resume.choose(ResumeChoice::Resume).unwrap();
        assert_eq!(start.page.value(), 9);
        assert_eq!(start.percent.value(), 45.0);
        assert!(resume.is_tracking());

        let mut restart = ResumeController::new();
        restart.on_loaded(Some(&record(9, 45.0))).unwrap();
        assert_eq!(
            restart.choose(ResumeChoice::Restart).unwrap(),
            ProgressEstimate::start()
        );
    }

    #[test]
    fn choice_without_prompt_is_rejected() {
        let mut controller = ResumeController::new();
        let err = controller.choose(ResumeChoice::Resume).unwrap_err();
        assert_eq!(
            err,
            ResumeError::InvalidTransition {
                from: "loading",
                action: "choose resume or restart",
            }
        );
    }

    #[test]
    fn closed_is_terminal() {
        let mut controller = ResumeController::new();
        controller.on_loaded(None).unwrap();
        controller.begin().unwrap();
        assert!(controller.close());
        assert!(!controller.close());
        assert!(controller.on_loaded(None).is_err());
        assert_eq!(controller.state(), &ResumeState::Closed);
    }
}
