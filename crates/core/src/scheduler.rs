use crate::time::SessionMillis;

//
// ─── DECISION ──────────────────────────────────────────────────────────────────
//

/// What the host should do with a fresh reading position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Write now; any pending deferred write has been cancelled.
    SendNow,
    /// Arm (or re-arm) the deferred write to fire after `delay_ms`.
    ///
    /// The deferred write must read the latest position when it fires, not
    /// the one that caused it to be armed.
    Defer { delay_ms: SessionMillis },
}

//
// ─── UPDATE SCHEDULER ──────────────────────────────────────────────────────────
//

/// Rate limiter for progress writes with a trailing-edge send.
///
/// The scheduler only holds timestamps; it never owns a timer. The host arms
/// a real timer on `Defer`, calls [`UpdateScheduler::on_deadline`] when it
/// fires, and cancels it whenever the scheduler says so.
///
/// Guarantees, given the host follows the decisions:
/// - at most one write per `min_interval_ms` under continuous input;
/// - the last change before input stops is always written.
///
/// # Examples
///
/// ```
/// # use pagemark_core::scheduler::{ScheduleDecision, UpdateScheduler};
/// let mut scheduler = UpdateScheduler::new(1_000);
/// assert_eq!(scheduler.on_change(0), ScheduleDecision::SendNow);
/// assert_eq!(scheduler.on_change(100), ScheduleDecision::Defer { delay_ms: 900 });
/// assert!(scheduler.on_deadline(1_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateScheduler {
    min_interval_ms: SessionMillis,
    last_sent_at: Option<SessionMillis>,
    pending_deadline: Option<SessionMillis>,
}

impl UpdateScheduler {
    #[must_use]
    pub fn new(min_interval_ms: SessionMillis) -> Self {
        Self {
            min_interval_ms,
            last_sent_at: None,
            pending_deadline: None,
        }
    }

    /// A scheduler whose window starts at `now`, as if a write had just
    /// happened. Used when a session opens: the stored record already matches
    /// the session, so the first change waits out the interval.
    #[must_use]
    pub fn synced_at(min_interval_ms: SessionMillis, now: SessionMillis) -> Self {
        Self {
            min_interval_ms,
            last_sent_at: Some(now),
            pending_deadline: None,
        }
    }

    #[must_use]
    pub fn last_sent_at(&self) -> Option<SessionMillis> {
        self.last_sent_at
    }

    #[must_use]
    pub fn pending_deadline(&self) -> Option<SessionMillis> {
        self.pending_deadline
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_deadline.is_some()
    }

    /// Record a qualifying change at `now`.
    pub fn on_change(&mut self, now: SessionMillis) -> ScheduleDecision {
        let since_last = self
            .last_sent_at
            .map(|sent| now.saturating_sub(sent));

        match since_last {
            Some(elapsed) if elapsed < self.min_interval_ms => {
                let delay_ms = self.min_interval_ms - elapsed;
                self.pending_deadline = Some(now + delay_ms);
                ScheduleDecision::Defer { delay_ms }
            }
            _ => {
                self.mark_sent(now);
                ScheduleDecision::SendNow
            }
        }
    }

    /// The deferred timer fired at `now`. Returns `true` if a write is due.
    ///
    /// A stale timer (one that was replaced or cancelled but still fired)
    /// returns `false`.
    pub fn on_deadline(&mut self, now: SessionMillis) -> bool {
        match self.pending_deadline {
            Some(deadline) if now >= deadline => {
                self.mark_sent(now);
                true
            }
            _ => false,
        }
    }

    /// Write outside the rate limit (restart, session teardown).
    pub fn force_send(&mut self, now: SessionMillis) {
        self.mark_sent(now);
    }

    /// Drop any pending deferred write.
    pub fn cancel(&mut self) {
        self.pending_deadline = None;
    }

    /// Forget all history, as when the session it served has closed.
    pub fn reset(&mut self) {
        self.last_sent_at = None;
        self.pending_deadline = None;
    }

    fn mark_sent(&mut self, now: SessionMillis) {
        self.last_sent_at = Some(now);
        self.pending_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_change_sends_immediately() {
        let mut scheduler = UpdateScheduler::new(1_000);
        assert_eq!(scheduler.on_change(5), ScheduleDecision::SendNow);
        assert_eq!(scheduler.last_sent_at(), Some(5));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn burst_inside_window_collapses_to_one_deferred_send() {
        let mut scheduler = UpdateScheduler::new(1_000);
        scheduler.force_send(0);

        assert_eq!(
            scheduler.on_change(100),
            ScheduleDecision::Defer { delay_ms: 900 }
        );
        assert_eq!(
            scheduler.on_change(900),
            ScheduleDecision::Defer { delay_ms: 100 }
        );
        assert_eq!(scheduler.pending_deadline(), Some(1_000));

        assert!(!scheduler.on_deadline(999));
        assert!(scheduler.on_deadline(1_000));
        assert_eq!(scheduler.last_sent_at(), Some(1_000));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn change_after_window_sends_and_clears_pending() {
        let mut scheduler = UpdateScheduler::new(1_000);
        scheduler.force_send(0);
        let _ = scheduler.on_change(400);
        assert!(scheduler.has_pending());

        assert_eq!(scheduler.on_change(1_500), ScheduleDecision::SendNow);
        assert!(!scheduler.has_pending());
        assert!(!scheduler.on_deadline(1_600));
    }

    #[test]
    fn cancelled_deadline_does_not_fire() {
        let mut scheduler = UpdateScheduler::new(1_000);
        scheduler.force_send(0);
        let _ = scheduler.on_change(200);
        scheduler.cancel();
        assert!(!scheduler.on_deadline(1_000));
        assert_eq!(scheduler.last_sent_at(), Some(0));
    }

    #[test]
    fn synced_scheduler_defers_events_at_open() {
        let mut scheduler = UpdateScheduler::synced_at(1_000, 0);
        assert_eq!(
            scheduler.on_change(0),
            ScheduleDecision::Defer { delay_ms: 1_000 }
        );
        let _ = scheduler.on_change(100);
        let _ = scheduler.on_change(900);
        assert_eq!(scheduler.pending_deadline(), Some(1_000));
    }

    #[test]
    fn reset_forgets_history() {
        let mut scheduler = UpdateScheduler::new(1_000);
        scheduler.force_send(10);
        let _ = scheduler.on_change(20);
        scheduler.reset();
        assert!(!scheduler.has_pending());
        assert_eq!(scheduler.last_sent_at(), None);
        assert_eq!(scheduler.on_change(30), ScheduleDecision::SendNow);
    }
}
