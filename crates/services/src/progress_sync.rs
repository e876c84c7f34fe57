//! Timer-driven delivery of progress writes.
//!
//! [`ProgressSync`] owns the deferred-write timer that [`UpdateScheduler`]
//! only describes. Writes go through a single worker task so they reach the
//! gateway in the order they were issued; a failed write is logged and
//! dropped, and the next scheduled write corrects it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pagemark_core::SessionMillis;
use pagemark_core::model::ProgressWrite;
use pagemark_core::scheduler::{ScheduleDecision, UpdateScheduler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::gateway::ProgressGateway;

/// Session-relative clock on tokio's time source, so paused-time tests drive it.
#[derive(Debug, Clone, Copy)]
struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn now_ms(self) -> SessionMillis {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(SessionMillis::MAX)
    }
}

#[derive(Debug)]
struct SyncState {
    scheduler: UpdateScheduler,
    latest: Option<ProgressWrite>,
    timer: Option<JoinHandle<()>>,
    outbox: Option<mpsc::UnboundedSender<ProgressWrite>>,
}

impl SyncState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn dispatch(&mut self, write: ProgressWrite) {
        match &self.outbox {
            Some(outbox) => {
                if outbox.send(write).is_err() {
                    tracing::warn!("progress writer stopped; dropping write");
                }
            }
            None => tracing::debug!("progress sync closed; dropping write"),
        }
    }
}

fn lock(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rate-limited, trailing-edge delivery of one document's progress writes.
///
/// Must be created inside a tokio runtime.
pub struct ProgressSync {
    state: Arc<Mutex<SyncState>>,
    clock: SessionClock,
    writer: Option<JoinHandle<()>>,
}

impl ProgressSync {
    /// Start a sync whose rate-limit window opens now, as if the stored
    /// record had just been written.
    #[must_use]
    pub fn start(gateway: Arc<dyn ProgressGateway>, min_interval_ms: SessionMillis) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(gateway, inbox));
        let state = SyncState {
            scheduler: UpdateScheduler::synced_at(min_interval_ms, 0),
            latest: None,
            timer: None,
            outbox: Some(outbox),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            clock: SessionClock::start(),
            writer: Some(writer),
        }
    }

    /// Milliseconds since this sync started.
    #[must_use]
    pub fn now_ms(&self) -> SessionMillis {
        self.clock.now_ms()
    }

    /// True while a deferred write is armed.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        lock(&self.state).scheduler.has_pending()
    }

    /// Offer a new position. It is written now or by the deferred timer,
    /// whichever the rate limit allows; the timer always writes the latest
    /// position offered before it fires.
    pub fn record(&self, write: ProgressWrite) {
        let now = self.clock.now_ms();
        let mut state = lock(&self.state);
        state.latest = Some(write.clone());

        match state.scheduler.on_change(now) {
            ScheduleDecision::SendNow => {
                tracing::debug!(at_ms = now, "progress write due now");
                state.cancel_timer();
                state.dispatch(write);
            }
            ScheduleDecision::Defer { delay_ms } => {
                tracing::debug!(at_ms = now, delay_ms, "progress write deferred");
                state.cancel_timer();
                state.timer = Some(tokio::spawn(fire_after(
                    Arc::clone(&self.state),
                    self.clock,
                    delay_ms,
                )));
            }
        }
    }

    /// Write immediately, outside the rate limit. Any deferred write is dropped.
    pub fn send_now(&self, write: ProgressWrite) {
        let now = self.clock.now_ms();
        let mut state = lock(&self.state);
        state.cancel_timer();
        state.scheduler.force_send(now);
        state.latest = Some(write.clone());
        state.dispatch(write);
    }

    /// Cancel the deferred write, queue `final_write` if given, and stop.
    ///
    /// The returned handle completes once every queued write has been
    /// attempted. Awaiting it is optional.
    pub fn close(mut self, final_write: Option<ProgressWrite>) -> Option<JoinHandle<()>> {
        {
            let mut state = lock(&self.state);
            state.cancel_timer();
            state.scheduler.reset();
            state.latest = None;
            if let Some(write) = final_write {
                state.dispatch(write);
            }
            state.outbox = None;
        }
        self.writer.take()
    }
}

impl Drop for ProgressSync {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.cancel_timer();
        state.scheduler.cancel();
        state.outbox = None;
    }
}

async fn fire_after(state: Arc<Mutex<SyncState>>, clock: SessionClock, delay_ms: SessionMillis) {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let mut state = lock(&state);
    if !state.scheduler.on_deadline(clock.now_ms()) {
        return;
    }
    state.timer = None;
    if let Some(write) = state.latest.clone() {
        tracing::debug!(at_ms = clock.now_ms(), "deferred progress write fired");
        state.dispatch(write);
    }
}

async fn run_writer(
    gateway: Arc<dyn ProgressGateway>,
    mut inbox: mpsc::UnboundedReceiver<ProgressWrite>,
) {
    while let Some(write) = inbox.recv().await {
        match gateway.set_progress(&write).await {
            Ok(stored) => tracing::debug!(
                document = %stored.document_id,
                page = stored.current_page.value(),
                percent = stored.progress_percent.value(),
                "progress saved"
            ),
            Err(err) => tracing::warn!(
                document = %write.document_id,
                error = %err,
                "failed to save progress"
            ),
        }
    }
}
