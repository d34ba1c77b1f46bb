// ── Timer registry ──
//
// The four named timers of the mirror. Each slot holds at most one
// spawned task; one-shot slots refuse to arm while already pending.
// Every task selects on the registry's cancellation token, so shutdown
// stops all of them at their next await point.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use strum::{Display, EnumIter, IntoEnumIterator};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The fixed set of timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum TimerSlot {
    /// Periodic sweep over all systems and feeds.
    PollSweep,
    /// Periodic token renewal ahead of expiry.
    ProactiveRefresh,
    /// One-shot renewal after a 401.
    ReactiveRefresh,
    /// One-shot re-login after a failed renewal.
    ReLoginBackoff,
}

impl TimerSlot {
    fn index(self) -> usize {
        match self {
            Self::PollSweep => 0,
            Self::ProactiveRefresh => 1,
            Self::ReactiveRefresh => 2,
            Self::ReLoginBackoff => 3,
        }
    }
}

#[derive(Default)]
struct Slot {
    pending: Arc<AtomicBool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Slot {
    /// Store the slot's task handle. A previous handle is detached, never
    /// aborted: a one-shot may still be running its action when the slot
    /// is armed again.
    fn install(&self, handle: JoinHandle<()>) {
        drop(
            self.handle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .replace(handle),
        );
    }

    fn take(&self) -> Option<JoinHandle<()>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Owner of every scheduled task of one mirror run.
pub struct TimerRegistry {
    slots: [Slot; 4],
    cancel: CancellationToken,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl TimerRegistry {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            slots: Default::default(),
            cancel,
        }
    }

    fn slot(&self, slot: TimerSlot) -> &Slot {
        &self.slots[slot.index()]
    }

    /// Token cancelled on [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_pending(&self, slot: TimerSlot) -> bool {
        self.slot(slot).pending.load(Ordering::Acquire)
    }

    /// Run `action` once after `delay`, unless the slot is already pending.
    ///
    /// Returns `false` (and drops `action`) when the slot is pending or the
    /// registry is shut down. The pending flag clears right before
    /// `action` starts, so the action itself may re-arm the slot.
    pub fn arm_once<F, Fut>(&self, slot: TimerSlot, delay: Duration, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return false;
        }
        let state = self.slot(slot);
        if state
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(timer = %slot, "timer already pending, not re-armed");
            return false;
        }

        let pending = Arc::clone(&state.pending);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    pending.store(false, Ordering::Release);
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
            // Cleared before the action runs, so a 401 seen while a renewal
            // is in flight can arm the next one-shot. Overlap is prevented
            // by the session's refresh gate, not here.
            pending.store(false, Ordering::Release);
            action().await;
        });
        state.install(handle);

        info!(timer = %slot, delay_secs = delay.as_secs(), "timer armed");
        true
    }

    /// Run `action` every `period`, starting one period from now.
    ///
    /// Replaces whatever task the slot held. A tick missed because the
    /// previous action overran is skipped, not bunched.
    pub fn start_periodic<F, Fut>(&self, slot: TimerSlot, period: Duration, mut action: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.spawn(slot, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => action().await,
                }
            }
        });
        info!(timer = %slot, period_secs = period.as_secs(), "periodic timer started");
    }

    /// Hand a long-running task to a slot. The task is expected to watch
    /// [`cancel_token`](Self::cancel_token) itself.
    pub fn spawn<Fut>(&self, slot: TimerSlot, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = self.slot(slot);
        state.pending.store(true, Ordering::Release);
        let pending = Arc::clone(&state.pending);
        state.install(tokio::spawn(async move {
            task.await;
            pending.store(false, Ordering::Release);
        }));
    }

    /// Cancel every timer and wait up to `grace` for each task to return.
    ///
    /// Tasks still busy after `grace` (e.g. waiting on an HTTP response)
    /// are detached, not aborted.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        for slot in TimerSlot::iter() {
            let state = self.slot(slot);
            if let Some(handle) = state.take() {
                if tokio::time::timeout(grace, handle).await.is_err() {
                    warn!(timer = %slot, "timer task still busy after shutdown grace period");
                }
            }
            state.pending.store(false, Ordering::Release);
        }
        debug!("all timers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let read = {
            let count = Arc::clone(&count);
            move || count.load(Ordering::SeqCst)
        };
        (count, read)
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_is_single_flight() {
        let timers = TimerRegistry::default();
        let (count, fired) = counter();

        for _ in 0..3 {
            let count = Arc::clone(&count);
            timers.arm_once(TimerSlot::ReactiveRefresh, Duration::from_secs(60), move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(timers.is_pending(TimerSlot::ReactiveRefresh));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired(), 1);
        assert!(!timers.is_pending(TimerSlot::ReactiveRefresh));
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_can_rearm_after_firing() {
        let timers = TimerRegistry::default();
        let (count, fired) = counter();

        for _ in 0..2 {
            let count = Arc::clone(&count);
            assert!(timers.arm_once(TimerSlot::ReLoginBackoff, Duration::from_secs(60), move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            }));
            tokio::time::sleep(Duration::from_secs(61)).await;
        }
        assert_eq!(fired(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn running_action_may_arm_its_own_slot() {
        let timers = Arc::new(TimerRegistry::default());
        let (count, fired) = counter();

        let inner = Arc::clone(&timers);
        let rearmed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&rearmed);
        timers.arm_once(TimerSlot::ReactiveRefresh, Duration::from_secs(60), move || async move {
            let armed = inner.arm_once(TimerSlot::ReactiveRefresh, Duration::from_secs(60), move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
            flag.store(armed, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(rearmed.load(Ordering::SeqCst));
        assert!(timers.is_pending(TimerSlot::ReactiveRefresh));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slots_are_independent() {
        let timers = TimerRegistry::default();
        assert!(timers.arm_once(TimerSlot::ReactiveRefresh, Duration::from_secs(60), || async {}));
        assert!(timers.arm_once(TimerSlot::ReLoginBackoff, Duration::from_secs(60), || async {}));
        assert!(!timers.arm_once(TimerSlot::ReLoginBackoff, Duration::from_secs(1), || async {}));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_skips_the_immediate_tick() {
        let timers = TimerRegistry::default();
        let (count, fired) = counter();

        timers.start_periodic(TimerSlot::ProactiveRefresh, Duration::from_secs(3500), move || {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired(), 0);

        tokio::time::sleep(Duration::from_secs(3500 * 2)).await;
        assert_eq!(fired(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers() {
        let timers = TimerRegistry::default();
        let (count, fired) = counter();

        let c = Arc::clone(&count);
        timers.arm_once(TimerSlot::ReactiveRefresh, Duration::from_secs(60), move || async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timers.start_periodic(TimerSlot::PollSweep, Duration::from_secs(30), move || {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        timers.shutdown(Duration::from_secs(1)).await;
        assert!(!timers.is_pending(TimerSlot::ReactiveRefresh));
        assert!(!timers.is_pending(TimerSlot::PollSweep));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fired(), 0);
        assert!(!timers.arm_once(TimerSlot::ReactiveRefresh, Duration::from_secs(1), || async {}));
    }
}
