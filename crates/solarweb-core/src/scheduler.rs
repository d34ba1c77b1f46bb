// ── Mirror scheduler ──
//
// Full lifecycle of one mirror run: login, discovery, periodic sweeps,
// proactive and reactive token refresh, re-login backoff, inbound
// Refresh commands, and shutdown. All timers live in one
// `TimerRegistry`; all run state lives in one `MirrorContext`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use solarweb_api::Error as ApiError;
use strum::Display;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::catalog::{Device, FeedContext, FeedDescriptor};
use crate::config::MirrorConfig;
use crate::context::MirrorContext;
use crate::error::CoreError;
use crate::policy::{FailureAction, FailurePolicy};
use crate::projector::JsonTreeProjector;
use crate::store::{CommandWrite, ScalarValue, StateSink};
use crate::timers::{TimerRegistry, TimerSlot};

/// How long shutdown waits for each timer task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ── MirrorState ──────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MirrorState {
    Stopped,
    Starting,
    Running,
    /// The initial login was rejected; nothing is scheduled.
    LoginFailed,
}

// ── SweepReport ──────────────────────────────────────────────────

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Feed requests issued.
    pub requests: usize,
    /// Feeds whose payload was projected.
    pub projected: usize,
    /// Feeds that answered without data.
    pub empty: usize,
    /// Feeds skipped after a transient failure.
    pub failed: usize,
    /// Feeds answered with 401.
    pub unauthorized: usize,
    /// Feeds disabled during this sweep.
    pub disabled: Vec<String>,
    /// The sweep stopped early because no session was available.
    pub aborted: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

// ── Scheduler ────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SchedulerInner>`. Call
/// [`start()`](Self::start) for a long-running mirror or
/// [`run_once()`](Self::run_once) for a single sweep.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    ctx: MirrorContext,
    timers: TimerRegistry,
    /// Serializes sweeps; periodic, requested and command sweeps never overlap.
    sweep_lock: Mutex<()>,
    sweep_tx: mpsc::Sender<()>,
    sweep_rx: Mutex<Option<mpsc::Receiver<()>>>,
    state: watch::Sender<MirrorState>,
    last_sweep: watch::Sender<Arc<SweepReport>>,
}

impl Scheduler {
    /// Create a scheduler. Does NOT log in; call [`start()`](Self::start).
    pub fn new(config: MirrorConfig, sink: Arc<dyn StateSink>) -> Result<Self, CoreError> {
        Ok(Self::from_context(MirrorContext::new(config, sink)?))
    }

    pub fn from_context(ctx: MirrorContext) -> Self {
        // Capacity 1: a queued request already covers any later ones.
        let (sweep_tx, sweep_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(MirrorState::Stopped);
        let (last_sweep, _) = watch::channel(Arc::new(SweepReport::default()));

        Self {
            inner: Arc::new(SchedulerInner {
                ctx,
                timers: TimerRegistry::default(),
                sweep_lock: Mutex::new(()),
                sweep_tx,
                sweep_rx: Mutex::new(Some(sweep_rx)),
                state,
                last_sweep,
            }),
        }
    }

    /// The shared run context (session, catalogs, sink).
    pub fn context(&self) -> &MirrorContext {
        &self.inner.ctx
    }

    pub fn state(&self) -> watch::Receiver<MirrorState> {
        self.inner.state.subscribe()
    }

    pub fn last_sweep(&self) -> watch::Receiver<Arc<SweepReport>> {
        self.inner.last_sweep.subscribe()
    }

    pub fn is_timer_pending(&self, slot: TimerSlot) -> bool {
        self.inner.timers.is_pending(slot)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Log in, discover, run the first sweep and start all timers.
    ///
    /// A rejected login is terminal: the error is returned, the state
    /// becomes [`MirrorState::LoginFailed`] and nothing is scheduled.
    /// `commands` delivers inbound writes to the per-system Refresh leaves.
    pub async fn start(
        &self,
        commands: Option<broadcast::Receiver<CommandWrite>>,
    ) -> Result<(), CoreError> {
        let Some(requests) = self.inner.sweep_rx.lock().await.take() else {
            return Err(CoreError::Config {
                message: "mirror already started".into(),
            });
        };

        self.inner.state.send_replace(MirrorState::Starting);
        let ctx = &self.inner.ctx;
        ctx.session.mark_disconnected();

        if let Err(e) = ctx.session.login().await {
            self.inner.state.send_replace(MirrorState::LoginFailed);
            error!(error = %e, "initial login failed, mirror idle until restarted");
            return Err(e);
        }

        self.discover().await;
        self.sweep().await;

        let period = ctx.config.effective_poll_interval();
        let worker = self.clone();
        self.inner.timers.spawn(
            TimerSlot::PollSweep,
            worker.sweep_worker(requests, commands, period),
        );
        info!(period_secs = period.as_secs(), "poll sweep started");

        let refresher = self.clone();
        self.inner.timers.start_periodic(
            TimerSlot::ProactiveRefresh,
            ctx.config.proactive_refresh,
            move || {
                let scheduler = refresher.clone();
                async move { scheduler.refresh_session().await }
            },
        );

        self.inner.state.send_replace(MirrorState::Running);
        Ok(())
    }

    /// Login, discovery and a single sweep; no timers are started.
    pub async fn run_once(&self) -> Result<SweepReport, CoreError> {
        let ctx = &self.inner.ctx;
        ctx.session.mark_disconnected();
        ctx.session.login().await?;
        self.discover().await;
        let report = self.sweep().await;
        ctx.session.mark_disconnected();
        Ok(report)
    }

    /// Cancel all timers and mark the mirror offline.
    ///
    /// In-flight requests are allowed to finish; their results may still
    /// land in the sink.
    pub async fn shutdown(&self) {
        self.inner.timers.shutdown(SHUTDOWN_GRACE).await;
        self.inner.ctx.session.mark_disconnected();
        self.inner.state.send_replace(MirrorState::Stopped);
        debug!("mirror stopped");
    }

    // ── Discovery ────────────────────────────────────────────────

    async fn discover(&self) {
        let ctx = &self.inner.ctx;
        let Some(token) = ctx.session.access_token() else {
            warn!("no session, skipping discovery");
            return;
        };
        match ctx.devices.discover(&ctx.client, &token, ctx.sink.as_ref()).await {
            Ok(count) => info!(systems = count, "discovery complete"),
            Err(e) => warn!(error = %e, "discovery failed, nothing will be polled this run"),
        }
    }

    // ── Sweeps ───────────────────────────────────────────────────

    /// Queue an out-of-cycle sweep. Returns `false` if one is already queued.
    pub fn request_sweep(&self) -> bool {
        self.inner.sweep_tx.try_send(()).is_ok()
    }

    /// Fetch every enabled feed of every system and project the results.
    pub async fn sweep(&self) -> SweepReport {
        let _guard = self.inner.sweep_lock.lock().await;
        let ctx = &self.inner.ctx;
        let devices = ctx.devices.devices();
        let now = Utc::now();
        let mut report = SweepReport::default();

        'systems: for device in devices.iter() {
            let feed_ctx = FeedContext::at(&device.id, device.aux_unit_id.as_deref(), now);
            for feed in ctx.feeds.iter() {
                // Checked per request: a 403 earlier in this sweep counts.
                if !feed.is_enabled() {
                    continue;
                }
                let Some(url) = feed.render_url(&feed_ctx) else {
                    continue;
                };
                let Some(token) = ctx.session.access_token() else {
                    debug!("no session, sweep stopped");
                    report.aborted = true;
                    break 'systems;
                };

                report.requests += 1;
                match ctx.client.fetch_feed(&token, &url).await {
                    Ok(Some(data)) => {
                        let mount = device.path.child(feed.path.as_str());
                        JsonTreeProjector::new(feed.projection_options()).project(
                            ctx.sink.as_ref(),
                            &data,
                            &mount,
                        );
                        report.projected += 1;
                    }
                    Ok(None) => report.empty += 1,
                    Err(e) => self.handle_feed_error(&e, feed, device, &mut report),
                }
            }
        }

        report.finished_at = Some(Utc::now());
        debug!(
            requests = report.requests,
            projected = report.projected,
            failed = report.failed,
            "sweep complete"
        );
        self.inner.last_sweep.send_replace(Arc::new(report.clone()));
        report
    }

    fn handle_feed_error(
        &self,
        err: &ApiError,
        feed: &FeedDescriptor,
        device: &Device,
        report: &mut SweepReport,
    ) {
        match FailurePolicy::classify(err, feed) {
            FailureAction::RefreshSession => {
                report.unauthorized += 1;
                warn!(system = %device.id, feed = %feed.path, "token rejected");
                self.arm_reactive_refresh();
            }
            FailureAction::DisableTier(tier) => {
                report
                    .disabled
                    .extend(self.inner.ctx.feeds.disable_tier(tier));
            }
            FailureAction::SkipFeed => {
                report.failed += 1;
                warn!(system = %device.id, feed = %feed.path, error = %err, "feed fetch failed");
            }
        }
    }

    async fn sweep_worker(
        self,
        mut requests: mpsc::Receiver<()>,
        mut commands: Option<broadcast::Receiver<CommandWrite>>,
        period: Duration,
    ) {
        let cancel = self.inner.timers.cancel_token();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // the first sweep already ran in start()

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep().await;
                }
                Some(()) = requests.recv() => {
                    self.sweep().await;
                }
                cmd = next_command(&mut commands) => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("command channel closed");
                        commands = None;
                    }
                },
            }
        }
    }

    async fn handle_command(&self, cmd: CommandWrite) {
        let ctx = &self.inner.ctx;
        let Some(device) = ctx.devices.by_refresh_path(&cmd.path) else {
            debug!(path = %cmd.path, "ignoring write to unknown command node");
            return;
        };
        if cmd.value.as_bool() != Some(true) {
            return;
        }

        info!(system = %device.id, "refresh requested");
        ctx.sink.set_value(&cmd.path, ScalarValue::Bool(true), true);
        self.sweep().await;
    }

    // ── Token lifecycle ──────────────────────────────────────────

    /// Arm the one-shot reactive refresh. Returns `false` if it is
    /// already pending.
    pub fn arm_reactive_refresh(&self) -> bool {
        let scheduler = self.clone();
        self.inner.timers.arm_once(
            TimerSlot::ReactiveRefresh,
            self.inner.ctx.config.reactive_refresh_delay,
            move || async move { scheduler.refresh_session().await },
        )
    }

    /// Renew the token now; on failure arm the re-login backoff.
    pub async fn refresh_session(&self) {
        match self.inner.ctx.session.refresh().await {
            Ok(outcome) => debug!(?outcome, "refresh finished"),
            Err(e) => {
                warn!(error = %e, "session lost, scheduling re-login");
                self.arm_relogin();
            }
        }
    }

    fn arm_relogin(&self) -> bool {
        let scheduler = self.clone();
        self.inner.timers.arm_once(
            TimerSlot::ReLoginBackoff,
            self.inner.ctx.config.relogin_backoff,
            move || async move {
                if let Err(e) = scheduler.inner.ctx.session.login().await {
                    warn!(error = %e, "re-login failed, next attempt with the periodic refresh");
                }
            },
        )
    }
}

/// Next inbound command, or `None` once the channel closes. Pends
/// forever when there is no channel.
async fn next_command(
    commands: &mut Option<broadcast::Receiver<CommandWrite>>,
) -> Option<CommandWrite> {
    let Some(rx) = commands.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(cmd) => return Some(cmd),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "command receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
