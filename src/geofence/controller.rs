use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    handoff::{self, AttendanceContext, HandoffError},
    location::LocationAcquirer,
};

use super::{GeofenceConfig, GeofenceState};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// What started a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    Entry,
    Retry,
    Timer,
}

struct Tracked {
    state: GeofenceState,
    /// Bumped whenever the evaluator starts, stops or hands off, so a fix
    /// that lands afterwards is dropped instead of overwriting the state.
    epoch: u64,
    active: bool,
}

struct Shared {
    config: GeofenceConfig,
    acquirer: LocationAcquirer,
    tracked: Mutex<Tracked>,
    updates: watch::Sender<GeofenceState>,
    /// Held for the whole acquisition so checks never overlap.
    acquisition: Mutex<()>,
}

struct Poller {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drives the check screen: one fix on entry, another every
/// `poll_interval` while the screen is up, and one per user retry.
///
/// Polling ends on [`shutdown`](Self::shutdown), on a successful
/// [`confirm`](Self::confirm), or when the last handle is dropped.
#[derive(Clone)]
pub struct GeofenceEvaluator {
    shared: Arc<Shared>,
    poller: Arc<Mutex<Option<Poller>>>,
    poll_interval: Duration,
}

impl GeofenceEvaluator {
    pub fn new(config: GeofenceConfig, acquirer: LocationAcquirer, poll_interval: Duration) -> Self {
        let (updates, _) = watch::channel(GeofenceState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                acquirer,
                tracked: Mutex::new(Tracked {
                    state: GeofenceState::Idle,
                    epoch: 0,
                    active: false,
                }),
                updates,
                acquisition: Mutex::new(()),
            }),
            poller: Arc::new(Mutex::new(None)),
            poll_interval,
        }
    }

    pub fn config(&self) -> &GeofenceConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> watch::Receiver<GeofenceState> {
        self.shared.updates.subscribe()
    }

    pub async fn state(&self) -> GeofenceState {
        self.shared.tracked.lock().await.state.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.shared.tracked.lock().await.active
    }

    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .map(|poller| !poller.handle.is_finished())
            .unwrap_or(false)
    }

    /// Screen entry: activates the evaluator, starts the poll timer and runs
    /// the first check.
    pub async fn start(&self) -> Result<GeofenceState> {
        self.stop_poller().await?;
        {
            let mut tracked = self.shared.tracked.lock().await;
            tracked.epoch = tracked.epoch.wrapping_add(1);
            tracked.active = true;
        }
        self.spawn_poller().await;

        Ok(run_check(&self.shared, CheckTrigger::Entry).await)
    }

    /// User-requested re-check. The only way out of `PermissionBlocked`.
    pub async fn retry(&self) -> GeofenceState {
        run_check(&self.shared, CheckTrigger::Retry).await
    }

    /// Screen teardown. Cancels the timer and returns to `Idle`.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut tracked = self.shared.tracked.lock().await;
            tracked.epoch = tracked.epoch.wrapping_add(1);
            tracked.active = false;
            tracked.state = GeofenceState::Idle;
            self.shared.updates.send_replace(GeofenceState::Idle);
        }
        self.stop_poller().await
    }

    /// Commits the current verdict into an [`AttendanceContext`] and freezes
    /// the evaluator: no further polling, no further state changes.
    pub async fn confirm(&self, user_id: Option<&str>) -> Result<AttendanceContext, HandoffError> {
        let context = {
            let mut tracked = self.shared.tracked.lock().await;
            let verdict = match (tracked.active, tracked.state.verdict()) {
                (true, Some(verdict)) => verdict,
                _ => return Err(HandoffError::NotVerified),
            };
            let context = handoff::confirm(verdict, user_id)?;
            tracked.epoch = tracked.epoch.wrapping_add(1);
            tracked.active = false;
            context
        };

        if let Err(err) = self.stop_poller().await {
            log_warn!("geofence poller did not stop cleanly after handoff: {err:#}");
        }
        log_info!(
            "attendance context frozen for user {} at ({:.6}, {:.6})",
            context.user_id(),
            context.coordinate().latitude(),
            context.coordinate().longitude()
        );
        Ok(context)
    }

    async fn spawn_poller(&self) {
        let mut poller_guard = self.poller.lock().await;
        // Dropping an old poller cancels it.
        poller_guard.take();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.shared.clone(),
            self.poll_interval,
            cancel.clone(),
        ));

        *poller_guard = Some(Poller { handle, cancel });
    }

    async fn stop_poller(&self) -> Result<()> {
        let poller = self.poller.lock().await.take();
        if let Some(mut poller) = poller {
            poller.cancel.cancel();
            (&mut poller.handle)
                .await
                .context("geofence poll task failed to join")?;
        }
        Ok(())
    }
}

async fn poll_loop(shared: Arc<Shared>, poll_interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = run_check(&shared, CheckTrigger::Timer) => {}
                }
            }
        }
    }

    log_info!("geofence poller stopped");
}

async fn run_check(shared: &Shared, trigger: CheckTrigger) -> GeofenceState {
    let _serial = match trigger {
        // A tick that finds a check already running has nothing to add.
        CheckTrigger::Timer => match shared.acquisition.try_lock() {
            Ok(guard) => guard,
            Err(_) => return shared.tracked.lock().await.state.clone(),
        },
        CheckTrigger::Entry | CheckTrigger::Retry => shared.acquisition.lock().await,
    };

    let epoch = {
        let mut tracked = shared.tracked.lock().await;
        if !tracked.active || !tracked.state.accepts(trigger) {
            return tracked.state.clone();
        }
        tracked.state = GeofenceState::Checking;
        shared.updates.send_replace(GeofenceState::Checking);
        tracked.epoch
    };

    let acquisition = shared.acquirer.acquire().await;
    if let Err(err) = &acquisition {
        log_warn!("location check ({trigger:?}) failed: {err}");
    }
    let next = GeofenceState::from_acquisition(&shared.config, acquisition);

    let mut tracked = shared.tracked.lock().await;
    if tracked.epoch != epoch {
        log_info!("discarding location fix from a superseded check");
        return tracked.state.clone();
    }
    if let Some(verdict) = next.verdict() {
        log_info!(
            "distance to target: {:.2} m (within range: {})",
            verdict.distance_meters,
            verdict.within_range
        );
    }
    tracked.state = next.clone();
    shared.updates.send_replace(next.clone());
    next
}
