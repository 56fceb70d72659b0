use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

pub type MaintenanceJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceRequest {
    /// A new run was started.
    Started,
    /// A run is in flight; one more will follow it.
    Coalesced,
    /// The last run is too recent.
    Throttled,
}

#[derive(Default)]
struct SchedulerState {
    running: bool,
    rerun: bool,
    last_started: Option<Instant>,
}

#[derive(Clone)]
pub struct MaintenanceScheduler {
    job: MaintenanceJob,
    interval: Duration,
    state: Arc<Mutex<SchedulerState>>,
    idle: Arc<watch::Sender<bool>>,
}

impl MaintenanceScheduler {
    pub fn new(interval: Duration, job: MaintenanceJob) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            job,
            interval,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            idle: Arc::new(idle),
        }
    }

    /// Ask for a maintenance run without waiting for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request(&self, force: bool) -> MaintenanceRequest {
        let mut state = self.lock();
        if state.running {
            state.rerun = true;
            return MaintenanceRequest::Coalesced;
        }

        let now = Instant::now();
        if !force {
            if let Some(last) = state.last_started {
                if now.duration_since(last) < self.interval {
                    return MaintenanceRequest::Throttled;
                }
            }
        }

        state.running = true;
        state.last_started = Some(now);
        self.idle.send_replace(false);
        drop(state);

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.drive().await });
        MaintenanceRequest::Started
    }

    /// Resolves once no run is in flight.
    pub async fn idle(&self) {
        let mut rx = self.idle.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    async fn drive(&self) {
        loop {
            // A panicking job must not leave the scheduler stuck in `running`.
            let job = Arc::clone(&self.job);
            if let Err(e) = tokio::spawn(async move { job().await }).await {
                tracing::warn!("Offline cache maintenance run failed: {}", e);
            }

            let rerun = {
                let mut state = self.lock();
                if state.rerun {
                    state.rerun = false;
                    state.last_started = Some(Instant::now());
                } else {
                    state.running = false;
                    self.idle.send_replace(true);
                }
                state.running
            };
            if !rerun {
                return;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
