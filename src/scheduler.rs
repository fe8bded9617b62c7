//! Periodic expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::directory::RoleDirectory;
use crate::engine::Engine;
use crate::notify::{Event, Notifier};
use crate::store::GrantStore;
use crate::types::RoleId;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_TICK_TIMEOUT: Duration = Duration::from_secs(30);

type RoleNames = Arc<dyn Fn(&RoleId) -> String + Send + Sync>;

/// Fires [`Engine::sweep`] on a fixed interval.
///
/// Each tick runs in its own task. The scheduler waits at most the tick
/// timeout for it; a sweep that overruns keeps running in the background and
/// later ticks are skipped until it finishes, so a revoke is never cut off
/// between the directory call and the store write.
pub struct SweepScheduler<S, D, N> {
    engine: Arc<Engine<S, D>>,
    notifier: Arc<N>,
    interval: Duration,
    tick_timeout: Duration,
    role_names: RoleNames,
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stops the scheduler and waits for its loop to exit.
    ///
    /// A sweep already in flight is left to complete on its own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "sweep scheduler task failed");
        }
    }
}

impl<S, D, N> SweepScheduler<S, D, N>
where
    S: GrantStore + 'static,
    D: RoleDirectory + 'static,
    N: Notifier + 'static,
{
    /// Creates a scheduler with a 60 second interval and 30 second tick timeout.
    pub fn new(engine: Arc<Engine<S, D>>, notifier: Arc<N>) -> Self {
        Self {
            engine,
            notifier,
            interval: DEFAULT_INTERVAL,
            tick_timeout: DEFAULT_TICK_TIMEOUT,
            role_names: Arc::new(|role: &RoleId| role.to_string()),
        }
    }

    /// Sets the time between ticks.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how long a tick waits for its sweep.
    pub fn tick_timeout(mut self, timeout: Duration) -> Self {
        self.tick_timeout = timeout;
        self
    }

    /// Sets how role ids are displayed in expiry events, e.g. through
    /// [`Config::role_name`](crate::Config::role_name). Defaults to the raw id.
    pub fn role_names(
        mut self,
        resolve: impl Fn(&RoleId) -> String + Send + Sync + 'static,
    ) -> Self {
        self.role_names = Arc::new(resolve);
        self
    }

    /// Spawns the scheduler loop on the current runtime.
    pub fn spawn(self) -> SweepHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SweepHandle { shutdown, task }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            tick_timeout_secs = self.tick_timeout.as_secs_f64(),
            "sweep scheduler started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("sweep scheduler shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if in_flight.as_ref().is_some_and(|task| !task.is_finished()) {
                        warn!("previous sweep still running; skipping tick");
                        continue;
                    }
                    in_flight = self.tick().await;
                }
            }
        }
    }

    /// Runs one sweep, returning its task if it outlived the tick timeout.
    async fn tick(&self) -> Option<JoinHandle<()>> {
        let engine = Arc::clone(&self.engine);
        let notifier = Arc::clone(&self.notifier);
        let role_names = Arc::clone(&self.role_names);
        let mut task = tokio::spawn(async move {
            match engine.sweep(Utc::now()).await {
                Ok(revoked) => {
                    debug!(count = revoked.len(), "sweep finished");
                    for revocation in revoked {
                        let name = role_names(&revocation.grant.role_id);
                        notifier
                            .notify(Event::grant_expired(&revocation.subject, &name))
                            .await;
                    }
                }
                Err(err) => error!(error = %err, "sweep failed"),
            }
        });

        match tokio::time::timeout(self.tick_timeout, &mut task).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                error!(error = %err, "sweep task panicked");
                None
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.tick_timeout.as_secs_f64(),
                    "sweep exceeded tick timeout; continuing in background"
                );
                Some(task)
            }
        }
    }
}
