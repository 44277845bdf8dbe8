//! Scheduling and mutual exclusion
//!
//! Three triggers share one engine: a realtime polling loop, a fixed-delay
//! catch-up timer and a daily full pass. A non-blocking advisory lock
//! guarantees at most one pass executes at any instant; a trigger that
//! finds the lock held skips its turn instead of queueing. The lock is
//! load-bearing for the no-duplicate-open-conflict guarantee, not just a
//! throughput knob.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::engine::{SyncEngine, SyncReport};

const ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Serializes `sync_once` calls across every trigger source
pub struct SyncCoordinator {
    engine: Arc<SyncEngine>,
    pass_lock: Arc<Mutex<()>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            pass_lock: Arc::new(Mutex::new(())),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the background triggers enabled by `settings`
    pub fn start(&self, settings: &SyncSettings) {
        if settings.enabled {
            self.spawn_task(Self::realtime_loop(
                self.engine.clone(),
                self.pass_lock.clone(),
                settings.poll_interval,
                self.shutdown_tx.subscribe(),
            ));
        }
        if settings.schedule.enabled {
            self.spawn_task(Self::fixed_delay_loop(
                self.engine.clone(),
                self.pass_lock.clone(),
                settings.schedule.fixed_delay,
                self.shutdown_tx.subscribe(),
            ));
            self.spawn_task(Self::daily_loop(
                self.engine.clone(),
                self.pass_lock.clone(),
                settings.schedule.daily_at,
                settings.schedule.utc_offset,
                self.shutdown_tx.subscribe(),
            ));
        }
        if !settings.enabled && !settings.schedule.enabled {
            info!("Synchronization triggers are disabled");
        }
    }

    /// Run a pass now unless one is already executing
    pub async fn run_now(&self) -> Option<SyncReport> {
        Self::guarded_pass(&self.engine, &self.pass_lock, "manual").await
    }

    /// Stop every trigger and wait for in-flight work to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    warn!("Sync task panicked during shutdown: {err}");
                }
            }
        }
    }

    fn spawn_task(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tokio::spawn(task));
    }

    /// The pass body runs on the blocking pool: `sync_once` does database
    /// I/O, and the advisory guard must be acquired and released on the
    /// same thread without crossing an await point.
    async fn guarded_pass(
        engine: &Arc<SyncEngine>,
        pass_lock: &Arc<Mutex<()>>,
        trigger: &'static str,
    ) -> Option<SyncReport> {
        let engine = engine.clone();
        let pass_lock = pass_lock.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let guard = match pass_lock.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return None,
                // a panicked pass must not wedge the scheduler
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            let report = engine.sync_once();
            drop(guard);
            Some(report)
        })
        .await;

        match outcome {
            Ok(Some(report)) => Some(report),
            Ok(None) => {
                debug!("Skipping {trigger} sync trigger: a pass is already running");
                None
            }
            Err(err) => {
                warn!("Sync pass task failed for {trigger} trigger: {err}");
                None
            }
        }
    }

    /// Poll continuously; on failure log, back off and resume. The loop
    /// exits only on shutdown.
    async fn realtime_loop(
        engine: Arc<SyncEngine>,
        pass_lock: Arc<Mutex<()>>,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Realtime sync loop started (poll interval {poll_interval:?})");
        loop {
            if *shutdown.borrow() {
                return;
            }
            let delay = match Self::guarded_pass(&engine, &pass_lock, "realtime").await {
                Some(report) if report.has_errors() => ERROR_BACKOFF,
                _ => poll_interval,
            };
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    info!("Realtime sync loop stopping");
                    return;
                }
            }
        }
    }

    /// Catch-up timer; a slot that finds a pass running is dropped
    async fn fixed_delay_loop(
        engine: Arc<SyncEngine>,
        pass_lock: Arc<Mutex<()>>,
        delay: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticks = tokio::time::interval(delay);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticks.tick().await; // the first tick fires immediately
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    Self::guarded_pass(&engine, &pass_lock, "fixed-delay").await;
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Daily full pass at a fixed wall-clock time in a fixed UTC offset
    async fn daily_loop(
        engine: Arc<SyncEngine>,
        pass_lock: Arc<Mutex<()>>,
        at: NaiveTime,
        offset: FixedOffset,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let wait = until_next_daily(Utc::now(), at, offset);
            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    Self::guarded_pass(&engine, &pass_lock, "daily").await;
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

/// Time until the next occurrence of `at` in the given UTC offset
fn until_next_daily(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> Duration {
    let local_now = now.with_timezone(&offset).naive_local();
    let mut next = local_now.date().and_time(at);
    if next <= local_now {
        next += chrono::Duration::days(1);
    }
    (next - local_now).to_std().unwrap_or(Duration::ZERO)
}
