//! Poll loop and dispatcher.
//!
//! Every cycle the manager reloads active jobs, spawns one worker task per
//! due job that is not locked, and bulk-refreshes `next_run_at`. Mutual
//! exclusion per job comes from the lock table, not from this process.

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::Instrument;

use crate::config::AppConfig;
use crate::handlers::HandlerRegistry;
use crate::models::job::ScheduleJob;
use crate::shutdown::shutdown_signal;
use crate::store::{ScheduleStore, StoreError};

pub mod due;
pub mod lock;
pub mod recorder;
pub mod worker;

pub use due::is_job_due;
pub use lock::LockManager;
pub use recorder::ExecutionRecorder;
pub use worker::JobRunner;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Per-worker wait in [`SchedulerManager::stop`]
    pub shutdown_timeout: Duration,
    /// Offset `specific_times` are read in
    pub schedule_offset: FixedOffset,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            shutdown_timeout: config.shutdown_timeout(),
            schedule_offset: config.schedule_offset(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            schedule_offset: FixedOffset::east_opt(9 * 3600)
                .unwrap_or_else(|| chrono::Offset::fix(&Utc)),
        }
    }
}

pub struct SchedulerManager {
    store: Arc<dyn ScheduleStore>,
    runner: JobRunner,
    settings: SchedulerSettings,
    jobs: Mutex<Vec<ScheduleJob>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl SchedulerManager {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        handlers: HandlerRegistry,
        settings: SchedulerSettings,
    ) -> Self {
        Self::with_owner(store, handlers, settings, LockManager::process_owner())
    }

    /// Like [`new`](Self::new) with an explicit lock holder name.
    pub fn with_owner(
        store: Arc<dyn ScheduleStore>,
        handlers: HandlerRegistry,
        settings: SchedulerSettings,
        owner: impl Into<String>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            runner: JobRunner::new(store.clone(), Arc::new(handlers), owner),
            store,
            settings,
            jobs: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Replace the in-memory job table with the current active jobs.
    pub async fn load_jobs(&self) -> Result<usize, SchedulerError> {
        let loaded = self
            .store
            .load_active_jobs()
            .await
            .map_err(SchedulerError::LoadJobs)?;
        let count = loaded.len();
        *self.jobs.lock().await = loaded;
        tracing::debug!(count, "Loaded active jobs");
        Ok(count)
    }

    /// Snapshot of the in-memory job table.
    pub async fn jobs(&self) -> Vec<ScheduleJob> {
        self.jobs.lock().await.clone()
    }

    /// Jobs in the table that are due at `now` and not held by a live lock.
    pub async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<ScheduleJob> {
        let candidates: Vec<ScheduleJob> = self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|job| is_job_due(job, now, self.settings.schedule_offset))
            .cloned()
            .collect();

        let mut due = Vec::with_capacity(candidates.len());
        for job in candidates {
            if self.runner.locks().is_locked(job.id).await {
                tracing::debug!(job_id = job.id, "Due job is still locked");
                continue;
            }
            due.push(job);
        }
        due
    }

    /// Spawn a worker task for the job. Returns false without spawning once
    /// shutdown has been requested.
    pub async fn execute_job(&self, job: ScheduleJob) -> bool {
        // Checked under the workers lock; `stop` signals before draining.
        let mut workers = self.workers.lock().await;
        if self.shutdown_requested() {
            tracing::info!(job_id = job.id, "Shutdown requested, not dispatching");
            return false;
        }

        let span = tracing::info_span!("job", job_id = job.id, job_type = %job.job_type);
        let runner = self.runner.clone();
        let handle = tokio::spawn(
            async move {
                runner.run(job).await;
            }
            .instrument(span),
        );

        workers.retain(|w| !w.is_finished());
        workers.push(handle);
        metrics::gauge!("scheduler_active_workers").set(workers.len() as f64);
        true
    }

    /// Number of spawned workers that have not finished yet.
    pub async fn active_workers(&self) -> usize {
        let mut workers = self.workers.lock().await;
        workers.retain(|w| !w.is_finished());
        workers.len()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// One poll cycle. Returns how many workers were dispatched. Nothing is
    /// dispatched once [`stop`](Self::stop) has been called.
    pub async fn tick(&self) -> Result<usize, SchedulerError> {
        self.load_jobs().await?;

        let due = self.due_jobs(Utc::now()).await;
        let mut dispatched = 0;
        for job in due {
            tracing::info!(job_id = job.id, job_name = %job.name, "Dispatching due job");
            if !self.execute_job(job).await {
                break;
            }
            dispatched += 1;
        }

        let refreshed = self
            .store
            .refresh_next_run_times()
            .await
            .map_err(SchedulerError::RefreshNextRun)?;
        tracing::debug!(dispatched, refreshed, "Poll cycle complete");

        Ok(dispatched)
    }

    /// Poll until [`stop`](Self::stop) is called. Cycle errors are logged and
    /// followed by the error back-off; they never end the loop.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Scheduler started"
        );

        while self.is_running() {
            let pause = match self.tick().await {
                Ok(_) => self.settings.poll_interval,
                Err(e) => {
                    tracing::error!(error = ?e, "Scheduler cycle failed, backing off");
                    metrics::counter!("scheduler_tick_errors_total").increment(1);
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("Scheduler loop exited");
    }

    /// Run the poll loop until SIGINT/SIGTERM, then [`stop`](Self::stop).
    pub async fn start(self: Arc<Self>) {
        tokio::select! {
            _ = self.run() => {}
            _ = shutdown_signal() => {}
        }
        self.stop().await;
    }

    /// Stop dispatching and wait for in-flight workers, each up to the
    /// shutdown timeout. Handlers are not interrupted.
    pub async fn stop(&self) {
        tracing::info!("Stopping scheduler");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in workers {
            match timeout(self.settings.shutdown_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Worker task failed"),
                Err(_) => tracing::warn!(
                    timeout_secs = self.settings.shutdown_timeout.as_secs(),
                    "Worker still running at shutdown timeout"
                ),
            }
        }

        metrics::gauge!("scheduler_active_workers").set(0.0);
        tracing::info!("Scheduler stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Failed to load active jobs: {0}")]
    LoadJobs(#[source] StoreError),

    #[error("Failed to refresh next run times: {0}")]
    RefreshNextRun(#[source] StoreError),
}
