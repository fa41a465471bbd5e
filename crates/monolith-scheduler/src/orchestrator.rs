//! Job orchestrator — drives every periodic job in its own task.
//!
//! Each job gets a driver task that sleeps until the trigger's next instant
//! and then launches a run. Runs of the same job never overlap: a firing
//! that arrives while the previous run is still going is coalesced
//! (dropped and counted). Different jobs run independently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{RwLock, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::trigger::Trigger;

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A job body. Called once per run.
pub type JobFn = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

/// How a single run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    /// The job was already running; this run was dropped.
    Coalesced,
}

/// Counters for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub runs: u64,
    pub failures: u64,
    pub coalesced: u64,
}

struct JobSlot {
    id: String,
    trigger: Trigger,
    body: JobFn,
    /// True while a run is in flight.
    running: watch::Sender<bool>,
    /// Abort handle of the in-flight run's body.
    current: Mutex<Option<AbortHandle>>,
    runs: AtomicU64,
    failures: AtomicU64,
    coalesced: AtomicU64,
}

impl JobSlot {
    fn try_claim(&self) -> bool {
        self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        })
    }

    fn stats(&self) -> JobStats {
        JobStats {
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    fn set_current(&self, handle: Option<AbortHandle>) {
        if let Ok(mut current) = self.current.lock() {
            *current = handle;
        }
    }

    fn abort_current(&self) {
        if let Ok(mut current) = self.current.lock()
            && let Some(handle) = current.take()
        {
            handle.abort();
        }
    }
}

/// Releases the running flag however the run ends.
struct RunGuard(Arc<JobSlot>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.set_current(None);
        self.0.running.send_replace(false);
    }
}

/// Launch a run unless one is already in flight.
fn launch(slot: &Arc<JobSlot>) -> Option<JoinHandle<RunOutcome>> {
    if !slot.try_claim() {
        slot.coalesced.fetch_add(1, Ordering::Relaxed);
        debug!(job = %slot.id, "previous run still in flight, coalescing");
        return None;
    }
    let guard = RunGuard(Arc::clone(slot));

    let body = tokio::spawn((slot.body)());
    slot.set_current(Some(body.abort_handle()));
    let slot = Arc::clone(slot);

    Some(tokio::spawn(async move {
        let _guard = guard;
        let started = Instant::now();
        debug!(job = %slot.id, "job started");

        let outcome = match body.await {
            Ok(Ok(())) => RunOutcome::Completed,
            Ok(Err(e)) => RunOutcome::Failed(format!("{e:#}")),
            Err(e) if e.is_panic() => RunOutcome::Failed("job panicked".to_string()),
            Err(_) => RunOutcome::Failed("job aborted".to_string()),
        };

        slot.runs.fetch_add(1, Ordering::Relaxed);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            RunOutcome::Failed(reason) => {
                slot.failures.fetch_add(1, Ordering::Relaxed);
                let err = SchedulerError::JobExecution {
                    job: slot.id.clone(),
                    reason: reason.clone(),
                };
                error!(job = %slot.id, elapsed_ms, error = %err, "job failed");
            }
            _ => debug!(job = %slot.id, elapsed_ms, "job finished"),
        }
        outcome
    }))
}

/// Schedules and runs named jobs.
pub struct JobOrchestrator {
    jobs: Arc<RwLock<HashMap<String, Arc<JobSlot>>>>,
    drivers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl Default for JobOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl JobOrchestrator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            drivers: Mutex::new(Vec::new()),
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }

    /// Register a job. Jobs added after `start` begin firing immediately.
    pub async fn add_job<F, Fut>(&self, id: &str, trigger: Trigger, body: F) -> SchedulerResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if *self.shutdown_tx.borrow() {
            return Err(SchedulerError::ShutDown);
        }

        let body: JobFn = Arc::new(move || Box::pin(body()) as BoxFuture);
        let (running, _) = watch::channel(false);
        let slot = Arc::new(JobSlot {
            id: id.to_string(),
            trigger,
            body,
            running,
            current: Mutex::new(None),
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        });

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(id) {
            return Err(SchedulerError::DuplicateJob(id.to_string()));
        }
        jobs.insert(id.to_string(), Arc::clone(&slot));

        info!(job = %id, trigger = %slot.trigger.describe(), "job registered");
        if self.started.load(Ordering::SeqCst) {
            self.spawn_driver(slot);
        }
        Ok(())
    }

    /// Start a driver task for every registered job.
    pub async fn start(&self) {
        let jobs = self.jobs.read().await;
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for slot in jobs.values() {
            self.spawn_driver(Arc::clone(slot));
        }
        info!(jobs = jobs.len(), "orchestrator started");
    }

    fn spawn_driver(&self, slot: Arc<JobSlot>) {
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(drive(slot, shutdown));
        if let Ok(mut drivers) = self.drivers.lock() {
            drivers.push(handle);
        }
    }

    /// Run a job right now, waiting for it to finish.
    ///
    /// Obeys the same coalescing rule as timed firings.
    pub async fn run_now(&self, id: &str) -> SchedulerResult<RunOutcome> {
        if *self.shutdown_tx.borrow() {
            return Err(SchedulerError::ShutDown);
        }
        let slot = self.slot(id).await?;
        let Some(handle) = launch(&slot) else {
            return Ok(RunOutcome::Coalesced);
        };
        match handle.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(RunOutcome::Failed(e.to_string())),
        }
    }

    pub async fn stats(&self, id: &str) -> Option<JobStats> {
        self.jobs.read().await.get(id).map(|slot| slot.stats())
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.jobs
            .read()
            .await
            .get(id)
            .is_some_and(|slot| *slot.running.borrow())
    }

    pub async fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.jobs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop all drivers, give in-flight runs `grace` to finish, then abort.
    pub async fn shutdown(&self, grace: Duration) {
        // Recorded even when no driver is subscribed yet.
        self.shutdown_tx.send_replace(true);

        let drivers: Vec<_> = match self.drivers.lock() {
            Ok(mut drivers) => drivers.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for driver in drivers {
            let _ = driver.await;
        }

        let slots: Vec<_> = self.jobs.read().await.values().cloned().collect();
        let drained = tokio::time::timeout(grace, async {
            for slot in &slots {
                let mut running = slot.running.subscribe();
                let _ = running.wait_for(|running| !*running).await;
            }
        })
        .await;

        if drained.is_err() {
            for slot in &slots {
                if *slot.running.borrow() {
                    warn!(job = %slot.id, "aborting job still running after grace period");
                    slot.abort_current();
                }
            }
        }
        info!("orchestrator stopped");
    }

    async fn slot(&self, id: &str) -> SchedulerResult<Arc<JobSlot>> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))
    }
}

/// Driver loop for one job.
async fn drive(slot: Arc<JobSlot>, mut shutdown: watch::Receiver<bool>) {
    let mut next = slot.trigger.first_fire(Utc::now());

    while let Some(fire_at) = next {
        let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                debug!(job = %slot.id, "driver shutting down");
                return;
            }
        }

        // The run handle is dropped; the run reports its own outcome.
        drop(launch(&slot));

        // Skip instants the driver overslept.
        let now = Utc::now();
        next = slot.trigger.next_fire_after(fire_at);
        let mut skipped = 0u32;
        while let Some(at) = next {
            if at > now {
                break;
            }
            skipped += 1;
            next = slot.trigger.next_fire_after(at);
        }
        if skipped > 0 {
            warn!(job = %slot.id, skipped, "missed firings skipped");
        }
    }

    debug!(job = %slot.id, "trigger has no further firings");
}
