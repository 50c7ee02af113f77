use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelType;
use crate::error::{PipelineError, YtAutoError};
use crate::pipeline::{Artifact, Pipeline, PipelineRegistry};
use crate::scheduler::{self, Schedule};
use crate::state_machine::{
    ChannelStats, Event, JobId, JobRecord, JobStatus, RetryPolicy, StateMachine, Transition,
};

/// Everything the orchestrator needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Semaphore slots: how many pipeline runs may be in flight at once.
    pub max_concurrent: usize,
    /// Worker loop count; defaults to `max_concurrent`.
    pub workers: Option<usize>,
    pub retry: RetryPolicy,
    pub dry_run: bool,
    /// Simulated pipeline latency in dry-run mode.
    pub dry_run_delay: Duration,
    /// Worker dequeue timeout and scheduler tick.
    pub poll_interval: Duration,
    /// Used by [`Orchestrator::start`] when no schedule is passed.
    pub schedule: Schedule,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            workers: None,
            retry: RetryPolicy::default(),
            dry_run: false,
            dry_run_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            schedule: Schedule::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(self.max_concurrent)
    }

    fn validate(&self) -> Result<(), YtAutoError> {
        if self.max_concurrent == 0 {
            return Err(YtAutoError::Config("max_concurrent must be at least 1".into()));
        }
        if self.worker_count() == 0 {
            return Err(YtAutoError::Config("workers must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(YtAutoError::Config("poll_interval must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorState {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrchestratorState::Stopped => "stopped",
            OrchestratorState::Running => "running",
            OrchestratorState::Stopping => "stopping",
        })
    }
}

/// Point-in-time view returned by [`Orchestrator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: OrchestratorState,
    pub queue_size: usize,
    pub pending_jobs: usize,
    pub running_jobs: usize,
    pub retrying_jobs: usize,
    pub total_jobs: usize,
    pub stats: BTreeMap<ChannelType, ChannelStats>,
    pub workers: usize,
    pub max_concurrent: usize,
    pub dry_run: bool,
}

#[derive(Default)]
struct Ledger {
    jobs: HashMap<JobId, JobRecord>,
    stats: BTreeMap<ChannelType, ChannelStats>,
    queue: VecDeque<JobId>,
    next_seq: u64,
}

struct Lifecycle {
    state: OrchestratorState,
    /// Cancelled by the next `stop()` of a running instance, then replaced.
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    scheduler: Option<JoinHandle<()>>,
    /// Backoff redeliveries spawned by `run_once`.
    redeliveries: Vec<JoinHandle<()>>,
}

struct Shared {
    config: OrchestratorConfig,
    registry: PipelineRegistry,
    semaphore: Semaphore,
    ledger: Mutex<Ledger>,
    queued: Notify,
    /// Jobs not yet Completed or Failed.
    outstanding: watch::Sender<usize>,
    lifecycle: Mutex<Lifecycle>,
}

/// Single control surface over the queue, worker pool, retry controller and
/// scheduler. Cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, registry: PipelineRegistry) -> Result<Self, YtAutoError> {
        config.validate()?;
        let (outstanding, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Shared {
                semaphore: Semaphore::new(config.max_concurrent),
                config,
                registry,
                ledger: Mutex::new(Ledger::default()),
                queued: Notify::new(),
                outstanding,
                lifecycle: Mutex::new(Lifecycle {
                    state: OrchestratorState::Stopped,
                    cancel: CancellationToken::new(),
                    workers: Vec::new(),
                    scheduler: None,
                    redeliveries: Vec::new(),
                }),
            }),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.shared.registry
    }

    /// Whether two handles point at the same orchestrator.
    pub fn same_instance(a: &Orchestrator, b: &Orchestrator) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    pub fn register_pipeline(&self, channel: ChannelType, pipeline: Arc<dyn Pipeline>) {
        self.shared.registry.register(channel, pipeline);
    }

    /// Create a job for `channel` and put it at the back of the queue.
    pub fn enqueue(&self, channel: ChannelType) -> JobId {
        self.shared.insert_job(channel, true)
    }

    /// Create a job and run its first attempt right away, skipping the queue
    /// but not the concurrency limit.
    ///
    /// Returns once the attempt has finished. A failed attempt with retries
    /// left is redelivered to the queue in the background after its backoff;
    /// [`stop`](Self::stop) cuts that backoff short.
    pub async fn run_once(&self, channel: ChannelType) -> JobId {
        let id = self.shared.insert_job(channel, false);
        let transition = self.shared.process(id, &CancellationToken::new()).await;
        if let Some(Transition::Retry { delay, .. }) = transition {
            let mut lifecycle = self.shared.lifecycle();
            let cancel = lifecycle.cancel.clone();
            let shared = Arc::clone(&self.shared);
            lifecycle.redeliveries.retain(|handle| !handle.is_finished());
            lifecycle.redeliveries.push(tokio::spawn(async move {
                shared.redeliver(id, delay, &cancel).await;
            }));
        }
        id
    }

    /// Enqueue one job per known channel and wait until every outstanding job,
    /// retries included, has finished.
    ///
    /// When the pool is not running a temporary one drains the queue. When the
    /// pool is stopped mid-wait, returns early and leaves the rest queued.
    pub async fn run_all(&self) -> Vec<JobId> {
        let mut channels = self.shared.registry.channels();
        if channels.is_empty() {
            channels = ChannelType::ALL.into_iter().collect();
        }
        let ids: Vec<JobId> = channels.into_iter().map(|c| self.enqueue(c)).collect();

        let running = {
            let lifecycle = self.shared.lifecycle();
            (lifecycle.state == OrchestratorState::Running).then(|| lifecycle.cancel.clone())
        };

        if let Some(stopped) = running {
            tokio::select! {
                _ = self.wait_idle() => {}
                _ = stopped.cancelled() => {
                    warn!(jobs = ids.len(), "Orchestrator stopped before run_all drained");
                }
            }
        } else {
            let cancel = CancellationToken::new();
            let workers = self.shared.spawn_workers(&cancel);
            self.wait_idle().await;
            cancel.cancel();
            join_all(workers).await;
        }
        ids
    }

    /// Resolves once no job is pending, running or retrying.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.outstanding.subscribe();
        let _ = rx.wait_for(|outstanding| *outstanding == 0).await;
    }

    /// Spawn the worker pool and the scheduler loop.
    ///
    /// A no-op while already running. Signal handling is left to the host,
    /// which calls [`stop`](Self::stop).
    pub async fn start(&self, schedule: Option<Schedule>) {
        let mut lifecycle = self.shared.lifecycle();
        if lifecycle.state != OrchestratorState::Stopped {
            warn!(state = %lifecycle.state, "Orchestrator already running");
            return;
        }

        let config = &self.shared.config;
        info!(
            max_concurrent = config.max_concurrent,
            workers = config.worker_count(),
            dry_run = config.dry_run,
            "Orchestrator starting"
        );

        let cancel = lifecycle.cancel.clone();
        lifecycle.workers = self.shared.spawn_workers(&cancel);

        let shared = Arc::clone(&self.shared);
        lifecycle.scheduler = Some(tokio::spawn(scheduler::run_loop(
            schedule.unwrap_or_else(|| config.schedule.clone()),
            config.poll_interval,
            cancel,
            move |channel| {
                shared.insert_job(channel, true);
            },
        )));

        lifecycle.state = OrchestratorState::Running;
        info!("Orchestrator started");
    }

    /// Cancel the scheduler and workers and wait for them to exit.
    ///
    /// In-flight pipeline runs are allowed to finish; jobs waiting for a slot
    /// or in backoff go back to the queue. A no-op unless running.
    pub async fn stop(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut lifecycle = self.shared.lifecycle();
            if lifecycle.state != OrchestratorState::Running {
                return;
            }
            lifecycle.state = OrchestratorState::Stopping;
            std::mem::replace(&mut lifecycle.cancel, CancellationToken::new()).cancel();
            let workers = std::mem::take(&mut lifecycle.workers);
            let redeliveries = std::mem::take(&mut lifecycle.redeliveries);
            lifecycle
                .scheduler
                .take()
                .into_iter()
                .chain(workers)
                .chain(redeliveries)
                .collect()
        };
        info!("Orchestrator stopping");

        join_all(tasks).await;

        self.shared.lifecycle().state = OrchestratorState::Stopped;
        info!("Orchestrator stopped");
    }

    pub fn state(&self) -> OrchestratorState {
        self.shared.lifecycle().state
    }

    /// Task ids of the current worker pool, empty when stopped.
    pub fn worker_ids(&self) -> Vec<tokio::task::Id> {
        self.shared
            .lifecycle()
            .workers
            .iter()
            .map(JoinHandle::id)
            .collect()
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.state();
        let ledger = self.shared.ledger();
        let count = |status: JobStatus| ledger.jobs.values().filter(|j| j.status == status).count();

        StatusSnapshot {
            state,
            queue_size: ledger.queue.len(),
            pending_jobs: count(JobStatus::Pending),
            running_jobs: count(JobStatus::Running),
            retrying_jobs: count(JobStatus::Retrying),
            total_jobs: ledger.jobs.len(),
            stats: ledger.stats.clone(),
            workers: self.shared.config.worker_count(),
            max_concurrent: self.shared.config.max_concurrent,
            dry_run: self.shared.config.dry_run,
        }
    }

    pub fn get_job(&self, id: JobId) -> Option<JobRecord> {
        self.shared.ledger().jobs.get(&id).cloned()
    }

    /// Up to `limit` jobs, newest first.
    pub fn get_recent_jobs(&self, limit: usize) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.shared.ledger().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
        jobs.truncate(limit);
        jobs
    }
}

impl Shared {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_job(&self, channel: ChannelType, enqueue: bool) -> JobId {
        let mut ledger = self.ledger();
        let seq = ledger.next_seq;
        ledger.next_seq += 1;

        let job = JobRecord::new(channel, seq);
        let id = job.id;
        ledger.jobs.insert(id, job);
        ledger.stats.entry(channel).or_default().total += 1;
        if enqueue {
            ledger.queue.push_back(id);
        }
        self.outstanding.send_modify(|n| *n += 1);
        drop(ledger);

        if enqueue {
            self.queued.notify_one();
        }
        info!(job_id = %id, channel = %channel, "Job enqueued");
        id
    }

    fn spawn_workers(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.config.worker_count())
            .map(|worker_id| tokio::spawn(worker_loop(Arc::clone(self), worker_id, cancel.clone())))
            .collect()
    }

    /// Next queued job, or `None` once `cancel` fires.
    async fn next_job(&self, cancel: &CancellationToken) -> Option<JobId> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            let next = self.ledger().queue.pop_front();
            if next.is_some() {
                return next;
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::timeout(self.config.poll_interval, self.queued.notified()) => {}
            }
        }
    }

    /// One attempt: take a slot, run, record the outcome.
    ///
    /// If `cancel` fires while waiting for a slot the job goes back to the
    /// front of the queue untouched.
    async fn process(&self, id: JobId, cancel: &CancellationToken) -> Option<Transition> {
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            acquired = self.semaphore.acquire() => Some(acquired),
        };
        let permit = match acquired {
            Some(Ok(permit)) => permit,
            Some(Err(e)) => {
                error!(job_id = %id, error = %e, "Concurrency semaphore closed");
                return None;
            }
            None => {
                self.ledger().queue.push_front(id);
                self.queued.notify_one();
                debug!(job_id = %id, "Slot wait interrupted by shutdown");
                return None;
            }
        };

        let (_, channel) = self.apply(id, Event::Started)?;
        let outcome = self.execute(id, channel).await;
        drop(permit);

        let event = match outcome {
            Ok(artifact) => Event::Succeeded(artifact),
            Err(e) => Event::Failed(e.to_string()),
        };
        self.apply(id, event).map(|(transition, _)| transition)
    }

    async fn execute(&self, id: JobId, channel: ChannelType) -> Result<Artifact, PipelineError> {
        if self.config.dry_run {
            info!(job_id = %id, channel = %channel, "Dry-run simulation");
            tokio::time::sleep(self.config.dry_run_delay).await;
            return Ok(serde_json::json!({ "dry_run": true, "channel": channel }));
        }

        let pipeline = self
            .registry
            .resolve(channel)
            .ok_or(PipelineError::NotRegistered(channel))?;

        AssertUnwindSafe(pipeline.run(channel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic.as_ref()))))
    }

    /// Sleep out the backoff, then put the job back. Cancellation cuts the
    /// sleep short so the job is back in the queue before the worker exits.
    async fn redeliver(&self, id: JobId, delay: Duration, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                debug!(job_id = %id, "Backoff interrupted by shutdown");
            }
        }
        self.requeue(id);
    }

    fn requeue(&self, id: JobId) {
        let mut ledger = self.ledger();
        if self.apply_locked(&mut ledger, id, Event::Requeued).is_some() {
            ledger.queue.push_back(id);
            drop(ledger);
            self.queued.notify_one();
        }
    }

    fn apply(&self, id: JobId, event: Event) -> Option<(Transition, ChannelType)> {
        let mut ledger = self.ledger();
        self.apply_locked(&mut ledger, id, event)
    }

    fn apply_locked(
        &self,
        ledger: &mut Ledger,
        id: JobId,
        event: Event,
    ) -> Option<(Transition, ChannelType)> {
        let Some(job) = ledger.jobs.get_mut(&id) else {
            warn!(job_id = %id, "Unknown job");
            return None;
        };
        let channel = job.channel;

        let transition = match StateMachine::next(job, event, &self.config.retry) {
            Ok(transition) => transition,
            Err(e) => {
                warn!(job_id = %id, error = %e, "Ignoring invalid job transition");
                return None;
            }
        };

        match &transition {
            Transition::Started => {
                info!(job_id = %id, channel = %channel, "Job started");
            }
            Transition::Completed => {
                let duration_ms = job.duration().map(|d| d.num_milliseconds()).unwrap_or(0);
                ledger.stats.entry(channel).or_default().completed += 1;
                self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
                info!(job_id = %id, channel = %channel, duration_ms, "Job completed");
            }
            Transition::Retry { attempt, delay } => {
                warn!(
                    job_id = %id,
                    channel = %channel,
                    retry = *attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = job.error.as_deref().unwrap_or_default(),
                    "Job failed, retrying"
                );
            }
            Transition::Failed => {
                let retries = job.retries;
                let message = job.error.clone().unwrap_or_default();
                ledger.stats.entry(channel).or_default().failed += 1;
                self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
                error!(job_id = %id, channel = %channel, retries, error = %message, "Job failed");
            }
            Transition::Requeued => {
                debug!(job_id = %id, channel = %channel, "Job requeued");
            }
        }

        Some((transition, channel))
    }
}

async fn worker_loop(shared: Arc<Shared>, worker_id: usize, cancel: CancellationToken) {
    info!(worker_id, "Worker started");
    while let Some(id) = shared.next_job(&cancel).await {
        if let Some(Transition::Retry { delay, .. }) = shared.process(id, &cancel).await {
            shared.redeliver(id, delay, &cancel).await;
        }
    }
    info!(worker_id, "Worker stopped");
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            if e.is_panic() {
                error!(error = %e, "Background task panicked");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
