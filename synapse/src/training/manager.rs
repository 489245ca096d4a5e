//! Training Job Manager
//!
//! Owns every training job. Submissions take the agent's training slot with
//! a conditional insert and are queued on an unbounded FIFO channel; a fixed
//! number of workers drain the channel.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    JobStatus, PipelineError, Result, RetryPolicy, TrainingConfig, TrainingError, TrainingJob,
    TrainingJobId, TrainingMetrics, TrainingPipeline, TrainingSettings,
};
use crate::agents::{AgentId, AgentStatus, AgentStore};

type JobQueue = Arc<AsyncMutex<mpsc::UnboundedReceiver<TrainingJobId>>>;

#[derive(Default)]
struct JobTable {
    jobs: HashMap<TrainingJobId, TrainingJob>,
    order: Vec<TrainingJobId>,
}

/// State shared between the manager handle and its workers
struct Shared {
    store: Arc<AgentStore>,
    pipeline: Arc<dyn TrainingPipeline>,
    retry: RetryPolicy,
    jobs: RwLock<JobTable>,
    /// Agent -> its queued or running job
    active: DashMap<AgentId, TrainingJobId>,
    changed: Notify,
}

/// Asynchronous training lifecycle with a bounded worker pool
pub struct TrainingJobManager {
    shared: Arc<Shared>,
    queue: Mutex<Option<mpsc::UnboundedSender<TrainingJobId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TrainingJobManager {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<AgentStore>,
        pipeline: Arc<dyn TrainingPipeline>,
        settings: TrainingSettings,
    ) -> Self {
        let shared = Arc::new(Shared {
            store,
            pipeline,
            retry: settings.retry,
            jobs: RwLock::new(JobTable::default()),
            active: DashMap::new(),
            changed: Notify::new(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let rx: JobQueue = Arc::new(AsyncMutex::new(rx));

        let workers = (0..settings.workers.max(1))
            .map(|worker| tokio::spawn(worker_loop(worker, Arc::clone(&shared), Arc::clone(&rx))))
            .collect::<Vec<_>>();

        info!("Training manager started with {} workers", workers.len());

        Self {
            shared,
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Accept a training job for an agent.
    ///
    /// Returns the queued job immediately; the pipeline runs on a worker.
    pub fn submit(&self, agent_id: &AgentId, config: TrainingConfig) -> Result<TrainingJob> {
        if !self.shared.store.contains(agent_id) {
            return Err(TrainingError::AgentNotFound(agent_id.to_string()));
        }
        let sender = self.queue.lock().clone().ok_or(TrainingError::ShutDown)?;

        let job = TrainingJob::queued(agent_id.clone(), config);
        match self.shared.active.entry(agent_id.clone()) {
            Entry::Occupied(entry) => {
                return Err(TrainingError::Conflict {
                    agent_id: agent_id.to_string(),
                    job_id: entry.get().to_string(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(job.id.clone());
            }
        }

        {
            let mut table = self.shared.jobs.write();
            table.order.push(job.id.clone());
            table.jobs.insert(job.id.clone(), job.clone());
        }

        if sender.send(job.id.clone()).is_err() {
            self.shared.seal(&job.id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some(TrainingError::ShutDown.to_string());
                job.completed_at = Some(Utc::now());
            });
            return Err(TrainingError::ShutDown);
        }

        info!(agent_id = %agent_id, job_id = %job.id, "Queued training job");
        Ok(job)
    }

    /// Get a job by id
    pub fn job(&self, id: &TrainingJobId) -> Result<TrainingJob> {
        self.shared
            .job(id)
            .ok_or_else(|| TrainingError::JobNotFound(id.to_string()))
    }

    /// All jobs of an agent in submission order
    pub fn jobs_for_agent(&self, agent_id: &AgentId) -> Vec<TrainingJob> {
        let table = self.shared.jobs.read();
        table
            .order
            .iter()
            .filter_map(|id| table.jobs.get(id))
            .filter(|job| &job.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// The agent's queued or running job, if any
    pub fn active_job(&self, agent_id: &AgentId) -> Option<TrainingJob> {
        let id = self.shared.active.get(agent_id)?.value().clone();
        self.shared.job(&id)
    }

    /// Wait until a job reaches a terminal state
    pub async fn wait_for(&self, id: &TrainingJobId) -> Result<TrainingJob> {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self.job(id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            notified.await;
        }
    }

    /// Number of worker tasks still attached
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Close the queue and wait for the workers to drain it
    pub async fn shutdown(&self) {
        self.queue.lock().take();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Training worker ended abnormally: {}", e);
            }
        }
        info!("Training manager stopped");
    }
}

async fn worker_loop(worker: usize, shared: Arc<Shared>, queue: JobQueue) {
    debug!("Training worker {} started", worker);
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job_id) = next else {
            break;
        };
        shared.run_job(&job_id).await;
    }
    debug!("Training worker {} stopped", worker);
}

impl Shared {
    fn job(&self, id: &TrainingJobId) -> Option<TrainingJob> {
        self.jobs.read().jobs.get(id).cloned()
    }

    /// Apply a non-terminal change to a job
    fn update(&self, id: &TrainingJobId, f: impl FnOnce(&mut TrainingJob)) -> Option<TrainingJob> {
        let updated = {
            let mut table = self.jobs.write();
            table.jobs.get_mut(id).map(|job| {
                f(job);
                job.clone()
            })
        };
        self.changed.notify_waiters();
        updated
    }

    /// Apply a terminal change and release the agent's training slot.
    ///
    /// The slot is released under the job table lock, so a reader that sees
    /// the terminal status can immediately submit again.
    fn seal(&self, id: &TrainingJobId, f: impl FnOnce(&mut TrainingJob)) {
        {
            let mut table = self.jobs.write();
            if let Some(job) = table.jobs.get_mut(id) {
                f(job);
                self.active.remove_if(&job.agent_id, |_, active| active == id);
            }
        }
        self.changed.notify_waiters();
    }

    async fn run_job(&self, job_id: &TrainingJobId) {
        let Some(job) = self.job(job_id) else {
            warn!(job_id = %job_id, "Dequeued unknown training job");
            return;
        };
        let agent_id = job.agent_id;

        let previous = match self.store.transition_status(
            &agent_id,
            &[AgentStatus::Created, AgentStatus::Ready],
            AgentStatus::Training,
        ) {
            Ok(previous) => previous,
            Err(e) => {
                error!(agent_id = %agent_id, job_id = %job_id, "Cannot start training: {}", e);
                self.fail(job_id, &agent_id, None, e.to_string());
                return;
            }
        };
        info!(agent_id = %agent_id, job_id = %job_id, "Training started");

        loop {
            let Some(job) = self.update(job_id, |job| {
                job.status = JobStatus::Running;
                job.attempts += 1;
                job.started_at.get_or_insert_with(Utc::now);
            }) else {
                return;
            };

            let outcome = match self.store.get(&agent_id) {
                Ok(agent) => self.run_pipeline(agent, job.config).await,
                Err(e) => Err(PipelineError::Permanent(e.to_string())),
            };

            match outcome {
                Ok(metrics) => {
                    self.complete(job_id, &agent_id, metrics);
                    return;
                }
                Err(PipelineError::Transient(reason)) if job.attempts < self.retry.max_attempts => {
                    let delay = self.retry.backoff(job.attempts);
                    warn!(
                        agent_id = %agent_id,
                        job_id = %job_id,
                        "Training attempt {}/{} failed: {}, retrying in {:?}",
                        job.attempts,
                        self.retry.max_attempts,
                        reason,
                        delay
                    );
                    self.update(job_id, |job| {
                        job.status = JobStatus::Queued;
                        job.error = Some(reason);
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        agent_id = %agent_id,
                        job_id = %job_id,
                        "Training failed after {} attempts: {}",
                        job.attempts,
                        e
                    );
                    self.fail(job_id, &agent_id, Some(previous), e.to_string());
                    return;
                }
            }
        }
    }

    /// Run the pipeline in its own task so a panic fails only this attempt
    async fn run_pipeline(
        &self,
        agent: crate::agents::Agent,
        config: TrainingConfig,
    ) -> std::result::Result<TrainingMetrics, PipelineError> {
        let pipeline = Arc::clone(&self.pipeline);
        let handle = tokio::spawn(async move { pipeline.train(&agent, &config).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(PipelineError::Permanent(format!("training pipeline panicked: {}", e))),
        }
    }

    fn complete(&self, job_id: &TrainingJobId, agent_id: &AgentId, metrics: TrainingMetrics) {
        if let Err(e) = self
            .store
            .transition_status(agent_id, &[AgentStatus::Training], AgentStatus::Ready)
        {
            error!(agent_id = %agent_id, "Failed to mark agent ready: {}", e);
        }

        self.seal(job_id, |job| {
            job.status = JobStatus::Completed;
            job.metrics = Some(metrics);
            job.error = None;
            job.completed_at = Some(Utc::now());
        });
        info!(agent_id = %agent_id, job_id = %job_id, "Training completed");
    }

    fn fail(
        &self,
        job_id: &TrainingJobId,
        agent_id: &AgentId,
        restore: Option<AgentStatus>,
        reason: String,
    ) {
        if let Some(previous) = restore {
            if let Err(e) = self
                .store
                .transition_status(agent_id, &[AgentStatus::Training], previous)
            {
                error!(agent_id = %agent_id, "Failed to restore agent status: {}", e);
            }
        }

        self.seal(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(reason);
            job.completed_at = Some(Utc::now());
        });
    }
}
