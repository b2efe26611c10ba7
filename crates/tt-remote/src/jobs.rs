//! Deferred jobs
//!
//! Writes that fail transiently are handed to a [`JobQueue`] as serializable
//! [`Job`] descriptions and replayed later. Delivery is at-least-once: a job
//! may run more than once and never runs before the enqueuing call returns.
//!
//! [`ChannelJobQueue`] and [`JobRunner`] are an in-process queue and worker
//! built on tokio channels; deployments with an external queue implement
//! [`JobQueue`] themselves.

use crate::authority::{IdentifierRequest, RemoteAuthority, RemoteError};
use crate::config::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tt_split::Assignment;
use uuid::Uuid;

/// A deferred operation against the remote authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Replay of a failed create-identifier call
    CreateIdentifier(IdentifierRequest),

    /// Correlate a canonical visitor id with a previously known id
    CreateAlias { existing_id: String, alias_id: String },

    /// Record an unsynced assignment
    PersistAssignment {
        visitor_id: String,
        split_name: String,
        variant: String,
    },
}

impl Job {
    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateIdentifier(_) => "create_identifier",
            Self::CreateAlias { .. } => "create_alias",
            Self::PersistAssignment { .. } => "persist_assignment",
        }
    }
}

/// Queue accepting deferred jobs
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for later execution
    async fn enqueue(&self, job: Job) -> Result<(), JobError>;
}

/// Job queue errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// Queue no longer accepts jobs
    #[error("job queue closed")]
    QueueClosed,

    /// Job could not be serialized for the queue
    #[error("job serialization failed: {0}")]
    Serialization(String),
}

/// Analytics collaborator receiving alias jobs
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AliasSink: Send + Sync {
    /// Record that `alias_id` is the same visitor as `existing_id`
    async fn alias(&self, existing_id: &str, alias_id: &str) -> Result<(), RemoteError>;
}

/// Executes jobs pulled off a queue
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    /// Perform a job once
    async fn perform(&self, job: &Job) -> Result<(), RemoteError>;
}

/// Performs jobs against a remote authority
pub struct AuthorityJobHandler {
    authority: Arc<dyn RemoteAuthority>,
    alias_sink: Option<Arc<dyn AliasSink>>,
}

impl AuthorityJobHandler {
    /// Create a handler without an alias sink
    #[must_use]
    pub fn new(authority: Arc<dyn RemoteAuthority>) -> Self {
        Self {
            authority,
            alias_sink: None,
        }
    }

    /// With an analytics sink for alias jobs
    #[must_use]
    pub fn with_alias_sink(mut self, sink: Arc<dyn AliasSink>) -> Self {
        self.alias_sink = Some(sink);
        self
    }
}

impl std::fmt::Debug for AuthorityJobHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityJobHandler")
            .field("alias_sink", &self.alias_sink.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl JobHandler for AuthorityJobHandler {
    async fn perform(&self, job: &Job) -> Result<(), RemoteError> {
        match job {
            Job::CreateIdentifier(request) => {
                self.authority.create_identifier(request).await?;
                Ok(())
            }
            Job::CreateAlias {
                existing_id,
                alias_id,
            } => match &self.alias_sink {
                Some(sink) => sink.alias(existing_id, alias_id).await,
                None => {
                    tracing::debug!("No alias sink configured, dropping alias {} -> {}", existing_id, alias_id);
                    Ok(())
                }
            },
            Job::PersistAssignment {
                visitor_id,
                split_name,
                variant,
            } => {
                let assignment = Assignment::from_remote(split_name, variant, true);
                self.authority.persist_assignment(visitor_id, &assignment).await
            }
        }
    }
}

/// A job in flight through [`ChannelJobQueue`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub attempt: u32,
    pub job: Job,
}

impl QueuedJob {
    fn first(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 0,
            job,
        }
    }
}

/// In-process job queue backed by a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelJobQueue {
    sender: mpsc::Sender<QueuedJob>,
}

/// Receiving end of a [`ChannelJobQueue`]
#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::Receiver<QueuedJob>,
}

impl ChannelJobQueue {
    /// Create a queue holding at most `capacity` pending jobs
    #[must_use]
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, JobReceiver { receiver })
    }
}

#[async_trait::async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), JobError> {
        tracing::info!("Enqueueing {} job", job.kind());
        self.sender
            .send(QueuedJob::first(job))
            .await
            .map_err(|_| JobError::QueueClosed)
    }
}

/// What happened to one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Performed successfully
    Completed,
    /// Failed transiently and scheduled again
    Retrying { attempt: u32 },
    /// Failed permanently or ran out of attempts
    Abandoned { error: RemoteError },
}

/// Runner statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    pub completed: usize,
    pub retried: usize,
    pub abandoned: usize,
}

#[derive(Debug)]
struct PendingRetry {
    due: Instant,
    job: QueuedJob,
}

/// Worker draining a [`ChannelJobQueue`]
///
/// Transient failures are held by the runner until the policy's backoff
/// elapses. The runner stops once the queue is closed and no retry is
/// pending.
pub struct JobRunner {
    receiver: JobReceiver,
    handler: Arc<dyn JobHandler>,
    policy: RetryPolicy,
    pending: Vec<PendingRetry>,
    closed: bool,
    stats: RunnerStats,
}

impl JobRunner {
    /// Create a runner
    #[must_use]
    pub fn new(receiver: JobReceiver, handler: Arc<dyn JobHandler>, policy: RetryPolicy) -> Self {
        Self {
            receiver,
            handler,
            policy,
            pending: Vec::new(),
            closed: false,
            stats: RunnerStats::default(),
        }
    }

    /// Statistics so far
    #[inline]
    #[must_use]
    pub fn stats(&self) -> RunnerStats {
        self.stats
    }

    /// Retries waiting for their backoff to elapse
    #[inline]
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.pending.len()
    }

    /// Process jobs until the queue closes and every retry has run
    pub async fn run(mut self) -> RunnerStats {
        while self.run_once().await.is_some() {}
        tracing::info!(
            "Job runner stopped: {} completed, {} retried, {} abandoned",
            self.stats.completed,
            self.stats.retried,
            self.stats.abandoned
        );
        self.stats
    }

    /// Wait for and process a single job, new or due for retry
    ///
    /// Returns `None` once the queue is closed and drained and no retry is
    /// pending.
    pub async fn run_once(&mut self) -> Option<JobStatus> {
        let queued = loop {
            let next_due = self.pending.iter().map(|p| p.due).min();
            tokio::select! {
                received = self.receiver.receiver.recv(), if !self.closed => match received {
                    Some(queued) => break queued,
                    None => self.closed = true,
                },
                () = time::sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    if let Some(queued) = self.take_due() {
                        break queued;
                    }
                }
                else => return None,
            }
        };
        Some(self.process(queued).await)
    }

    fn take_due(&mut self) -> Option<QueuedJob> {
        let index = self
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.due)
            .map(|(index, _)| index)?;
        Some(self.pending.swap_remove(index).job)
    }

    async fn process(&mut self, mut queued: QueuedJob) -> JobStatus {
        queued.attempt += 1;
        match self.handler.perform(&queued.job).await {
            Ok(()) => {
                tracing::debug!("Job {} ({}) completed", queued.id, queued.job.kind());
                self.stats.completed += 1;
                JobStatus::Completed
            }
            Err(error) if error.is_transient() && queued.attempt < self.policy.max_attempts => {
                let attempt = queued.attempt;
                let delay = self.policy.delay_for(attempt);
                tracing::warn!(
                    "Job {} ({}) failed on attempt {}, retrying in {:?}: {}",
                    queued.id,
                    queued.job.kind(),
                    attempt,
                    delay,
                    error
                );
                self.pending.push(PendingRetry {
                    due: Instant::now() + delay,
                    job: queued,
                });
                self.stats.retried += 1;
                JobStatus::Retrying { attempt }
            }
            Err(error) => {
                tracing::error!(
                    "Job {} ({}) abandoned after {} attempts: {}",
                    queued.id,
                    queued.job.kind(),
                    queued.attempt,
                    error
                );
                self.stats.abandoned += 1;
                JobStatus::Abandoned { error }
            }
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("policy", &self.policy)
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
