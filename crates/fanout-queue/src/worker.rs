//! Job handlers, the dispatch registry, and transactional enqueue staging.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
    error::{JobError, Result},
    job::{Job, JobArgs},
};

/// A job staged during handler execution, flushed on success.
#[derive(Debug, Clone)]
pub(crate) struct PendingJob {
    pub(crate) kind: &'static str,
    pub(crate) queue: &'static str,
    pub(crate) max_attempts: i32,
    pub(crate) payload: serde_json::Value,
    pub(crate) run_after: DateTime<Utc>,
}

/// Per-execution context handed to a handler.
///
/// Jobs staged here are inserted in the same transaction that marks the
/// current job completed. If the handler fails, staged jobs are dropped,
/// so a retried handler never double-enqueues its fan-out.
#[derive(Default)]
pub struct JobContext {
    pending: Vec<PendingJob>,
}

impl JobContext {
    /// Creates an empty context.
    pub(crate) fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Stages a follow-up job for immediate execution.
    ///
    /// # Errors
    ///
    /// Returns error if the args fail to serialize.
    pub fn enqueue<A: JobArgs>(&mut self, args: &A) -> Result<()> {
        self.enqueue_scheduled(args, Utc::now())
    }

    /// Stages a follow-up job that becomes due at `run_after`.
    ///
    /// # Errors
    ///
    /// Returns error if the args fail to serialize.
    pub fn enqueue_scheduled<A: JobArgs>(
        &mut self,
        args: &A,
        run_after: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_value(args)?;
        self.pending.push(PendingJob {
            kind: A::KIND,
            queue: A::QUEUE,
            max_attempts: A::MAX_ATTEMPTS,
            payload,
            run_after,
        });

        Ok(())
    }

    /// Number of jobs staged so far.
    pub fn staged(&self) -> usize {
        self.pending.len()
    }

    /// Takes ownership of the staged jobs for flushing.
    pub(crate) fn take_pending(&mut self) -> Vec<PendingJob> {
        std::mem::take(&mut self.pending)
    }
}

/// A worker routine for one job kind.
///
/// Implementations must be idempotent: the queue guarantees at-least-once
/// execution, so a crash after side effects but before completion re-runs
/// the handler with the same payload.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Kind discriminator this handler consumes.
    fn kind(&self) -> &'static str;

    /// Executes one job.
    ///
    /// Follow-up jobs go through `ctx`; they are enqueued only if this
    /// method returns `Ok`.
    ///
    /// # Errors
    ///
    /// `JobError::Retry` re-runs the job with backoff, `JobError::Discard`
    /// parks it permanently.
    async fn execute(&self, job: &Job, ctx: &mut JobContext) -> std::result::Result<(), JobError>;
}

/// Registry mapping job kinds to handlers.
///
/// Construction is two-phase: build the registry, register handlers (which
/// may themselves hold a `QueueClient`), then hand the finished registry to
/// the runner. This keeps handlers that enqueue downstream work free of
/// initialization cycles.
#[derive(Default)]
pub struct Workers {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl Workers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Registers a handler for its kind.
    ///
    /// Registering the same kind twice replaces the earlier handler.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            warn!(kind, "replaced existing handler registration");
        }
    }

    /// Looks up the handler for a kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered kinds, for startup logging.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}
