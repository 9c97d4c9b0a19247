//! Queue runner: per-queue worker pools with graceful shutdown.
//!
//! Each named queue gets a pool of workers that claim due jobs with
//! `FOR UPDATE SKIP LOCKED`, dispatch them to registered handlers, and
//! settle the outcome. A janitor task returns jobs orphaned by crashed
//! workers to the queue after a visibility timeout.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use fanout_core::{Clock, RealClock};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    backoff::retry_delay,
    client,
    error::{JobError, QueueError, Result},
    job::Job,
    worker::{JobContext, Workers},
    DEFAULT_QUEUE, DEFAULT_QUEUE_WORKERS, EVENTS_QUEUE_WORKERS, WEBHOOKS_QUEUE_WORKERS,
};

/// Worker pool sizing for one named queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name jobs are routed by.
    pub name: String,

    /// Number of concurrent workers claiming from this queue.
    pub workers: usize,
}

impl QueueConfig {
    /// Creates a queue configuration.
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self { name: name.into(), workers }
    }
}

/// Configuration for the queue runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Named queues and their worker counts.
    pub queues: Vec<QueueConfig>,

    /// How long an idle worker sleeps before polling again.
    pub poll_interval: Duration,

    /// Base delay for the retry backoff.
    pub base_retry_delay: Duration,

    /// Cap on the retry backoff.
    pub max_retry_delay: Duration,

    /// Jitter factor applied to retry delays.
    pub retry_jitter: f64,

    /// Grace period for in-flight handlers during shutdown.
    pub shutdown_timeout: Duration,

    /// Age after which a `running` job is presumed orphaned by a crash and
    /// returned to the queue.
    pub stale_after: Duration,

    /// How often the janitor sweeps for orphaned jobs.
    pub sweep_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            queues: vec![
                QueueConfig::new("events", EVENTS_QUEUE_WORKERS),
                QueueConfig::new("webhooks", WEBHOOKS_QUEUE_WORKERS),
                QueueConfig::new(DEFAULT_QUEUE, DEFAULT_QUEUE_WORKERS),
            ],
            poll_interval: Duration::from_secs(1),
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(300),
            retry_jitter: 0.25,
            shutdown_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Runs worker pools over the job table until shut down.
pub struct QueueRunner {
    pool: PgPool,
    workers: Arc<Workers>,
    config: RunnerConfig,
    cancellation_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    clock: Arc<dyn Clock>,
}

impl QueueRunner {
    /// Creates a runner over a finished handler registry.
    pub fn new(pool: PgPool, workers: Workers, config: RunnerConfig) -> Self {
        Self::with_clock(pool, workers, config, Arc::new(RealClock))
    }

    /// Creates a runner with an injected clock, for tests.
    pub fn with_clock(
        pool: PgPool,
        workers: Workers,
        config: RunnerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            workers: Arc::new(workers),
            config,
            cancellation_token: CancellationToken::new(),
            handles: Vec::new(),
            clock,
        }
    }

    /// Spawns every configured worker pool plus the janitor.
    ///
    /// Returns immediately; use [`QueueRunner::shutdown`] to drain.
    pub fn start(&mut self) {
        info!(
            kinds = ?self.workers.kinds(),
            queues = self.config.queues.len(),
            "starting queue runner"
        );

        for queue in &self.config.queues {
            for worker_id in 0..queue.workers {
                let worker = QueueWorker {
                    id: worker_id,
                    queue: queue.name.clone(),
                    pool: self.pool.clone(),
                    workers: self.workers.clone(),
                    config: self.config.clone(),
                    cancellation_token: self.cancellation_token.clone(),
                    clock: self.clock.clone(),
                };

                self.handles.push(tokio::spawn(async move { worker.run().await }));
            }
        }

        self.handles.push(tokio::spawn(janitor(
            self.pool.clone(),
            self.config.clone(),
            self.cancellation_token.clone(),
            self.clock.clone(),
        )));
    }

    /// Stops claiming new jobs and waits for in-flight handlers.
    ///
    /// Jobs still running when the grace period expires stay `running` in
    /// the table; the janitor of the next process returns them to the
    /// queue, so nothing is lost, only delayed.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ShutdownTimeout` when workers outlive the
    /// grace period.
    pub async fn shutdown(mut self) -> Result<()> {
        let timeout = self.config.shutdown_timeout;
        info!(workers = self.handles.len(), ?timeout, "draining queue runner");

        self.cancellation_token.cancel();

        let join_all = async {
            for handle in std::mem::take(&mut self.handles) {
                if let Err(join_error) = handle.await {
                    error!(error = %join_error, "queue worker panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => {
                info!("queue runner drained");
                Ok(())
            },
            Err(_) => {
                error!(?timeout, "queue workers did not drain in time");
                Err(QueueError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Cancellation token observed by all workers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}

/// One claim-and-execute loop bound to a named queue.
struct QueueWorker {
    id: usize,
    queue: String,
    pool: PgPool,
    workers: Arc<Workers>,
    config: RunnerConfig,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl QueueWorker {
    async fn run(&self) {
        debug!(queue = %self.queue, worker_id = self.id, "queue worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.claim_one().await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => {
                    tokio::select! {
                        () = self.clock.sleep(self.config.poll_interval) => {},
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
                Err(err) => {
                    error!(
                        queue = %self.queue,
                        worker_id = self.id,
                        error = %err,
                        "claim failed"
                    );
                    tokio::select! {
                        () = self.clock.sleep(Duration::from_secs(5)) => {},
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            }
        }

        debug!(queue = %self.queue, worker_id = self.id, "queue worker stopped");
    }

    /// Claims one due job, moving it to `running`.
    ///
    /// `SKIP LOCKED` lets concurrent workers pass over rows a sibling is
    /// claiming, so the select never blocks on another claim in progress.
    async fn claim_one(&self) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let job_id: Option<i64> = sqlx::query_scalar(
            r"
            SELECT id FROM queue_jobs
            WHERE queue = $1 AND state = 'available' AND run_after <= $2
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(&self.queue)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job_id) = job_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        let job = sqlx::query_as::<_, Job>(
            r"
            UPDATE queue_jobs
            SET state = 'running', attempt = attempt + 1, claimed_at = NOW()
            WHERE id = $1
            RETURNING id, kind, queue, payload, state, attempt, max_attempts,
                      run_after, last_error, created_at, finished_at
            ",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(job))
    }

    async fn process(&self, job: Job) {
        let Some(handler) = self.workers.get(&job.kind) else {
            warn!(job_id = job.id, kind = %job.kind, "discarding job with unknown kind");
            self.settle_failure(&job, &JobError::discard("no handler registered")).await;
            return;
        };

        let mut ctx = JobContext::new();
        let outcome = handler.execute(&job, &mut ctx).await;

        match outcome {
            Ok(()) => self.settle_success(&job, &mut ctx).await,
            Err(err) => self.settle_failure(&job, &err).await,
        }
    }

    /// Commits staged jobs and completion in one transaction.
    ///
    /// A failure here leaves the job `running`; the janitor re-queues it
    /// later, which is the at-least-once side of the contract.
    async fn settle_success(&self, job: &Job, ctx: &mut JobContext) {
        let staged = ctx.take_pending();

        let result = async {
            let mut tx = self.pool.begin().await?;

            client::insert_staged(&mut tx, &staged).await?;

            sqlx::query(
                "UPDATE queue_jobs SET state = 'completed', finished_at = NOW() WHERE id = $1",
            )
            .bind(job.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<(), QueueError>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(
                    job_id = job.id,
                    kind = %job.kind,
                    enqueued = staged.len(),
                    "job completed"
                );
            },
            Err(err) => {
                error!(job_id = job.id, error = %err, "failed to commit job completion");
            },
        }
    }

    async fn settle_failure(&self, job: &Job, err: &JobError) {
        let exhausted = job.attempt >= job.max_attempts;

        let result = if err.is_retryable() && !exhausted {
            let delay = retry_delay(
                job.attempt,
                self.config.base_retry_delay,
                self.config.max_retry_delay,
                self.config.retry_jitter,
            );
            let run_after = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(1));

            warn!(
                job_id = job.id,
                kind = %job.kind,
                attempt = job.attempt,
                next_run = %run_after,
                error = %err,
                "job failed, retry scheduled"
            );

            sqlx::query(
                r"
                UPDATE queue_jobs
                SET state = 'available', run_after = $2, last_error = $3
                WHERE id = $1
                ",
            )
            .bind(job.id)
            .bind(run_after)
            .bind(err.to_string())
            .execute(&self.pool)
            .await
        } else {
            warn!(
                job_id = job.id,
                kind = %job.kind,
                attempt = job.attempt,
                exhausted,
                error = %err,
                "job discarded"
            );

            sqlx::query(
                r"
                UPDATE queue_jobs
                SET state = 'discarded', finished_at = NOW(), last_error = $2
                WHERE id = $1
                ",
            )
            .bind(job.id)
            .bind(err.to_string())
            .execute(&self.pool)
            .await
        };

        if let Err(db_err) = result {
            error!(job_id = job.id, error = %db_err, "failed to settle job failure");
        }
    }
}

/// Returns jobs orphaned by crashed workers to the queue.
async fn janitor(
    pool: PgPool,
    config: RunnerConfig,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
) {
    loop {
        tokio::select! {
            () = clock.sleep(config.sweep_interval) => {},
            () = cancellation_token.cancelled() => break,
        }

        let stale_secs = i64::try_from(config.stale_after.as_secs()).unwrap_or(i64::MAX);
        let cutoff = Utc::now() - chrono::Duration::seconds(stale_secs);

        match sqlx::query(
            r"
            UPDATE queue_jobs
            SET state = 'available', claimed_at = NULL
            WHERE state = 'running' AND claimed_at < $1
            ",
        )
        .bind(cutoff)
        .execute(&pool)
        .await
        {
            Ok(result) if result.rows_affected() > 0 => {
                warn!(recovered = result.rows_affected(), "requeued orphaned running jobs");
            },
            Ok(_) => {},
            Err(err) => {
                error!(error = %err, "janitor sweep failed");
            },
        }
    }
}
