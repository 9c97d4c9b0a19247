//! Durable PostgreSQL-backed job queue.
//!
//! Provides the at-least-once execution substrate the fan-out pipeline runs
//! on: typed job payloads dispatched by kind, named queues with dedicated
//! worker pools, scheduled execution, bounded system-level retries, and
//! transactional enqueue from inside a running handler.
//!
//! # Claim architecture
//!
//! Jobs live in a single `queue_jobs` table. Each worker claims one due job
//! at a time inside a transaction using `FOR UPDATE SKIP LOCKED`, so workers
//! never block each other and PostgreSQL distributes work fairly:
//!
//! ```text
//!              ┌──────────────────────────────────────────┐
//!              │                PostgreSQL                │
//!              │   queue_jobs (FOR UPDATE SKIP LOCKED)    │
//!              └──────────────────────────────────────────┘
//!                    │               │              │
//!               queue=events    queue=webhooks  queue=default
//!               5 workers       8 workers       10 workers
//! ```
//!
//! A handler stages follow-up jobs on its [`JobContext`]; the runner inserts
//! them in the same transaction that marks the job completed. A handler that
//! fails therefore enqueues nothing, which is what keeps event fan-out free
//! of duplicates across retries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod client;
pub mod error;
pub mod job;
pub mod runner;
pub mod schema;
pub mod worker;

pub use client::QueueClient;
pub use error::{JobError, QueueError, Result};
pub use job::{Job, JobArgs, JobState};
pub use runner::{QueueConfig, QueueRunner, RunnerConfig};
pub use worker::{JobContext, JobHandler, Workers};

/// Name of the queue used when job args do not pick one.
pub const DEFAULT_QUEUE: &str = "default";

/// Default worker count for the `default` queue.
pub const DEFAULT_QUEUE_WORKERS: usize = 10;

/// Default worker count for the `events` queue.
pub const EVENTS_QUEUE_WORKERS: usize = 5;

/// Default worker count for the `webhooks` queue.
pub const WEBHOOKS_QUEUE_WORKERS: usize = 8;

/// System-level attempt cap before a job is discarded.
pub const DEFAULT_MAX_SYSTEM_ATTEMPTS: i32 = 25;
