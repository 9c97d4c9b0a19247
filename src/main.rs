//! Fanout webhook fan-out service.
//!
//! Main entry point for the fanout server. Initializes the database, the
//! job queue worker pools, and the service wiring, then waits for a
//! shutdown signal and drains gracefully.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use fanout_core::{RealClock, Storage};
use fanout_delivery::{ClientConfig, DeliveryClient, DeliveryHandler};
use fanout_queue::{JobArgs, QueueClient, QueueConfig, QueueRunner, RunnerConfig, Workers};
use fanout_service::{EventProcessingHandler, EventReaperArgs, EventReaperHandler, WebhookService};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting fanout webhook service");

    let config = Config::from_env()?;
    info!(
        database_url = %config.database_url_masked(),
        events_workers = config.events_workers,
        webhooks_workers = config.webhooks_workers,
        default_workers = config.default_workers,
        "configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    run_migrations(&pool).await?;
    info!("database schema ready");

    let storage = Storage::new(pool.clone());
    let queue_client = QueueClient::new(pool.clone());
    let clock = Arc::new(RealClock::new());

    // Two-phase wiring: the queue client exists before any handler, so
    // handlers that enqueue downstream work never see a half-built queue.
    let delivery_client = DeliveryClient::new(ClientConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to build delivery client: {e}"))?;

    let mut workers = Workers::new();
    workers.register(Arc::new(EventProcessingHandler::new(storage.clone())));
    workers.register(Arc::new(DeliveryHandler::new(storage.clone(), delivery_client, clock)));
    workers.register(Arc::new(EventReaperHandler::new(storage.clone())));

    seed_reaper(&queue_client).await?;

    let runner_config = RunnerConfig {
        queues: vec![
            QueueConfig::new("events", config.events_workers),
            QueueConfig::new("webhooks", config.webhooks_workers),
            QueueConfig::new(fanout_queue::DEFAULT_QUEUE, config.default_workers),
        ],
        ..RunnerConfig::default()
    };

    let mut runner = QueueRunner::new(pool.clone(), workers, runner_config);
    runner.start();
    info!("queue worker pools started");

    // The facade is what front-end adapters (RPC/HTTP surfaces) call; the
    // binary keeps it alive alongside the worker pools.
    let _service = WebhookService::new(storage, queue_client);

    info!("fanout is ready");

    shutdown_signal().await;
    info!("shutdown signal received, draining workers");

    if let Err(e) = runner.shutdown().await {
        error!(error = %e, "queue drain incomplete, unfinished jobs remain durable");
    }

    pool.close().await;
    info!("fanout shutdown complete");

    Ok(())
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,fanout=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with startup retries.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Applies the idempotent schema setup for every subsystem.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    fanout_core::storage::schema::ensure_schema(pool)
        .await
        .map_err(|e| anyhow::anyhow!("domain schema setup failed: {e}"))?;

    fanout_queue::schema::ensure_schema(pool)
        .await
        .map_err(|e| anyhow::anyhow!("queue schema setup failed: {e}"))?;

    Ok(())
}

/// Seeds the self-perpetuating event reaper unless one is already queued.
async fn seed_reaper(queue: &QueueClient) -> Result<()> {
    let pending = queue
        .pending_count(EventReaperArgs::KIND)
        .await
        .map_err(|e| anyhow::anyhow!("failed to inspect reaper jobs: {e}"))?;

    if pending == 0 {
        queue
            .enqueue(&EventReaperArgs::default())
            .await
            .map_err(|e| anyhow::anyhow!("failed to seed reaper job: {e}"))?;
        info!("seeded event reaper job");
    }

    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}

/// Service configuration from environment variables.
struct Config {
    /// PostgreSQL connection string.
    database_url: String,
    /// Maximum database connections.
    database_max_connections: u32,
    /// Worker count for the `events` queue.
    events_workers: usize,
    /// Worker count for the `webhooks` queue.
    webhooks_workers: usize,
    /// Worker count for the `default` queue.
    default_workers: usize,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        Ok(Self {
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            events_workers: env_or("EVENTS_QUEUE_WORKERS", fanout_queue::EVENTS_QUEUE_WORKERS),
            webhooks_workers: env_or(
                "WEBHOOKS_QUEUE_WORKERS",
                fanout_queue::WEBHOOKS_QUEUE_WORKERS,
            ),
            default_workers: env_or("DEFAULT_QUEUE_WORKERS", fanout_queue::DEFAULT_QUEUE_WORKERS),
        })
    }

    /// Returns the database URL with the password masked for logging.
    fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}
