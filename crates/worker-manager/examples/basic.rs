// Basic Worker Manager Example
//
// Starts a small pool, submits a batch of jobs (some slow enough to hit the
// timeout), and shuts down after every job has been handled.
//
// Run with: RUST_LOG=info cargo run -p async-worker-manager --example basic

use std::time::Duration;

use anyhow::Result;
use async_worker_manager::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone)]
struct Job {
    id: u32,
    work: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "async_worker_manager=debug,basic=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerManagerConfig::from_env()?
        .with_num_workers(3)
        .with_queue_size(4)
        .with_timeout(Duration::from_millis(250));

    let manager = WorkerManager::new(
        config,
        handler_fn(|job: Job| async move {
            tokio::time::sleep(job.work).await;
            if job.id % 7 == 0 {
                anyhow::bail!("job {} rejected by downstream", job.id);
            }
            tracing::info!(job = job.id, "Job done");
            Ok(())
        }),
    )?
    .with_timeout_callback(timeout_callback_fn(|job: Job| async move {
        tracing::info!(job = job.id, "Job abandoned after timeout");
        Ok(())
    }));

    manager.start().await?;

    for id in 1..=20 {
        let work = Duration::from_millis(if id % 5 == 0 { 400 } else { 50 });
        manager.handle(Job { id, work }).await?;
    }

    manager.stop().await;

    let stats = manager.stats();
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "All jobs handled"
    );
    Ok(())
}
