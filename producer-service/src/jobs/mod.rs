//! Periodic job framework for the dispatch scheduler.
//!
//! Each job runs on its own task driven by a `tokio::time::interval` with
//! `MissedTickBehavior::Skip`: the loop awaits the full tick body before
//! polling the interval again, so a job identity can never run reentrantly
//! and ticks that come due while a slow tick is still running are skipped.
//! Errors are logged and never escape the loop; shutdown is cooperative via
//! a broadcast signal observed between ticks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::services::{cleanup, dispatcher, heartbeat, message_service, retry_scan};
use crate::state::AppState;

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Job identity used in logs
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    async fn tick(&self) -> Result<()>;
}

/// Run one job until shutdown. Consecutive failures are counted so a flapping
/// dependency shows up in the logs as one recovery line instead of noise.
pub async fn run_job_loop(
    job: Arc<dyn PeriodicJob>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = interval(job.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures = 0u32;

    info!(
        job_name = %job.name(),
        period_secs = job.period().as_secs(),
        "Starting job loop"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match job.tick().await {
                    Ok(()) => {
                        if consecutive_failures > 0 {
                            info!(
                                job_name = %job.name(),
                                recovered_after = consecutive_failures,
                                "Job recovered after failures"
                            );
                            consecutive_failures = 0;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(
                            job_name = %job.name(),
                            error = %e,
                            consecutive_failures,
                            "Job tick failed, will retry on next interval"
                        );
                    }
                }
            }
            _ = shutdown.recv() => {
                info!(job_name = %job.name(), "Received shutdown signal, stopping job loop");
                break;
            }
        }
    }

    info!(job_name = %job.name(), "Job loop stopped");
}

/// Spawn every scheduler job for this producer instance.
pub fn spawn_all(
    state: AppState,
    shutdown: &tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let jobs: Vec<Arc<dyn PeriodicJob>> = vec![
        Arc::new(DispatchPendingJob { state: state.clone() }),
        Arc::new(RetryScanJob { state: state.clone() }),
        Arc::new(CleanupJob { state: state.clone() }),
        Arc::new(HeartbeatJob { state: state.clone() }),
        Arc::new(BatchFlushJob { state }),
    ];

    jobs.into_iter()
        .map(|job| {
            let receiver = shutdown.subscribe();
            tokio::spawn(run_job_loop(job, receiver))
        })
        .collect()
}

struct DispatchPendingJob {
    state: AppState,
}

#[async_trait]
impl PeriodicJob for DispatchPendingJob {
    fn name(&self) -> &'static str {
        "dispatch_pending"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.state.config.dispatch_interval_secs)
    }

    async fn tick(&self) -> Result<()> {
        dispatcher::run_dispatch_tick(
            &self.state.db,
            self.state.publisher.as_ref(),
            &self.state.config.identity.service_id,
            self.state.config.dispatch_batch_size,
            self.state.config.message_ttl_hours,
            &self.state.metrics,
        )
        .await?;
        Ok(())
    }
}

struct RetryScanJob {
    state: AppState,
}

#[async_trait]
impl PeriodicJob for RetryScanJob {
    fn name(&self) -> &'static str {
        "retry_scan"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.state.config.retry_scan_interval_secs)
    }

    async fn tick(&self) -> Result<()> {
        retry_scan::run_retry_scan_tick(
            &self.state.db,
            &self.state.config.identity,
            self.state.config.agent_staleness_secs,
            &self.state.metrics,
        )
        .await?;
        Ok(())
    }
}

struct CleanupJob {
    state: AppState,
}

#[async_trait]
impl PeriodicJob for CleanupJob {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.state.config.cleanup_interval_secs)
    }

    async fn tick(&self) -> Result<()> {
        cleanup::run_cleanup_tick(&self.state.db, self.state.config.retention_days).await?;
        Ok(())
    }
}

struct HeartbeatJob {
    state: AppState,
}

#[async_trait]
impl PeriodicJob for HeartbeatJob {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.state.config.heartbeat_interval_secs)
    }

    async fn tick(&self) -> Result<()> {
        heartbeat::run_heartbeat_tick(&self.state.db, &self.state.config, &self.state.metrics)
            .await?;
        Ok(())
    }
}

struct BatchFlushJob {
    state: AppState,
}

#[async_trait]
impl PeriodicJob for BatchFlushJob {
    fn name(&self) -> &'static str {
        "batch_flush"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.state.config.batch_flush_interval_secs)
    }

    async fn tick(&self) -> Result<()> {
        message_service::flush_batch(&self.state).await?;
        Ok(())
    }
}
