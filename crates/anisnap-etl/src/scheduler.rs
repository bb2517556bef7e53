//! Periodic pipeline scheduler
//!
//! At most one run is in flight per [`Scheduler`]: a trigger that arrives
//! while the busy flag is set is skipped, not queued. Each run executes in
//! its own task, so an error inside it is reported as
//! [`TriggerOutcome::Failed`], a panic as [`TriggerOutcome::Aborted`], and
//! the flag is released either way.

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::pipeline::PipelineResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// What a scheduled run executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    AllJobs,
    Job(String),
}

impl std::fmt::Display for RunTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunTarget::AllJobs => f.write_str("all jobs"),
            RunTarget::Job(name) => write!(f, "job {}", name),
        }
    }
}

/// Work the scheduler can trigger
#[async_trait]
pub trait ScheduledWork: Send + Sync + 'static {
    async fn run(&self, target: &RunTarget) -> Result<PipelineResult>;

    /// `true` when every dependency is reachable
    async fn check_connectivity(&self) -> bool;
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(PipelineResult),
    /// Another run was in flight
    Skipped,
    /// The run returned an error or a dependency was unreachable
    Failed(String),
    /// The run task panicked or was cancelled
    Aborted(String),
}

/// Clears the busy flag when dropped, including during unwinding
struct BusyGuard {
    flag: Arc<Mutex<bool>>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        *self.flag.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

pub struct Scheduler<W> {
    work: Arc<W>,
    config: SchedulerConfig,
    target: RunTarget,
    busy: Arc<Mutex<bool>>,
}

impl<W: ScheduledWork> Scheduler<W> {
    pub fn new(work: Arc<W>, config: SchedulerConfig, target: RunTarget) -> Self {
        Self {
            work,
            config,
            target,
            busy: Arc::new(Mutex::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Option<BusyGuard> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if *busy {
            return None;
        }
        *busy = true;
        Some(BusyGuard {
            flag: self.busy.clone(),
        })
    }

    /// Run the target now unless a run is already in progress
    pub async fn trigger(&self) -> TriggerOutcome {
        let Some(guard) = self.try_acquire() else {
            warn!(target_run = %self.target, "ETL run already in progress, skipping trigger");
            return TriggerOutcome::Skipped;
        };

        info!(target_run = %self.target, "Starting scheduled ETL run");
        let work = self.work.clone();
        let target = self.target.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            if !work.check_connectivity().await {
                return Err("Connection test failed".to_string());
            }
            work.run(&target).await.map_err(|e| e.to_string())
        });

        match handle.await {
            Ok(Ok(result)) => {
                info!(
                    status = ?result.status,
                    successful_jobs = result.summary.successful_jobs,
                    failed_jobs = result.summary.failed_jobs,
                    "Scheduled ETL run completed"
                );
                TriggerOutcome::Completed(result)
            },
            Ok(Err(message)) => {
                error!(error = %message, "Scheduled ETL run failed");
                TriggerOutcome::Failed(message)
            },
            Err(join_error) => {
                error!(error = %join_error, "Scheduled ETL run aborted");
                TriggerOutcome::Aborted(format!("ETL run aborted: {}", join_error))
            },
        }
    }

    /// Trigger every `interval` until `shutdown` resolves.
    ///
    /// Connectivity is checked once up front; a failure there is logged and
    /// the loop starts anyway. A failed cycle waits for the next interval
    /// like any other; only an aborted cycle pauses for the configured
    /// cool-down before polling again.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.config.interval.as_secs(),
            target_run = %self.target,
            "Starting ETL scheduler daemon"
        );

        if self.work.check_connectivity().await {
            info!("Initial connection test passed");
        } else {
            error!("Initial connection test failed, scheduler starting anyway");
        }

        let mut next_run = Instant::now() + self.config.interval;

        loop {
            let now = Instant::now();
            let pause = if now >= next_run {
                next_run = now + self.config.interval;
                match self.trigger().await {
                    TriggerOutcome::Aborted(_) => {
                        warn!(
                            cooldown_secs = self.config.error_cooldown.as_secs(),
                            "Scheduler cycle aborted, cooling down"
                        );
                        self.config.error_cooldown
                    },
                    TriggerOutcome::Completed(_) | TriggerOutcome::Skipped | TriggerOutcome::Failed(_) => {
                        Duration::ZERO
                    },
                }
            } else {
                Duration::ZERO
            };

            let wait = if pause.is_zero() {
                next_run
                    .saturating_duration_since(Instant::now())
                    .min(self.config.poll_interval)
            } else {
                next_run = next_run.max(Instant::now() + pause);
                pause
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("ETL scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
