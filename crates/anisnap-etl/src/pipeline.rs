//! Pipeline orchestrator
//!
//! Runs extract → transform → load for one job or for every configured job
//! in catalogue order. A job that fails is recorded in its [`JobResult`] and
//! never stops the jobs after it.

use crate::config::EtlConfig;
use crate::error::Result;
use crate::extract::{JikanExtractor, RateLimiter, StopReason};
use crate::jobs::{JobCatalog, JobDefinition};
use crate::load::{LoadStats, SnapshotLoader, SnapshotStore};
use crate::scheduler::{RunTarget, ScheduledWork};
use crate::transform::{AnimeTransformer, TransformSummary};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Lifecycle of one job run; the last four are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Extracting,
    Transforming,
    Loading,
    Success,
    /// Extraction returned nothing; transform and load were skipped
    SuccessNoData,
    /// No record survived validation; load was skipped
    SuccessNoValidData,
    Failed,
}

impl JobStatus {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::SuccessNoData | JobStatus::SuccessNoValidData
        )
    }

    pub fn is_terminal(self) -> bool {
        self.is_success() || self == JobStatus::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Extracting => "extracting",
            JobStatus::Transforming => "transforming",
            JobStatus::Loading => "loading",
            JobStatus::Success => "success",
            JobStatus::SuccessNoData => "success_no_data",
            JobStatus::SuccessNoValidData => "success_no_valid_data",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub record_count: u64,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
}

/// Outcome of one job run, returned to the caller and never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub run_id: Uuid,
    pub job_name: String,
    pub snapshot_type: String,
    pub snapshot_date: NaiveDate,
    pub status: JobStatus,
    pub extraction: Option<ExtractionSummary>,
    pub transformation: Option<TransformSummary>,
    pub loading: Option<LoadStats>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobResult {
    fn new(job: &JobDefinition, snapshot_date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job_name: job.name.clone(),
            snapshot_type: job.snapshot_type.clone(),
            snapshot_date,
            status: JobStatus::Pending,
            extraction: None,
            transformation: None,
            loading: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn advance(&mut self, status: JobStatus) {
        info!(job_name = %self.job_name, from = %self.status, to = %status, "Job state change");
        self.status = status;
    }

    fn finish(&mut self, status: JobStatus) {
        self.advance(status);
        self.finished_at = Some(Utc::now());
    }

    /// New rows inserted by this run; refreshed rows are not counted
    pub fn snapshots_loaded(&self) -> u64 {
        self.loading.as_ref().map_or(0, |l| l.inserted)
    }

    pub fn records_extracted(&self) -> u64 {
        self.extraction.as_ref().map_or(0, |e| e.record_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    CompletedWithErrors,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub job_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Jobs that finished with a success status
    pub jobs_executed: u64,
    pub total_anime_processed: u64,
    /// Rows inserted across all jobs
    pub total_snapshots_loaded: u64,
    pub errors: Vec<JobError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub failed_jobs: u64,
    pub pipeline_stats: PipelineStats,
}

/// Outcome of a pipeline run over one or more jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    /// In execution order
    pub jobs: Vec<JobResult>,
    pub summary: PipelineSummary,
}

impl PipelineResult {
    pub fn from_jobs(jobs: Vec<JobResult>) -> Self {
        let mut stats = PipelineStats::default();
        let mut successful_jobs = 0;

        for job in &jobs {
            stats.total_anime_processed += job.records_extracted();
            stats.total_snapshots_loaded += job.snapshots_loaded();

            if job.status.is_success() {
                successful_jobs += 1;
                stats.jobs_executed += 1;
            } else {
                stats.errors.push(JobError {
                    job_name: job.job_name.clone(),
                    error: job.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }

        let total_jobs = jobs.len() as u64;
        let failed_jobs = total_jobs - successful_jobs;
        let status = if failed_jobs == 0 {
            PipelineStatus::Completed
        } else {
            PipelineStatus::CompletedWithErrors
        };

        Self {
            status,
            jobs,
            summary: PipelineSummary {
                total_jobs,
                successful_jobs,
                failed_jobs,
                pipeline_stats: stats,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }
}

/// Reachability of the pipeline's two dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub database: bool,
    pub jikan_api: bool,
}

impl ConnectionReport {
    pub fn all_ok(&self) -> bool {
        self.database && self.jikan_api
    }
}

/// Composes extractor, transformer and loader over a snapshot store
pub struct EtlPipeline<S: ?Sized> {
    config: EtlConfig,
    store: Arc<S>,
    rate_limiter: Arc<RateLimiter>,
    snapshot_date: Option<NaiveDate>,
}

impl<S: SnapshotStore + ?Sized> EtlPipeline<S> {
    pub fn new(config: EtlConfig, store: Arc<S>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.jikan.rate_limit_delay));
        Self {
            config,
            store,
            rate_limiter,
            snapshot_date: None,
        }
    }

    /// Pin the as-of date instead of using the local calendar date
    pub fn with_snapshot_date(mut self, snapshot_date: NaiveDate) -> Self {
        self.snapshot_date = Some(snapshot_date);
        self
    }

    pub fn jobs(&self) -> &JobCatalog {
        &self.config.jobs
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn snapshot_date(&self) -> NaiveDate {
        self.snapshot_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Run one job by name.
    ///
    /// An unknown name is a configuration error; everything that goes wrong
    /// after the job starts is reported through the returned status.
    pub async fn run_job(&self, job_name: &str) -> Result<JobResult> {
        let job = self.config.jobs.get(job_name)?;
        Ok(self.run_definition(job, self.snapshot_date()).await)
    }

    /// Run every configured job in catalogue order
    pub async fn run_all_jobs(&self) -> PipelineResult {
        let snapshot_date = self.snapshot_date();
        info!(
            total_jobs = self.config.jobs.len(),
            %snapshot_date,
            "Starting full ETL pipeline"
        );

        let mut results = Vec::with_capacity(self.config.jobs.len());
        for job in self.config.jobs.iter() {
            results.push(self.run_definition(job, snapshot_date).await);
        }

        let result = PipelineResult::from_jobs(results);
        info!(
            status = ?result.status,
            total_jobs = result.summary.total_jobs,
            successful_jobs = result.summary.successful_jobs,
            failed_jobs = result.summary.failed_jobs,
            total_snapshots_loaded = result.summary.pipeline_stats.total_snapshots_loaded,
            "ETL pipeline completed"
        );

        result
    }

    async fn run_definition(&self, job: &JobDefinition, snapshot_date: NaiveDate) -> JobResult {
        let mut result = JobResult::new(job, snapshot_date);
        let span = info_span!("job", job_name = %job.name, run_id = %result.run_id);

        async {
            info!(snapshot_type = %job.snapshot_type, %snapshot_date, "Starting ETL job");

            match self.execute(job, &mut result).await {
                Ok(status) => {
                    result.finish(status);
                    info!(
                        status = %result.status,
                        snapshots_loaded = result.snapshots_loaded(),
                        "ETL job completed"
                    );
                },
                Err(e) => {
                    error!(error = %e, "ETL job failed");
                    result.error = Some(e.to_string());
                    result.finish(JobStatus::Failed);
                },
            }
        }
        .instrument(span)
        .await;

        result
    }

    async fn execute(&self, job: &JobDefinition, result: &mut JobResult) -> Result<JobStatus> {
        result.advance(JobStatus::Extracting);
        let extractor = JikanExtractor::with_rate_limiter(&self.config.jikan, self.rate_limiter.clone())?;
        let extracted = extractor.fetch(job).await?;
        drop(extractor);

        result.extraction = Some(ExtractionSummary {
            record_count: extracted.items.len() as u64,
            pages_fetched: extracted.pages_fetched,
            stop_reason: extracted.stop_reason,
        });
        if extracted.stop_reason.is_degraded() {
            warn!(
                stop_reason = ?extracted.stop_reason,
                records = extracted.items.len(),
                "Extraction ended early, continuing with partial data"
            );
        }
        if extracted.items.is_empty() {
            warn!("No data extracted");
            return Ok(JobStatus::SuccessNoData);
        }

        result.advance(JobStatus::Transforming);
        let mut transformer = AnimeTransformer::new();
        let snapshots = transformer.transform(&extracted.items, &job.snapshot_type, result.snapshot_date);
        result.transformation = Some(transformer.into_summary());
        if snapshots.is_empty() {
            warn!("No valid snapshots after transformation");
            return Ok(JobStatus::SuccessNoValidData);
        }

        result.advance(JobStatus::Loading);
        let loader = SnapshotLoader::new(self.store.clone());
        let loading = loader
            .load(&snapshots, self.config.loader.batch_size, self.config.loader.upsert)
            .await;
        if loading.errors > 0 {
            warn!(
                errors = loading.errors,
                total = loading.total,
                "Some snapshots failed to load"
            );
        }
        result.loading = Some(loading);

        Ok(JobStatus::Success)
    }

    /// Check the store and the API; failures are logged, not raised
    pub async fn test_connections(&self) -> ConnectionReport {
        let database = match self.store.ping().await {
            Ok(()) => {
                info!("Database connection OK");
                true
            },
            Err(e) => {
                error!(error = %e, "Database connection failed");
                false
            },
        };

        let jikan_api = match JikanExtractor::with_rate_limiter(&self.config.jikan, self.rate_limiter.clone()) {
            Ok(extractor) => match extractor.ping().await {
                Ok(()) => {
                    info!("Jikan API connection OK");
                    true
                },
                Err(e) => {
                    error!(error = %e, "Jikan API connection failed");
                    false
                },
            },
            Err(e) => {
                error!(error = %e, "Failed to build Jikan client");
                false
            },
        };

        ConnectionReport { database, jikan_api }
    }
}

#[async_trait]
impl<S: SnapshotStore + ?Sized + 'static> ScheduledWork for EtlPipeline<S> {
    async fn run(&self, target: &RunTarget) -> Result<PipelineResult> {
        match target {
            RunTarget::AllJobs => Ok(self.run_all_jobs().await),
            RunTarget::Job(name) => {
                let job = self.run_job(name).await?;
                Ok(PipelineResult::from_jobs(vec![job]))
            },
        }
    }

    async fn check_connectivity(&self) -> bool {
        self.test_connections().await.all_ok()
    }
}
