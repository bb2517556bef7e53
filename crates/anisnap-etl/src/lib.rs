//! Anisnap ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Collects dated snapshots of the anime catalogue from the Jikan API and
//! stores them in PostgreSQL.
//!
//! # Overview
//!
//! - **Extract**: paginated, rate-limited, retrying requests per job
//! - **Transform**: per-record validation and normalization
//! - **Load**: batched, idempotent upserts keyed on
//!   `(source_id, snapshot_type, snapshot_date)`
//! - **Pipeline**: runs jobs and reports per-job and overall outcomes
//! - **Scheduler**: periodic runs with at most one run in flight
//!
//! # Example
//!
//! ```no_run
//! use anisnap_etl::config::EtlConfig;
//! use anisnap_etl::load::PgSnapshotStore;
//! use anisnap_etl::pipeline::EtlPipeline;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let store = PgSnapshotStore::connect(&config.database).await?;
//!     let pipeline = EtlPipeline::new(config, Arc::new(store));
//!     let result = pipeline.run_job("top_anime").await?;
//!     println!("{}: {}", result.job_name, result.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod load;
pub mod pipeline;
pub mod scheduler;
pub mod transform;

pub use config::EtlConfig;
pub use error::{ErrorKind, EtlError, Result, StoreError};
pub use jobs::{JobCatalog, JobDefinition};
pub use pipeline::{EtlPipeline, JobResult, JobStatus, PipelineResult, PipelineStatus};
pub use scheduler::{RunTarget, Scheduler, TriggerOutcome};
