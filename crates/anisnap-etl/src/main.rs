//! Anisnap ETL - command-line entry point

use anisnap_common::logging::{init_logging, LogConfig, LogLevel};
use anisnap_etl::config::EtlConfig;
use anisnap_etl::load::{MemorySnapshotStore, PgSnapshotStore, SnapshotLoader, SnapshotStore};
use anisnap_etl::pipeline::{EtlPipeline, JobResult, PipelineResult};
use anisnap_etl::scheduler::{RunTarget, Scheduler, TriggerOutcome};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Exit code for an unknown job name
const EXIT_USAGE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "anisnap-etl")]
#[command(author, version, about = "Anime catalogue snapshot ETL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one job, or every configured job, once
    Run {
        /// Job to run (all jobs when omitted)
        #[arg(short, long)]
        job: Option<String>,

        /// As-of date for the snapshots (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Load into an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// List configured jobs
    ListJobs,

    /// Check database and API connectivity
    TestConnections,

    /// Run the pipeline periodically
    Schedule {
        /// Run a single cycle immediately and exit
        #[arg(long)]
        once: bool,

        /// Seconds between runs (overrides SCHEDULER_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Schedule a single job instead of all jobs
        #[arg(short, long)]
        job: Option<String>,
    },

    /// Apply database migrations
    Migrate,

    /// Delete snapshots older than the retention window
    Prune {
        /// Snapshot type to prune (e.g. "top")
        #[arg(long)]
        snapshot_type: String,

        /// Days of snapshots to keep
        #[arg(long, default_value_t = 30)]
        keep_days: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("anisnap-etl")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {:#}", e);
            None
        },
    };

    let code = match execute_command(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            1
        },
    };

    // Flush file logs before exiting
    drop(guard);
    if code != 0 {
        process::exit(code);
    }
}

async fn execute_command(command: Command) -> Result<i32> {
    let config = EtlConfig::load().context("Failed to load configuration")?;

    match command {
        Command::Run { job, date, dry_run } => {
            if let Some(name) = job.as_deref() {
                if let Some(code) = reject_unknown_job(&config, name) {
                    return Ok(code);
                }
            }

            if dry_run {
                info!("Dry run: loading into an in-memory store");
                let store = Arc::new(MemorySnapshotStore::new());
                let code = run_once(build_pipeline(config, store.clone(), date), job.as_deref()).await?;
                println!("Dry run stored {} snapshots in memory", store.len());
                Ok(code)
            } else {
                let store = Arc::new(PgSnapshotStore::connect(&config.database).await?);
                run_once(build_pipeline(config, store, date), job.as_deref()).await
            }
        },

        Command::ListJobs => {
            println!("Available ETL jobs:");
            for job in config.jobs.iter() {
                let cap = job
                    .max_pages
                    .map_or_else(|| "all pages".to_string(), |p| format!("max {} pages", p));
                println!("  {:<20} {} ({}, {})", job.name, job.description, job.snapshot_type, cap);
            }
            Ok(0)
        },

        Command::TestConnections => {
            let report = match connect_or_unreachable(&config).await {
                Some(pg) => EtlPipeline::new(config, Arc::new(pg)).test_connections().await,
                None => {
                    let offline = Arc::new(MemorySnapshotStore::new());
                    offline.set_available(false);
                    EtlPipeline::new(config, offline).test_connections().await
                },
            };

            println!("Connection test results:");
            println!("  database:  {}", status_label(report.database));
            println!("  jikan_api: {}", status_label(report.jikan_api));
            Ok(if report.all_ok() { 0 } else { 1 })
        },

        Command::Schedule {
            once,
            interval_secs,
            job,
        } => {
            if let Some(name) = job.as_deref() {
                if let Some(code) = reject_unknown_job(&config, name) {
                    return Ok(code);
                }
            }

            let mut scheduler_config = config.scheduler;
            if let Some(secs) = interval_secs.filter(|secs| *secs > 0) {
                scheduler_config.interval = Duration::from_secs(secs);
            }
            let target = job.map_or(RunTarget::AllJobs, RunTarget::Job);

            let store = Arc::new(PgSnapshotStore::connect(&config.database).await?);
            let pipeline = Arc::new(EtlPipeline::new(config, store));
            let scheduler = Scheduler::new(pipeline, scheduler_config, target);

            if once {
                return Ok(match scheduler.trigger().await {
                    TriggerOutcome::Completed(result) => {
                        print_pipeline(&result);
                        if result.is_success() { 0 } else { 1 }
                    },
                    TriggerOutcome::Skipped => 0,
                    TriggerOutcome::Failed(message) | TriggerOutcome::Aborted(message) => {
                        eprintln!("Scheduled run failed: {}", message);
                        1
                    },
                });
            }

            scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "Failed to listen for shutdown signal");
                        std::future::pending::<()>().await;
                    }
                    info!("Shutdown signal received");
                })
                .await;
            Ok(0)
        },

        Command::Migrate => {
            let store = PgSnapshotStore::connect(&config.database).await?;
            store.migrate().await?;
            println!("Migrations applied");
            Ok(0)
        },

        Command::Prune {
            snapshot_type,
            keep_days,
        } => {
            let store = Arc::new(PgSnapshotStore::connect(&config.database).await?);
            let loader = SnapshotLoader::new(store);
            let removed = loader
                .cleanup_old_snapshots(&snapshot_type, keep_days, Local::now().date_naive())
                .await?;
            println!("Removed {} '{}' snapshots older than {} days", removed, snapshot_type, keep_days);
            Ok(0)
        },
    }
}

fn build_pipeline<S: SnapshotStore + ?Sized>(
    config: EtlConfig,
    store: Arc<S>,
    date: Option<NaiveDate>,
) -> EtlPipeline<S> {
    let pipeline = EtlPipeline::new(config, store);
    match date {
        Some(date) => pipeline.with_snapshot_date(date),
        None => pipeline,
    }
}

async fn run_once<S: SnapshotStore + ?Sized>(pipeline: EtlPipeline<S>, job: Option<&str>) -> Result<i32> {
    match job {
        Some(name) => {
            let result = pipeline.run_job(name).await?;
            print_job(&result);
            Ok(if result.status.is_success() { 0 } else { 1 })
        },
        None => {
            let result = pipeline.run_all_jobs().await;
            print_pipeline(&result);
            Ok(if result.is_success() { 0 } else { 1 })
        },
    }
}

/// Print the available jobs and return the usage exit code for an unknown name
fn reject_unknown_job(config: &EtlConfig, name: &str) -> Option<i32> {
    match config.jobs.get(name) {
        Ok(_) => None,
        Err(_) => {
            eprintln!("Unknown job '{}'. Available jobs: {}", name, config.jobs.names().join(", "));
            Some(EXIT_USAGE)
        },
    }
}

/// An unreachable database is reported as a failed check, not an error
async fn connect_or_unreachable(config: &EtlConfig) -> Option<PgSnapshotStore> {
    match PgSnapshotStore::connect(&config.database).await {
        Ok(store) => Some(store),
        Err(e) => {
            error!(error = %e, "Database connection failed");
            None
        },
    }
}

fn status_label(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAILED"
    }
}

fn print_job(result: &JobResult) {
    println!("Job {} [{}]: {}", result.job_name, result.snapshot_date, result.status);
    if let Some(extraction) = &result.extraction {
        println!(
            "  extracted:   {} records from {} pages",
            extraction.record_count, extraction.pages_fetched
        );
    }
    if let Some(transformation) = &result.transformation {
        println!(
            "  transformed: {} of {} ({:.1}%)",
            transformation.successful,
            transformation.total_processed,
            transformation.success_rate()
        );
    }
    if let Some(loading) = &result.loading {
        println!(
            "  loaded:      {} inserted, {} updated, {} skipped, {} errors",
            loading.inserted, loading.updated, loading.skipped, loading.errors
        );
    }
    if let Some(error) = &result.error {
        println!("  error:       {}", error);
    }
}

fn print_pipeline(result: &PipelineResult) {
    for job in &result.jobs {
        print_job(job);
    }
    let summary = &result.summary;
    println!(
        "Pipeline {:?}: {}/{} jobs succeeded, {} new snapshots loaded",
        result.status,
        summary.successful_jobs,
        summary.total_jobs,
        summary.pipeline_stats.total_snapshots_loaded
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_interval_flag_is_not_read_from_env() {
        std::env::set_var("SCHEDULER_INTERVAL_SECS", "42");
        let cli = Cli::try_parse_from(["anisnap-etl", "schedule", "--once"]);
        std::env::remove_var("SCHEDULER_INTERVAL_SECS");

        match cli.unwrap().command {
            Command::Schedule { once, interval_secs, job } => {
                assert!(once);
                assert_eq!(interval_secs, None);
                assert_eq!(job, None);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_interval_flag_overrides() {
        let cli = Cli::try_parse_from(["anisnap-etl", "schedule", "--interval-secs", "90", "-j", "top_anime"])
            .unwrap();
        match cli.command {
            Command::Schedule { interval_secs, job, .. } => {
                assert_eq!(interval_secs, Some(90));
                assert_eq!(job.as_deref(), Some("top_anime"));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
