//! Anisnap Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and logging setup for the anisnap workspace.
//!
//! # Overview
//!
//! - **Types**: the snapshot natural key and the flattened entity reference
//!   that both the ETL loader and downstream readers agree on
//! - **Logging**: `tracing` subscriber configuration driven by `LOG_*`
//!   environment variables
//!
//! # Example
//!
//! ```no_run
//! use anisnap_common::logging::{init_logging, LogConfig};
//! use anisnap_common::types::NaturalKey;
//! use chrono::NaiveDate;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap_or_default();
//!     let key = NaturalKey::new(1, "top", date);
//!     tracing::info!(%key, "Natural key built");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod types;

pub use types::{EntityRef, NaturalKey};
