//! Job catalogue
//!
//! A job is a named, statically configured extraction target: an endpoint,
//! a set of query filters, an optional page cap and the `snapshot_type` tag
//! its rows are stored under.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Endpoint used by every built-in job
pub const ANIME_SEARCH_ENDPOINT: &str = "/anime";

/// Items requested per page; the upstream maximum
pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Query parameter value as written in a job definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    /// Repeated key; `None` entries are sent as an empty value
    List(Vec<Option<String>>),
}

impl ParamValue {
    fn push_pairs(&self, key: &str, out: &mut Vec<(String, String)>) {
        match self {
            ParamValue::Null => out.push((key.to_string(), String::new())),
            ParamValue::Bool(b) => out.push((key.to_string(), b.to_string())),
            ParamValue::Int(i) => out.push((key.to_string(), i.to_string())),
            ParamValue::Text(s) => out.push((key.to_string(), s.clone())),
            ParamValue::List(items) => {
                for item in items {
                    out.push((key.to_string(), item.clone().unwrap_or_default()));
                }
            },
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

/// Static definition of one extraction job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    /// Stop after this many pages even if more are available
    #[serde(default)]
    pub max_pages: Option<u32>,
    /// Stable dataset tag; a dimension of the stored rows, not a run id
    pub snapshot_type: String,
    #[serde(default)]
    pub description: String,
}

impl JobDefinition {
    /// Query pairs for one page request, `page` appended last
    pub fn query_for_page(&self, page: u32) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.params.len() + 1);
        for (key, value) in &self.params {
            if key == "page" {
                continue;
            }
            value.push_pairs(key, &mut pairs);
        }
        pairs.push(("page".to_string(), page.to_string()));
        pairs
    }

    fn anime_search(
        name: &str,
        filter: (&str, &str),
        max_pages: Option<u32>,
        snapshot_type: &str,
        description: &str,
    ) -> Self {
        let mut params = BTreeMap::new();
        params.insert("order_by".to_string(), ParamValue::from("score"));
        params.insert("sort".to_string(), ParamValue::from("desc"));
        params.insert("limit".to_string(), ParamValue::from(DEFAULT_PAGE_SIZE));
        // Excludes "pg" (children) and "rx" (adult)
        params.insert(
            "rating".to_string(),
            ParamValue::List(vec![
                Some("g".to_string()),
                Some("pg13".to_string()),
                Some("r17".to_string()),
                Some("r".to_string()),
                None,
            ]),
        );
        params.insert(filter.0.to_string(), ParamValue::from(filter.1));

        Self {
            name: name.to_string(),
            endpoint: ANIME_SEARCH_ENDPOINT.to_string(),
            params,
            max_pages,
            snapshot_type: snapshot_type.to_string(),
            description: description.to_string(),
        }
    }
}

/// Ordered collection of job definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobCatalog {
    jobs: Vec<JobDefinition>,
}

impl JobCatalog {
    pub fn new(jobs: Vec<JobDefinition>) -> Result<Self> {
        let catalog = Self { jobs };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The four jobs the dashboard is built on
    pub fn builtin() -> Self {
        Self {
            jobs: vec![
                JobDefinition::anime_search(
                    "top_anime",
                    ("status", "complete"),
                    Some(2),
                    "top",
                    "Top-rated completed anime",
                ),
                JobDefinition::anime_search(
                    "seasonal_current",
                    ("status", "airing"),
                    None,
                    "seasonal_current",
                    "Currently airing seasonal anime",
                ),
                JobDefinition::anime_search(
                    "seasonal_upcoming",
                    ("status", "upcoming"),
                    None,
                    "upcoming",
                    "Upcoming anime releases",
                ),
                JobDefinition::anime_search(
                    "popular_movies",
                    ("type", "movie"),
                    Some(1),
                    "popular_movies",
                    "Popular anime movies",
                ),
            ],
        }
    }

    /// Load a catalogue from a JSON array of job definitions
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read job file {}: {}", path.display(), e))
        })?;
        let jobs: Vec<JobDefinition> = serde_json::from_str(&raw).map_err(|e| {
            EtlError::Config(format!("Invalid job file {}: {}", path.display(), e))
        })?;
        Self::new(jobs)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut snapshot_types = HashSet::new();

        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(EtlError::Config("Job name cannot be empty".to_string()));
            }
            if !names.insert(job.name.as_str()) {
                return Err(EtlError::Config(format!("Duplicate job name: {}", job.name)));
            }
            if job.snapshot_type.trim().is_empty() {
                return Err(EtlError::Config(format!(
                    "Job {} has an empty snapshot_type",
                    job.name
                )));
            }
            if !snapshot_types.insert(job.snapshot_type.as_str()) {
                return Err(EtlError::Config(format!(
                    "snapshot_type '{}' is used by more than one job",
                    job.snapshot_type
                )));
            }
            if job.max_pages == Some(0) {
                return Err(EtlError::Config(format!(
                    "Job {} has max_pages = 0",
                    job.name
                )));
            }
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&JobDefinition> {
        self.jobs
            .iter()
            .find(|job| job.name == name)
            .ok_or_else(|| EtlError::UnknownJob(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
