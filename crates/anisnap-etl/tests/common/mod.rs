//! Shared fixtures for the ETL integration tests

#![allow(dead_code)]

use anisnap_etl::config::{EtlConfig, JikanConfig};
use anisnap_etl::extract::RetryPolicy;
use anisnap_etl::jobs::{JobCatalog, JobDefinition};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Jikan settings pointed at a mock server, with short delays
pub fn jikan_config(base_url: &str) -> JikanConfig {
    JikanConfig {
        base_url: base_url.to_string(),
        rate_limit_delay: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
        user_agent: "anisnap-etl-tests".to_string(),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
    }
}

/// Full configuration against a mock server with the given jobs
pub fn etl_config(base_url: &str, jobs: JobCatalog) -> EtlConfig {
    EtlConfig {
        jikan: jikan_config(base_url),
        jobs,
        ..EtlConfig::default()
    }
}

/// Minimal `/anime` job
pub fn search_job(name: &str, snapshot_type: &str, max_pages: Option<u32>) -> JobDefinition {
    let mut params = BTreeMap::new();
    params.insert("order_by".to_string(), "score".into());
    params.insert("limit".to_string(), 25i64.into());

    JobDefinition {
        name: name.to_string(),
        endpoint: "/anime".to_string(),
        params,
        max_pages,
        snapshot_type: snapshot_type.to_string(),
        description: format!("{} test job", name),
    }
}

/// One anime record in the upstream shape
pub fn anime(mal_id: i64, title: &str, score: f64) -> Value {
    json!({
        "mal_id": mal_id,
        "url": format!("https://myanimelist.net/anime/{}", mal_id),
        "title": title,
        "title_english": null,
        "type": "TV",
        "episodes": 24,
        "status": "Finished Airing",
        "airing": false,
        "score": score,
        "scored_by": 1000,
        "rank": mal_id,
        "popularity": mal_id * 10,
        "members": 50000,
        "favorites": 1200,
        "synopsis": "  A   story\nabout   things.  ",
        "season": "spring",
        "year": 2009,
        "genres": [
            { "mal_id": 1, "type": "anime", "name": "Action", "url": "https://myanimelist.net/anime/genre/1" }
        ],
        "themes": [],
        "studios": [
            { "mal_id": 4, "type": "anime", "name": "Bones", "url": "https://myanimelist.net/anime/producer/4" }
        ]
    })
}

/// One page of `GET /anime`
pub fn page(items: Vec<Value>, current_page: u32, has_next_page: bool) -> Value {
    let count = items.len();
    json!({
        "pagination": {
            "last_visible_page": if has_next_page { current_page + 1 } else { current_page },
            "has_next_page": has_next_page,
            "current_page": current_page,
            "items": { "count": count, "total": count, "per_page": 25 }
        },
        "data": items
    })
}
