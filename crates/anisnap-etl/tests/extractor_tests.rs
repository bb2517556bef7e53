//! Extractor behaviour against a mocked Jikan API
//!
//! Covers pagination termination, page caps, retry classification and
//! request spacing.

mod common;

use anisnap_etl::extract::{JikanExtractor, StopReason};
use common::{anime, jikan_config, page, search_job};
use std::time::{Duration, Instant};
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_pagination_stops_on_last_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![anime(1, "Fullmetal Alchemist: Brotherhood", 9.1), anime(2, "Steins;Gate", 9.07)],
            1,
            true,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(3, "Gintama", 9.0)], 2, false)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], 3, false)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::LastPage);
    assert_eq!(outcome.pages_fetched, 2);
    let ids: Vec<i64> = outcome.items.iter().map(|a| a.mal_id).collect();
    assert_eq!(ids, vec![1, 2, 3], "items must keep page order");
}

#[tokio::test]
async fn test_max_pages_caps_pagination() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(1, "Monster", 8.9)], 1, true)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(2, "Mushishi", 8.7)], 2, false)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("movies", "movies", Some(1))).await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::PageCap);
    assert_eq!(outcome.pages_fetched, 1);
    assert_eq!(outcome.items.len(), 1);
}

#[tokio::test]
async fn test_job_params_are_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("order_by", "score"))
        .and(query_param("limit", "25"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(1, "Monster", 8.9)], 1, false)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.items.len(), 1);
}

#[tokio::test]
async fn test_configured_user_agent_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(header("user-agent", "anisnap-etl-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(1, "Monster", 8.9)], 1, false)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::LastPage);
    assert_eq!(outcome.items.len(), 1);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(1, "Monster", 8.9)], 1, false)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::LastPage);
    assert_eq!(outcome.items.len(), 1);
}

#[tokio::test]
async fn test_persistent_server_error_returns_collected_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(1, "Monster", 8.9)], 1, true)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::RequestFailure);
    assert!(outcome.stop_reason.is_degraded());
    assert_eq!(outcome.pages_fetched, 1);
    assert_eq!(outcome.items.len(), 1);
}

#[tokio::test]
async fn test_rate_limited_request_waits_for_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![anime(1, "Monster", 8.9)], 1, false)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let started = Instant::now();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1), "Retry-After must be honoured");
    assert_eq!(outcome.stop_reason, StopReason::LastPage);
    assert_eq!(outcome.items.len(), 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::RequestFailure);
    assert_eq!(outcome.pages_fetched, 0);
    assert!(outcome.items.is_empty());
}

#[tokio::test]
async fn test_malformed_page_keeps_earlier_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![anime(1, "Monster", 8.9), anime(2, "Mushishi", 8.7)],
            1,
            true,
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/anime"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "unexpected": true })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = JikanExtractor::new(&jikan_config(&mock_server.uri())).unwrap();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::ParseFailure);
    assert_eq!(outcome.pages_fetched, 1);
    assert_eq!(outcome.items.len(), 2);
}

#[tokio::test]
async fn test_requests_are_spaced_by_rate_limit() {
    let mock_server = MockServer::start().await;

    for page_number in 1..=3u32 {
        Mock::given(method("GET"))
            .and(path("/anime"))
            .and(query_param("page", page_number.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![anime(page_number as i64, "Monster", 8.9)],
                page_number,
                page_number < 3,
            )))
            .mount(&mock_server)
            .await;
    }

    let mut config = jikan_config(&mock_server.uri());
    config.rate_limit_delay = Duration::from_millis(200);

    let extractor = JikanExtractor::new(&config).unwrap();
    let started = Instant::now();
    let outcome = extractor.fetch(&search_job("top", "top", None)).await.unwrap();

    assert_eq!(outcome.pages_fetched, 3);
    // Two gaps between three requests
    assert!(started.elapsed() >= Duration::from_millis(400));
}
