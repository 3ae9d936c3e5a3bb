//! Dashboard API router tests over an in-memory store

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::util::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use threatlens::api::{create_router, AppState};
use threatlens::collectors::plaintext::PlaintextFeed;
use threatlens::collectors::FeedCollector;
use threatlens::cve_feed::CveFeedClient;
use threatlens::enrichment::neutrino::NeutrinoClient;
use threatlens::models::NewIndicator;
use threatlens::storage::{IndicatorStore, PAGE_VIEW_COUNTER};

async fn test_store() -> IndicatorStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    let store = IndicatorStore::from_pool(pool);
    store.migrate().await.expect("Failed to run migrations");
    store
}

fn test_state(store: IndicatorStore) -> AppState {
    AppState {
        store,
        neutrino: None,
        // Unreachable by construction; tests that exercise the feed proxy
        // point it at a mock server instead
        cve_feed: CveFeedClient::with_feed_url("http://127.0.0.1:9/feed.xml"),
        collectors: Vec::new(),
    }
}

fn seed(value: &str, category: &str) -> NewIndicator {
    NewIndicator {
        indicator_type: "ip".to_string(),
        value: value.to_string(),
        category: category.to_string(),
        source: "feodo_tracker".to_string(),
        severity: "High".to_string(),
        notes: "C2 endpoint".to_string(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_service_metadata() {
    let app = create_router(Arc::new(test_state(test_store().await)));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "threatlens");
}

#[tokio::test]
async fn search_returns_matching_rows() {
    let store = test_store().await;
    store.upsert_indicator(&seed("1.2.3.4", "botnet")).await.unwrap();
    store.upsert_indicator(&seed("5.6.7.8", "spam")).await.unwrap();
    let app = create_router(Arc::new(test_state(store)));

    let response = app
        .clone()
        .oneshot(get("/api/search?q=1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["value"], "1.2.3.4");
    assert_eq!(rows[0]["category"], "botnet");
    assert_eq!(rows[0]["source"], "feodo_tracker");
    assert_eq!(rows[0]["severity"], "High");
    assert_eq!(rows[0]["notes"], "C2 endpoint");

    // fts_search is an alias for the same handler
    let response = app
        .clone()
        .oneshot(get("/api/fts_search?q=spam"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app.oneshot(get("/api/search")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn check_requires_exact_match_and_known_type() {
    let store = test_store().await;
    store.upsert_indicator(&seed("1.2.3.4", "botnet")).await.unwrap();
    let app = create_router(Arc::new(test_state(store)));

    let response = app
        .clone()
        .oneshot(get("/api/check?type=ip&value=1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({
            "match": true,
            "value": "1.2.3.4",
            "category": "botnet",
            "source": "feodo_tracker",
            "severity": "High",
            "notes": "C2 endpoint",
        })
    );

    // Same value under a different type is not a match
    let response = app
        .clone()
        .oneshot(get("/api/check?type=domain&value=1.2.3.4"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body, json!({"match": false, "value": "1.2.3.4"}));

    let response = app
        .oneshot(get("/api/check?type=url&value=1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_respects_the_limit() {
    let store = test_store().await;
    for i in 0..5 {
        store
            .upsert_indicator(&seed(&format!("10.0.0.{i}"), "scanner"))
            .await
            .unwrap();
    }
    let app = create_router(Arc::new(test_state(store)));

    let response = app.clone().oneshot(get("/api/list?limit=3")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 3);

    let response = app.oneshot(get("/api/list")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn stats_endpoints_round_trip() {
    let store = test_store().await;
    store.upsert_indicator(&seed("1.1.1.1", "botnet")).await.unwrap();
    store.upsert_indicator(&seed("2.2.2.2", "spam")).await.unwrap();
    let app = create_router(Arc::new(test_state(store)));

    let response = app.clone().oneshot(get("/api/stats/entries")).await.unwrap();
    assert_eq!(body_json(response).await, json!({"count": 2}));

    // The search counter starts at zero and survives increments
    let response = app.clone().oneshot(get("/api/stats/searches")).await.unwrap();
    assert_eq!(body_json(response).await, json!({"count": 0}));

    let response = app
        .clone()
        .oneshot(post("/api/stats/increment-search"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({"count": 1}));

    let response = app
        .clone()
        .oneshot(post("/api/stats/increment-search"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({"count": 2}));

    let response = app.clone().oneshot(get("/api/stats/searches")).await.unwrap();
    assert_eq!(body_json(response).await, json!({"count": 2}));

    let response = app
        .oneshot(get("/api/stats/type-breakdown"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({"botnet": 1, "spam": 1}));
}

#[tokio::test]
async fn neutrino_cache_miss_save_hit_round_trip() {
    let app = create_router(Arc::new(test_state(test_store().await)));

    let response = app
        .clone()
        .oneshot(get("/api/neutrino/cache?ip=9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let payload = json!({"blocklist": true, "reason": "spam", "sensor-count": 3});
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/neutrino/save",
            json!({"ip": "9.9.9.9", "data": payload}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "saved"}));

    // The cached payload comes back verbatim, unknown fields included
    let response = app
        .clone()
        .oneshot(get("/api/neutrino/cache?ip=9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, payload);

    let response = app.oneshot(get("/api/neutrino/cache")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn neutrino_save_rejects_incomplete_bodies() {
    let app = create_router(Arc::new(test_state(test_store().await)));

    let response = app
        .clone()
        .oneshot(post_json("/api/neutrino/save", json!({"ip": "9.9.9.9"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/api/neutrino/save",
            json!({"data": {"blocklist": false}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn live_lookup_requires_credentials_and_ip() {
    // No credentials configured
    let app = create_router(Arc::new(test_state(test_store().await)));
    let response = app
        .oneshot(get("/api/neutrino/live?ip=8.8.8.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Missing config or IP"})
    );

    // Credentials configured but no ip parameter
    let mut state = test_state(test_store().await);
    state.neutrino = Some(NeutrinoClient::with_base_url(
        "http://127.0.0.1:9",
        "test-user".to_string(),
        "test-key".to_string(),
    ));
    let app = create_router(Arc::new(state));
    let response = app.oneshot(get("/api/neutrino/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn live_lookup_passes_the_provider_response_through() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ip-blocklist"))
        .and(body_string_contains("user-id=test-user"))
        .and(body_string_contains("api-key=test-key"))
        .and(body_string_contains("ip=8.8.8.8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "8.8.8.8",
            "blocklist": false,
            "sensors": []
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let mut state = test_state(test_store().await);
    state.neutrino = Some(NeutrinoClient::with_base_url(
        provider.uri(),
        "test-user".to_string(),
        "test-key".to_string(),
    ));
    let app = create_router(Arc::new(state));

    let response = app
        .oneshot(get("/api/neutrino/live?ip=8.8.8.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"ip": "8.8.8.8", "blocklist": false, "sensors": []})
    );
}

#[tokio::test]
async fn live_lookup_maps_provider_failure_to_bad_gateway() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ip-blocklist"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&provider)
        .await;

    let mut state = test_state(test_store().await);
    state.neutrino = Some(NeutrinoClient::with_base_url(
        provider.uri(),
        "test-user".to_string(),
        "test-key".to_string(),
    ));
    let app = create_router(Arc::new(state));

    let response = app
        .oneshot(get("/api/neutrino/live?ip=8.8.8.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn rss_proxy_returns_parsed_headlines() {
    let upstream = MockServer::start().await;
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Latest CVEs</title>
    <item>
      <title>CVE-2024-1111 - Example RCE</title>
      <link>https://cvefeed.io/cve/CVE-2024-1111</link>
    </item>
    <item>
      <title>CVE-2024-2222 - Example XSS</title>
      <link>https://cvefeed.io/cve/CVE-2024-2222</link>
    </item>
  </channel>
</rss>"#;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(xml, "application/rss+xml"))
        .mount(&upstream)
        .await;

    let mut state = test_state(test_store().await);
    state.cve_feed = CveFeedClient::with_feed_url(format!("{}/feed.xml", upstream.uri()));
    let app = create_router(Arc::new(state));

    let response = app.oneshot(get("/api/rss/cves")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "items": [
                {"title": "CVE-2024-1111 - Example RCE", "link": "https://cvefeed.io/cve/CVE-2024-1111"},
                {"title": "CVE-2024-2222 - Example XSS", "link": "https://cvefeed.io/cve/CVE-2024-2222"},
            ]
        })
    );
}

#[tokio::test]
async fn rss_proxy_maps_upstream_failure_to_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let mut state = test_state(test_store().await);
    state.cve_feed = CveFeedClient::with_feed_url(format!("{}/feed.xml", upstream.uri()));
    let app = create_router(Arc::new(state));

    let response = app.oneshot(get("/api/rss/cves")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn track_counts_page_views() {
    let store = test_store().await;
    let app = create_router(Arc::new(test_state(store.clone())));

    let response = app.clone().oneshot(post("/track")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(post("/track")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(store.counter(PAGE_VIEW_COUNTER).await.unwrap(), 2);
}

#[tokio::test]
async fn feed_refresh_imports_in_the_background() {
    let feed = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# header\n1.2.3.4\n"))
        .mount(&feed)
        .await;

    let store = test_store().await;
    let collector: Box<dyn FeedCollector> = Box::new(PlaintextFeed::new(
        "test_feed",
        format!("{}/list.txt", feed.uri()),
        "botnet",
        "High",
        "test feed",
    ));
    let mut state = test_state(store.clone());
    state.collectors = vec![collector];
    let app = create_router(Arc::new(state));

    let response = app.oneshot(post("/api/feeds/refresh")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The refresh runs in a spawned task
    for _ in 0..100 {
        if store.entry_count().await.unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let row = store
        .check_indicator("ip", "1.2.3.4")
        .await
        .unwrap()
        .expect("feed row should be imported");
    assert_eq!(row.category, "botnet");
    assert_eq!(row.source, "test_feed");
}
