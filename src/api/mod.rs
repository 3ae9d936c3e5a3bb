//! REST API for the threat indicator dashboard

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::collectors::{run_collectors, FeedCollector};
use crate::cve_feed::CveFeedClient;
use crate::enrichment::neutrino::NeutrinoClient;
use crate::models::{CheckParams, Indicator};
use crate::storage::{IndicatorStore, PAGE_VIEW_COUNTER, SEARCH_COUNTER};

/// Application state shared across handlers
pub struct AppState {
    pub store: IndicatorStore,
    /// Present only when provider credentials are configured
    pub neutrino: Option<NeutrinoClient>,
    pub cve_feed: CveFeedClient,
    pub collectors: Vec<Box<dyn FeedCollector>>,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Indicator search
        .route("/api/search", get(search_indicators))
        .route("/api/fts_search", get(search_indicators))
        .route("/api/check", get(check_indicator))
        .route("/api/list", get(list_indicators))
        // Statistics
        .route("/api/stats/entries", get(entry_count))
        .route("/api/stats/searches", get(search_count))
        .route("/api/stats/type-breakdown", get(type_breakdown))
        .route("/api/stats/increment-search", post(increment_search))
        // CVE headlines
        .route("/api/rss/cves", get(cve_headlines))
        // Blocklist cache and live proxy
        .route("/api/neutrino/cache", get(cached_blocklist))
        .route("/api/neutrino/live", get(live_blocklist))
        .route("/api/neutrino/save", post(save_blocklist))
        // Page views and background jobs
        .route("/track", post(track_page_view))
        .route("/api/feeds/refresh", post(refresh_feeds))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

// ==================== Handlers ====================

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "threatlens",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn search_indicators(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Indicator>>, (StatusCode, Json<Value>)> {
    let query = params.get("q").ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing 'q' parameter" })),
        )
    })?;

    state
        .store
        .search_indicators(query, 50)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to search indicators");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

async fn check_indicator(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CheckParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !matches!(params.indicator_type.as_str(), "ip" | "email" | "domain") {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid type" })),
        ));
    }

    let found = state
        .store
        .check_indicator(&params.indicator_type, &params.value)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to check indicator");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    let body = match found {
        Some(indicator) => json!({
            "match": true,
            "value": indicator.value,
            "category": indicator.category,
            "source": indicator.source,
            "severity": indicator.severity,
            "notes": indicator.notes,
        }),
        None => json!({
            "match": false,
            "value": params.value,
        }),
    };

    Ok(Json(body))
}

async fn list_indicators(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Indicator>>, (StatusCode, Json<Value>)> {
    state
        .store
        .list_indicators(params.limit.unwrap_or(100))
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list indicators");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

async fn entry_count(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .store
        .entry_count()
        .await
        .map(|count| Json(json!({ "count": count })))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to count entries");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

async fn search_count(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .store
        .counter(SEARCH_COUNTER)
        .await
        .map(|count| Json(json!({ "count": count })))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read search counter");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

async fn type_breakdown(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HashMap<String, i64>>, (StatusCode, Json<Value>)> {
    state
        .store
        .category_breakdown()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to compute type breakdown");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

async fn increment_search(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .store
        .increment_counter(SEARCH_COUNTER)
        .await
        .map(|count| Json(json!({ "count": count })))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to increment search counter");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

async fn cve_headlines(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.cve_feed.latest().await {
        Ok(items) => Ok(Json(json!({ "items": items }))),
        Err(e) => {
            tracing::warn!(error = %e, "CVE feed fetch failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "CVE feed unavailable" })),
            ))
        }
    }
}

async fn cached_blocklist(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let ip = params.get("ip").map(String::as_str).unwrap_or("");
    if ip.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing IP" })),
        ));
    }

    let cached = state.store.cached_blocklist(ip).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to read blocklist cache");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;

    match cached {
        Some(data) => Ok(Json(data)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No cached data" })),
        )),
    }
}

async fn live_blocklist(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let ip = params.get("ip").map(String::as_str).unwrap_or("");

    let Some(neutrino) = &state.neutrino else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing config or IP" })),
        ));
    };

    if ip.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing config or IP" })),
        ));
    }

    match neutrino.ip_blocklist(ip).await {
        Ok(data) => Ok(Json(data)),
        Err(e) => {
            tracing::warn!(error = %e, ip, "Live blocklist lookup failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Neutrino API error" })),
            ))
        }
    }
}

async fn save_blocklist(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let ip = body.get("ip").and_then(|v| v.as_str()).unwrap_or("");
    let data = body.get("data");

    let (ip, data) = match (ip, data) {
        ("", _) | (_, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing ip or data" })),
            ));
        }
        (ip, Some(data)) => (ip, data),
    };

    state.store.save_blocklist(ip, data).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to save blocklist cache entry");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(Json(json!({ "status": "saved" })))
}

async fn track_page_view(State(state): State<Arc<AppState>>) -> Json<Value> {
    // The beacon never fails its caller; a lost page view is not worth a 500
    if let Err(e) = state.store.increment_counter(PAGE_VIEW_COUNTER).await {
        tracing::warn!(error = %e, "Failed to record page view");
    }

    Json(json!({ "status": "ok" }))
}

async fn refresh_feeds(State(state): State<Arc<AppState>>) -> Json<Value> {
    let state = state.clone();
    tokio::spawn(async move {
        let imported = run_collectors(&state.collectors, &state.store).await;
        tracing::info!(imported, "Manual feed refresh complete");
    });

    Json(json!({ "message": "Feed refresh triggered" }))
}
