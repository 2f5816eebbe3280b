use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::reader::{ReadResult, ReadService, ServedFrom};
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub reader: ReadService,
    pub scheduler: Arc<Scheduler>,
}

/// Build the Axum router for the fixtures API.
///
/// The `/:id` route is registered last so the literal routes win.
pub fn router(state: AppState) -> Router {
    let fixtures = Router::new()
        .route("/live", get(live_handler))
        .route("/today", get(today_handler))
        .route("/leagues", get(leagues_handler))
        .route("/standings", get(standings_handler))
        .route("/stats", get(stats_handler))
        .route("/freshness", get(freshness_handler))
        .route("/force-update", post(force_update_handler))
        .route("/:id", get(fixture_by_id_handler));

    Router::new()
        .nest("/fixtures", fixtures)
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Uniform response envelope; `source` and `cached` tell the client where
/// the payload came from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
    source: ServedFrom,
    cached: bool,
    last_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    fn from_read(result: ReadResult<T>) -> Json<Self> {
        let message = (result.source == ServedFrom::Empty).then(|| "no data yet".to_string());
        Json(Envelope {
            success: true,
            cached: result.source == ServedFrom::Cache,
            data: result.data,
            source: result.source,
            last_update: result.captured_at,
            message,
        })
    }
}

#[derive(Debug, Serialize)]
struct ApiError {
    success: bool,
    error: String,
}

fn internal_error(e: anyhow::Error) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            success: false,
            error: format!("{e:#}"),
        }),
    )
}

fn bad_request(msg: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            success: false,
            error: msg.to_string(),
        }),
    )
}

/// GET /fixtures/live
async fn live_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    state
        .reader
        .get_live_fixtures()
        .await
        .map(Envelope::from_read)
        .map_err(internal_error)
}

/// GET /fixtures/today
async fn today_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    state
        .reader
        .get_today_fixtures()
        .await
        .map(Envelope::from_read)
        .map_err(internal_error)
}

/// GET /fixtures/leagues
async fn leagues_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    state
        .reader
        .get_top_leagues()
        .await
        .map(Envelope::from_read)
        .map_err(internal_error)
}

#[derive(Debug, Deserialize)]
struct StandingsQuery {
    league: Option<u32>,
    season: Option<i32>,
}

/// GET /fixtures/standings?league=39&season=2024
async fn standings_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StandingsQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let (league, season) = match (query.league, query.season) {
        (Some(league), Some(season)) => (league, season),
        _ => return Err(bad_request("query parameters 'league' and 'season' are required")),
    };
    state
        .reader
        .get_standings(league, Some(season))
        .await
        .map(Envelope::from_read)
        .map_err(internal_error)
}

/// GET /fixtures/:id — an unknown id is not an error, just `data: null`.
async fn fixture_by_id_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    state
        .reader
        .get_fixture_by_id(&id)
        .await
        .map(Envelope::from_read)
        .map_err(internal_error)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    success: bool,
    scheduler: crate::scheduler::SchedulerStats,
    quota_remaining: Vec<QuotaEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotaEntry {
    adapter: String,
    remaining: u32,
}

/// GET /fixtures/stats
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let quota_remaining = state
        .scheduler
        .adapter_quotas()
        .into_iter()
        .map(|(adapter, remaining)| QuotaEntry { adapter, remaining })
        .collect();
    Json(StatsResponse {
        success: true,
        scheduler: state.scheduler.stats(),
        quota_remaining,
    })
}

/// GET /fixtures/freshness
async fn freshness_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let entries = state.reader.get_data_freshness().map_err(internal_error)?;
    let count = state.reader.snapshot_count().map_err(internal_error)?;
    let map: serde_json::Map<String, serde_json::Value> = entries
        .into_iter()
        .map(|(key, freshness)| {
            (
                key,
                serde_json::to_value(freshness).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect();
    Ok(Json(serde_json::json!({
        "success": true,
        "snapshotCount": count,
        "datasets": map,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForceUpdateResponse {
    success: bool,
    outcome: crate::scheduler::CycleOutcome,
}

/// POST /fixtures/force-update
async fn force_update_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let outcome = state.scheduler.run_cycle().await;
    Json(ForceUpdateResponse {
        success: true,
        outcome,
    })
}
