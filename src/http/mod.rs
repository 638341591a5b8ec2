//! HTTP API (spec §6): `axum` router over the [`crate::query`] read-side and
//! the [`crate::orchestrator`] write-side, mirroring the bundled dashboard
//! server pattern elsewhere in this codebase's lineage.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{Config, Quality};
use crate::error::{Result, ScanError};
use crate::model::{ScanId, ScanState, StatsCache, TokenCategory, TokenSetId, TokenVote, VoteType};
use crate::orchestrator::progress::ProgressEvent;
use crate::orchestrator::{Orchestrator, SubmitOutcome};
use crate::query::{self, SiteDetail, TokenFilters};
use crate::store::Db;

#[derive(Clone)]
struct AppState {
    db: Db,
    orchestrator: Arc<Orchestrator>,
}

/// Boots the HTTP API and runs until a shutdown signal arrives.
pub async fn serve(db: Db, config: Config) -> Result<()> {
    let bind = config.http_bind.clone();
    let orchestrator = Orchestrator::new(db.clone(), config);
    let state = AppState { db, orchestrator };
    let app = build_router(state);

    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| ScanError::BadRequest(format!("invalid http_bind '{bind}': {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "motif http api listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ScanError::Internal(e.to_string()))?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/scan", post(submit_scan_handler))
        .route("/scan/:id/events", get(scan_events_handler))
        .route("/search", get(search_handler))
        .route("/site/:domain", get(get_site_handler))
        .route("/stats", get(stats_handler))
        .route("/vote", post(vote_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

/// Runs a blocking store call off the async runtime, per [`Db`]'s documented
/// contract that every synchronous call is dispatched via `spawn_blocking`.
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::Internal("blocking task panicked".into())),
    }
}

#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Scan(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(ErrorPayload { message: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanRequest {
    url: String,
    #[serde(default)]
    quality: Option<Quality>,
    /// Accepted for API compatibility (spec §6); this service has no
    /// client-facing pretty-printing switch to honor, since every response
    /// is already JSON through [`axum::Json`].
    #[serde(default)]
    #[allow(dead_code)]
    prettify: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanResponse {
    scan_id: ScanId,
    status: &'static str,
    domain: String,
}

async fn submit_scan_handler(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> std::result::Result<(StatusCode, Json<ScanResponse>), ApiError> {
    let quality = req.quality.unwrap_or_default();
    let outcome = state.orchestrator.submit(&req.url, quality).await?;

    let domain = reqwest::Url::parse(&req.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let (status, scan_id, label) = match outcome {
        SubmitOutcome::Started { scan_id } => (StatusCode::ACCEPTED, scan_id, "queued"),
        SubmitOutcome::AlreadyScanning { scan_id } => (StatusCode::ACCEPTED, scan_id, "scanning"),
        SubmitOutcome::Cached { scan_id, .. } => (StatusCode::OK, scan_id, "cached"),
    };

    Ok((status, Json(ScanResponse { scan_id, status: label, domain })))
}

const TOTAL_STEPS: u64 = 6;

fn phase_name(state: ScanState) -> &'static str {
    match state {
        ScanState::Queued => "queued",
        ScanState::Fetching => "fetching",
        ScanState::Parsing => "parsing",
        ScanState::Analyzing => "analyzing",
        ScanState::Diffing => "diffing",
        ScanState::Completed => "completed",
        ScanState::Failed => "failed",
        ScanState::Canceled => "canceled",
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SseProgressPayload {
    #[serde(rename = "type")]
    kind: &'static str,
    step: u64,
    total_steps: u64,
    phase: &'static str,
    message: String,
}

fn sse_payload(event: &ProgressEvent) -> SseProgressPayload {
    let kind = match event.state {
        ScanState::Completed => "completed",
        ScanState::Failed | ScanState::Canceled => "failed",
        _ => "progress",
    };
    SseProgressPayload {
        kind,
        step: event.step,
        total_steps: TOTAL_STEPS,
        phase: phase_name(event.state),
        message: event.message.clone(),
    }
}

struct SseState {
    progress: Arc<crate::orchestrator::progress::ScanProgress>,
    pending: std::collections::VecDeque<ProgressEvent>,
    last_step: u64,
    done: bool,
}

async fn sse_step(mut state: SseState) -> Option<(std::result::Result<Event, Infallible>, SseState)> {
    loop {
        if let Some(event) = state.pending.pop_front() {
            let terminal = event.state.is_terminal();
            let payload = sse_payload(&event);
            let sse_event = Event::default()
                .json_data(&payload)
                .unwrap_or_else(|_| Event::default().data("{}"));
            if terminal {
                state.done = true;
            }
            return Some((Ok(sse_event), state));
        }

        if state.done {
            return None;
        }

        let fresh = state.progress.events_since(state.last_step);
        if !fresh.is_empty() {
            state.last_step = fresh.last().map(|e| e.step).unwrap_or(state.last_step);
            state.pending.extend(fresh);
            continue;
        }

        if state.progress.is_terminal() {
            return None;
        }

        state.progress.notified().await;
    }
}

async fn scan_events_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError> {
    state.orchestrator.progress().sweep_expired();
    let progress = state
        .orchestrator
        .progress()
        .get(scan_id)
        .ok_or_else(|| ApiError::NotFound(format!("no such scan: {scan_id}")))?;

    let initial = SseState {
        pending: progress.events_since(0).into(),
        progress,
        last_step: 0,
        done: false,
    };

    let stream = stream::unfold(initial, sse_step);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SearchMode {
    #[default]
    Tokens,
    Sites,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    mode: SearchMode,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    regex: Option<bool>,
    #[serde(default)]
    min_confidence: Option<f64>,
}

fn parse_category_param(s: &str) -> std::result::Result<TokenCategory, ScanError> {
    match s {
        "color" => Ok(TokenCategory::Color),
        "typography" => Ok(TokenCategory::Typography),
        "dimension" => Ok(TokenCategory::Dimension),
        "shadow" => Ok(TokenCategory::Shadow),
        "radius" => Ok(TokenCategory::Radius),
        "motion" => Ok(TokenCategory::Motion),
        other => Err(ScanError::BadRequest(format!("unknown category: {other}"))),
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(50).min(500);
    let db = state.db.clone();

    match params.mode {
        SearchMode::Sites => {
            let query_str = params.query.clone();
            let hits = blocking(move || query::search_sites(&db, &query_str, limit)).await?;
            Ok(Json(serde_json::json!({ "results": hits })))
        }
        SearchMode::Tokens => {
            let category = params.category.as_deref().map(parse_category_param).transpose()?;
            let filters =
                TokenFilters { category, min_confidence: params.min_confidence, regex: params.regex.unwrap_or(false) };
            let query_str = params.query.clone();
            let hits = blocking(move || query::search_tokens(&db, &query_str, &filters, limit)).await?;
            Ok(Json(serde_json::json!({ "results": hits })))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HistoryParams {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

async fn get_site_handler(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(params): Query<HistoryParams>,
) -> std::result::Result<Json<SiteDetail>, ApiError> {
    let db = state.db.clone();
    let lookup_domain = domain.clone();
    let limit = params.limit.unwrap_or(20).min(200);
    let offset = params.offset.unwrap_or(0);

    let detail = blocking(move || query::get_site(&db, &lookup_domain, limit, offset)).await?;
    let detail = detail.ok_or_else(|| ApiError::NotFound(format!("no such site: {domain}")))?;
    Ok(Json(detail))
}

async fn stats_handler(State(state): State<AppState>) -> std::result::Result<Json<StatsCache>, ApiError> {
    let db = state.db.clone();
    let stats = blocking(move || query::get_stats(&db)).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    token_set_id: TokenSetId,
    token_key: String,
    vote_type: VoteType,
    #[serde(default)]
    note: Option<String>,
}

async fn vote_handler(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> std::result::Result<Json<TokenVote>, ApiError> {
    let db = state.db.clone();
    let VoteRequest { token_set_id, token_key, vote_type, note } = req;
    let vote =
        blocking(move || query::submit_vote(&db, token_set_id, &token_key, vote_type, note.as_deref())).await?;
    Ok(Json(vote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Quality;
    use crate::model::ScanState;

    #[test]
    fn sse_payload_maps_terminal_states_to_failed() {
        let event = ProgressEvent { scan_id: 1, step: 3, state: ScanState::Failed, message: "boom".into() };
        let payload = sse_payload(&event);
        assert_eq!(payload.kind, "failed");
        assert_eq!(payload.phase, "failed");
    }

    #[test]
    fn sse_payload_maps_completed() {
        let event = ProgressEvent { scan_id: 1, step: 6, state: ScanState::Completed, message: "done".into() };
        assert_eq!(sse_payload(&event).kind, "completed");
    }

    #[test]
    fn parse_category_param_rejects_unknown() {
        assert!(parse_category_param("not-a-category").is_err());
        assert!(parse_category_param("color").is_ok());
    }

    #[test]
    fn quality_defaults_to_standard_when_omitted() {
        let req: ScanRequest = serde_json::from_str(r#"{"url":"https://example.test"}"#).unwrap();
        assert_eq!(req.quality.unwrap_or_default(), Quality::Standard);
    }
}
