use axum::{
    extract::{FromRequest, FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::aggregate::MatchService;
use crate::error::{EngineError, EngineResult};
use crate::metrics::EngineMetrics;
use crate::minutes::MinutesReport;
use crate::types::{
    Formation, FormationInput, LineupInput, MatchEvent, MatchId, MatchView, NewEvent, NewMatch,
    SquadEntry,
};

pub const PRINCIPAL_HEADER: &str = "x-principal-id";

#[derive(Clone)]
pub struct AppState {
    pub service: MatchService,
    pub require_principal: bool,
}

/// JSON body whose rejections use the engine's `{"error": ...}` shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(EngineError))]
pub struct Payload<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(EngineError))]
pub struct Params<T>(pub T);

/// Caller identity established by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub Option<String>);

impl FromRequestParts<AppState> for Principal {
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        if principal.is_none() && state.require_principal {
            state.service.metrics().record_forbidden();
            return Err(EngineError::Forbidden("authentication required".to_string()));
        }
        Ok(Principal(principal))
    }
}

/// Reads an `If-Match` header carrying a match version, quoted or not.
pub fn expected_version(headers: &HeaderMap) -> EngineResult<Option<i64>> {
    let Some(raw) = headers.get(axum::http::header::IF_MATCH) else {
        return Ok(None);
    };
    let text = raw
        .to_str()
        .map_err(|_| EngineError::validation("If-Match", "must be ASCII"))?;
    let trimmed = text.trim().trim_start_matches("W/").trim_matches('"');
    trimmed
        .parse::<i64>()
        .map(Some)
        .map_err(|_| EngineError::validation("If-Match", format!("'{text}' is not a match version")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquadBody {
    #[serde(default)]
    pub player_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MinutesQuery {
    pub at: Option<u32>,
}

pub async fn create_match(
    State(state): State<AppState>,
    _principal: Principal,
    Payload(new_match): Payload<NewMatch>,
) -> EngineResult<(StatusCode, Json<MatchView>)> {
    let created = state.service.create_match(new_match).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_match(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
) -> EngineResult<Json<MatchView>> {
    Ok(Json(state.service.get_match(&MatchId::new(id)).await?))
}

pub async fn delete_match(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
) -> EngineResult<Json<serde_json::Value>> {
    state.service.delete_match(&MatchId::new(id)).await?;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn record_event(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
    Payload(event): Payload<NewEvent>,
) -> EngineResult<(StatusCode, Json<MatchEvent>)> {
    let recorded = state.service.record_event(&MatchId::new(id), event).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn list_events(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
) -> EngineResult<Json<Vec<MatchEvent>>> {
    Ok(Json(state.service.list_events(&MatchId::new(id)).await?))
}

pub async fn set_squad(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
    headers: HeaderMap,
    Payload(body): Payload<SquadBody>,
) -> EngineResult<Json<Vec<SquadEntry>>> {
    let expected = expected_version(&headers)?;
    let entries = state
        .service
        .set_squad(&MatchId::new(id), body.player_ids, expected)
        .await?;
    Ok(Json(entries))
}

pub async fn set_lineup(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
    headers: HeaderMap,
    Payload(input): Payload<LineupInput>,
) -> EngineResult<Json<MatchView>> {
    let expected = expected_version(&headers)?;
    Ok(Json(
        state
            .service
            .set_lineup(&MatchId::new(id), input, expected)
            .await?,
    ))
}

pub async fn set_formation(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
    headers: HeaderMap,
    Payload(input): Payload<FormationInput>,
) -> EngineResult<(StatusCode, Json<Formation>)> {
    let expected = expected_version(&headers)?;
    let formation = state
        .service
        .set_formation(&MatchId::new(id), input, expected)
        .await?;
    Ok((StatusCode::CREATED, Json(formation)))
}

pub async fn recompute_score(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
) -> EngineResult<Json<MatchView>> {
    Ok(Json(state.service.recompute_score(&MatchId::new(id)).await?))
}

pub async fn kick_off(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
) -> EngineResult<Json<MatchView>> {
    Ok(Json(state.service.kick_off(&MatchId::new(id)).await?))
}

pub async fn minutes_report(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<String>,
    Params(query): Params<MinutesQuery>,
) -> EngineResult<Json<MinutesReport>> {
    Ok(Json(
        state
            .service
            .minutes_report(&MatchId::new(id), query.at)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn stats_handler(State(state): State<AppState>) -> Json<EngineMetrics> {
    Json(state.service.metrics().get_metrics())
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/matches", post(create_match))
        .route("/matches/{id}", get(get_match).delete(delete_match))
        .route("/matches/{id}/events", post(record_event).get(list_events))
        .route("/matches/{id}/squad", put(set_squad))
        .route("/matches/{id}/lineup", put(set_lineup))
        .route("/matches/{id}/formations", post(set_formation))
        .route("/matches/{id}/score/recompute", post(recompute_score))
        .route("/matches/{id}/kickoff", post(kick_off))
        .route("/matches/{id}/minutes", get(minutes_report))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Match engine listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
