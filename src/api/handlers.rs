use std::{collections::BTreeMap, convert::Infallible};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderName},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::Utc;
use futures_util::stream;
use serde::Deserialize;
use tracing::info;
use utoipa::OpenApi;

use super::{
    dto::{
        CurrentResponse, HistoryPointDto, IngestResponse, RenameRequest, RenameResponse,
        RoomStateDto, TelemetryPayload,
    },
    errors::AppError,
    AppState,
};
use crate::{
    db::models::Mode,
    room_store::{FloorSummary, MAX_HISTORY},
    stream as live,
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Ingest a reading that an external proxy has already decoded.
#[utoipa::path(
    post,
    path = "/telemetry",
    request_body = TelemetryPayload,
    responses(
        (status = 200, description = "Reading stored", body = IngestResponse),
        (status = 400, description = "Missing or invalid room identifier or value"),
    ),
    tag = "telemetry"
)]
pub async fn ingest_telemetry(
    State(state): State<AppState>,
    payload: Result<Json<TelemetryPayload>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let reading = payload.into_reading(Utc::now())?;
    let room = state.store.upsert(reading).await;
    info!(room_id = %room.room_id, room_temp = ?room.room_temp, "Room updated via HTTP");

    Ok(Json(IngestResponse {
        success: true,
        room: room.room_id,
    }))
}

/// Latest state of every known room, keyed by room id.
#[utoipa::path(
    get,
    path = "/telemetry/current",
    responses(
        (status = 200, description = "All rooms", body = CurrentResponse),
    ),
    tag = "telemetry"
)]
pub async fn get_current(State(state): State<AppState>) -> Json<CurrentResponse> {
    let items: BTreeMap<String, RoomStateDto> = state
        .store
        .get_all()
        .await
        .into_iter()
        .map(|(id, room)| (id, room.into()))
        .collect();

    Json(CurrentResponse {
        count: items.len(),
        items,
    })
}

/// Latest state of a single room.
#[utoipa::path(
    get,
    path = "/telemetry/current/{room_id}",
    params(("room_id" = String, Path, description = "Room number or area code")),
    responses(
        (status = 200, description = "Room state", body = RoomStateDto),
        (status = 404, description = "Room never seen"),
    ),
    tag = "telemetry"
)]
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStateDto>, AppError> {
    let room = state.store.get_one(&room_id).await?;
    Ok(Json(room.into()))
}

/// Recent temperature and setpoint samples for a room, oldest first.
/// Optimised for line charts. `?limit=` caps the count (default and maximum 20).
#[utoipa::path(
    get,
    path = "/telemetry/history/{room_id}",
    params(
        ("room_id" = String, Path, description = "Room number or area code"),
        ("limit" = Option<usize>, Query, description = "Maximum samples (1-20)"),
    ),
    responses(
        (status = 200, description = "History samples", body = Vec<HistoryPointDto>),
    ),
    tag = "telemetry"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryPointDto>> {
    let limit = params.limit.unwrap_or(MAX_HISTORY).min(MAX_HISTORY);
    let samples = state.store.history(&room_id, limit).await;
    Json(samples.into_iter().map(Into::into).collect())
}

/// Room count and average temperature per floor.
#[utoipa::path(
    get,
    path = "/telemetry/overview",
    responses(
        (status = 200, description = "Summary keyed by floor code", body = BTreeMap<String, FloorSummary>),
    ),
    tag = "telemetry"
)]
pub async fn get_overview(State(state): State<AppState>) -> Json<BTreeMap<String, FloorSummary>> {
    Json(state.store.summary_by_floor().await)
}

/// Set the operator-facing name of a room.
#[utoipa::path(
    post,
    path = "/telemetry/rename",
    request_body = RenameRequest,
    responses(
        (status = 200, description = "Room renamed", body = RenameResponse),
        (status = 400, description = "Missing room_number"),
        (status = 404, description = "Room never seen"),
    ),
    tag = "telemetry"
)]
pub async fn rename_room(
    State(state): State<AppState>,
    req: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<RenameResponse>, AppError> {
    let Json(req) = req.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let room_id = req
        .room_id()
        .ok_or_else(|| AppError::BadRequest("missing room_number".to_owned()))?;

    let room = state
        .store
        .rename(&room_id, req.display_name.as_deref().unwrap_or_default())
        .await?;
    info!(room_id = %room.room_id, display_name = %room.display_name, "Room renamed");

    Ok(Json(RenameResponse {
        success: true,
        room: room.room_id,
        display_name: room.display_name,
    }))
}

/// Server-sent events: `hello` on connect, then `refresh` whenever any room
/// changes and `ping` while idle. Clients re-fetch `/telemetry/current` on
/// `refresh`.
#[utoipa::path(
    get,
    path = "/telemetry/stream",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String),
    ),
    tag = "telemetry"
)]
pub async fn stream_telemetry(State(state): State<AppState>) -> impl IntoResponse {
    let rx = live::subscribe(state.store.notifier(), state.stream, &state.shutdown);
    let events = stream::unfold(rx, |mut rx| async move {
        let msg = rx.recv().await?;
        let event = Event::default().event(msg.event).data(msg.data);
        Some((Ok::<_, Infallible>(event), rx))
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Sse::new(events),
    )
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok", "service": "telemetry" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        ingest_telemetry,
        get_current,
        get_room,
        get_history,
        get_overview,
        rename_room,
        stream_telemetry,
        health
    ),
    components(schemas(
        TelemetryPayload,
        IngestResponse,
        RenameRequest,
        RenameResponse,
        RoomStateDto,
        CurrentResponse,
        HistoryPointDto,
        FloorSummary,
        Mode
    )),
    tags(
        (name = "telemetry", description = "Room HVAC telemetry endpoints"),
        (name = "system",    description = "System endpoints"),
    ),
    info(
        title = "HVAC Telemetry API",
        version = "0.1.0",
        description = "Live room temperature, setpoint and HVAC state from Inncom controllers"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
