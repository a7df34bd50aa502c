pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    room_store::RoomStore,
    stream::{Shutdown, StreamSettings},
};
use handlers::ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: RoomStore,
    pub stream: StreamSettings,
    /// Ends every open `/telemetry/stream` response when triggered.
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(store: RoomStore, stream: StreamSettings) -> Self {
        Self {
            store,
            stream,
            shutdown: Shutdown::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/telemetry", post(handlers::ingest_telemetry))
        .route("/telemetry/current", get(handlers::get_current))
        .route("/telemetry/current/{room_id}", get(handlers::get_room))
        .route("/telemetry/history/{room_id}", get(handlers::get_history))
        .route("/telemetry/overview", get(handlers::get_overview))
        .route("/telemetry/rename", post(handlers::rename_room))
        .route("/telemetry/stream", get(handlers::stream_telemetry))
        .route("/health", get(handlers::health))
        .with_state(state)
        .split_for_parts();

    router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
