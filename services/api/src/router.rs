//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST glue, the carrier media WebSocket, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AnalyzePayload, AnalyzeResponse, ErrorResponse, HealthResponse, OutgoingCallPayload,
        OutgoingCallResponse,
    },
    state::AppState,
    telephony::MEDIA_STREAM_PATH,
    ws::media_stream_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::incoming_call,
        handlers::outgoing_call,
        handlers::analyze,
    ),
    components(
        schemas(HealthResponse, OutgoingCallPayload, OutgoingCallResponse, AnalyzePayload, AnalyzeResponse, ErrorResponse)
    ),
    tags(
        (name = "VoiceBridge API", description = "Call setup and sensor analysis around the carrier/agent media relay")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/incoming-call",
            get(handlers::incoming_call).post(handlers::incoming_call),
        )
        .route("/outgoing-call", post(handlers::outgoing_call))
        .route("/analyze", post(handlers::analyze))
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
