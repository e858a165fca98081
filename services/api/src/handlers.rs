//! Axum Handlers for the REST API
//!
//! Thin glue around the media relay: liveness, call setup for the carrier and
//! the sensor-analysis proxy. `utoipa` doc comments generate the OpenAPI document.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::{
        AnalyzePayload, AnalyzeResponse, ErrorResponse, HealthResponse, OutgoingCallPayload,
        OutgoingCallResponse,
    },
    state::AppState,
    telephony::{connect_stream_twiml, media_stream_url},
};

pub enum ApiError {
    BadRequest(String),
    /// The integration behind this endpoint is not configured.
    ServiceUnavailable(String),
    /// A service we forward to failed.
    BadGateway(anyhow::Error),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(err) => {
                error!("Upstream failure: {:?}", err);
                let message = format!("Upstream service failed: {}", err);
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Resolves the public host the carrier should stream media to.
fn public_host(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    if let Some(host) = &state.config.public_host {
        return Ok(host.clone());
    }
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("Host header is required".to_string()))
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Carrier webhook for inbound calls; answers with instructions to stream the call audio here.
#[utoipa::path(
    post,
    path = "/incoming-call",
    responses(
        (status = 200, description = "TwiML connecting the call to the media stream", content_type = "text/xml", body = String),
        (status = 400, description = "No host to build the stream URL from", body = ErrorResponse)
    )
)]
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let host = public_host(&state, &headers)?;
    let twiml = connect_stream_twiml(&media_stream_url(&host));
    info!(%host, "Answering inbound call with media stream instructions.");
    Ok(([(header::CONTENT_TYPE, "text/xml")], twiml).into_response())
}

/// Place an outbound call that is bridged to the voice agent once answered.
#[utoipa::path(
    post,
    path = "/outgoing-call",
    request_body = OutgoingCallPayload,
    responses(
        (status = 200, description = "Call placed", body = OutgoingCallResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 502, description = "Carrier rejected the call", body = ErrorResponse),
        (status = 503, description = "Carrier credentials not configured", body = ErrorResponse)
    )
)]
pub async fn outgoing_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<OutgoingCallPayload>,
) -> Result<Json<OutgoingCallResponse>, ApiError> {
    let to = payload.to.trim();
    if to.is_empty() {
        return Err(ApiError::BadRequest("`to` must not be empty".to_string()));
    }
    let telephony = state.telephony.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Outbound calling is not configured".to_string())
    })?;

    let host = public_host(&state, &headers)?;
    let twiml = connect_stream_twiml(&media_stream_url(&host));
    let call_sid = telephony
        .place_call(to, &twiml)
        .await
        .map_err(ApiError::BadGateway)?;

    Ok(Json(OutgoingCallResponse { call_sid }))
}

/// Run sensor readings through the prediction service, optionally with a plain-language explanation.
#[utoipa::path(
    post,
    path = "/analyze",
    request_body = AnalyzePayload,
    responses(
        (status = 200, description = "Prediction (and explanation when available)", body = AnalyzeResponse),
        (status = 502, description = "Prediction service failed", body = ErrorResponse),
        (status = 503, description = "Prediction service not configured", body = ErrorResponse)
    )
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzePayload>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let analyzer = state.analyzer.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Prediction service is not configured".to_string())
    })?;

    let analysis = analyzer
        .analyze(&payload.readings, payload.explain)
        .await
        .map_err(ApiError::BadGateway)?;

    Ok(Json(AnalyzeResponse {
        prediction: analysis.prediction,
        explanation: analysis.explanation,
    }))
}
