//! Request and response bodies of the REST surface, with OpenAPI schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct OutgoingCallPayload {
    /// Number to dial, in E.164 format.
    #[schema(example = "+15551234567")]
    pub to: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct OutgoingCallResponse {
    #[schema(example = "CA0123456789abcdef0123456789abcdef")]
    pub call_sid: String,
}

fn default_explain() -> bool {
    true
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct AnalyzePayload {
    /// Sensor readings, forwarded to the prediction service as-is.
    #[schema(value_type = Object)]
    pub readings: Value,
    /// Ask the text model to explain the prediction.
    #[serde(default = "default_explain")]
    pub explain: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AnalyzeResponse {
    #[schema(value_type = Object)]
    pub prediction: Value,
    pub explanation: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
