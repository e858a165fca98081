//! Sensor analysis: forward readings to a prediction service and optionally
//! have a text model explain the result.

use crate::llm_client::LLMClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const EXPLAIN_SYSTEM_PROMPT: &str = "You explain machine-learning predictions made from sensor \
readings to a non-technical operator. Answer in at most three sentences, state what the \
prediction means and whether any action is needed.";

/// A service that turns raw sensor readings into a prediction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn predict(&self, readings: &Value) -> Result<Value>;
}

/// Posts readings as JSON to a remote prediction endpoint.
pub struct HttpPredictionService {
    client: reqwest::Client,
    url: String,
}

impl HttpPredictionService {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl PredictionService for HttpPredictionService {
    async fn predict(&self, readings: &Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .json(readings)
            .send()
            .await
            .context("Prediction service unreachable")?
            .error_for_status()
            .context("Prediction service returned an error status")?;
        let prediction = response
            .json::<Value>()
            .await
            .context("Prediction service returned invalid JSON")?;
        Ok(prediction)
    }
}

/// Result of one analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub prediction: Value,
    pub explanation: Option<String>,
}

pub struct SensorAnalyzer {
    predictor: Arc<dyn PredictionService>,
    explainer: Option<Arc<dyn LLMClient>>,
}

impl SensorAnalyzer {
    pub fn new(predictor: Arc<dyn PredictionService>, explainer: Option<Arc<dyn LLMClient>>) -> Self {
        Self {
            predictor,
            explainer,
        }
    }

    /// Runs the prediction; a failing explanation degrades to `None` instead of failing the call.
    pub async fn analyze(&self, readings: &Value, explain: bool) -> Result<Analysis> {
        let prediction = self.predictor.predict(readings).await?;
        info!("Prediction received.");

        let explanation = match (&self.explainer, explain) {
            (Some(llm), true) => {
                let user_prompt = format!(
                    "Sensor readings:\n{}\n\nModel prediction:\n{}",
                    serde_json::to_string_pretty(readings)?,
                    serde_json::to_string_pretty(&prediction)?
                );
                match llm.complete(EXPLAIN_SYSTEM_PROMPT.to_string(), user_prompt).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!(error = ?e, "Explanation failed; returning bare prediction.");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(Analysis {
            prediction,
            explanation,
        })
    }
}
