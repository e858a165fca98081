//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration and
//! the clients for the services the REST glue talks to.

use crate::{config::Config, telephony::TelephonyClient};
use async_openai::config::OpenAIConfig;
use std::sync::Arc;
use voicebridge_core::{
    analysis::{HttpPredictionService, SensorAnalyzer},
    llm_client::{LLMClient, OpenAICompatibleClient},
};

/// The shared application state, created once at startup and passed to all handlers.
/// Media relay sessions only read `config`; they never share mutable state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub telephony: Option<Arc<TelephonyClient>>,
    pub analyzer: Option<Arc<SensorAnalyzer>>,
}

impl AppState {
    /// Builds the outbound clients for every optional integration that is configured.
    pub fn from_config(config: Config) -> Self {
        let http = reqwest::Client::new();

        let telephony = config
            .telephony
            .clone()
            .map(|t| Arc::new(TelephonyClient::new(http.clone(), t)));

        let explainer = config.text_model.as_ref().map(|t| {
            let openai_config = OpenAIConfig::new()
                .with_api_key(&t.api_key)
                .with_api_base(&t.api_base);
            Arc::new(OpenAICompatibleClient::new(openai_config, t.model.clone()))
                as Arc<dyn LLMClient>
        });

        let analyzer = config.prediction_url.clone().map(|url| {
            Arc::new(SensorAnalyzer::new(
                Arc::new(HttpPredictionService::new(http.clone(), url)),
                explainer,
            ))
        });

        Self {
            config: Arc::new(config),
            http,
            telephony,
            analyzer,
        }
    }
}
