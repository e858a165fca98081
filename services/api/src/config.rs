use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

const DEFAULT_AGENT_WS_URL: &str = "wss://api.elevenlabs.io/v1/convai/conversation";
const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";
const DEFAULT_TEXT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 840;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where and how to reach the conversational voice agent.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub agent_id: String,
    pub api_key: Option<String>,
    pub ws_url: String,
}

impl AgentConfig {
    /// The conversation endpoint for this agent, with `agent_id` encoded into the query.
    pub fn conversation_url(&self) -> anyhow::Result<String> {
        let url = reqwest::Url::parse_with_params(&self.ws_url, &[("agent_id", &self.agent_id)])?;
        Ok(url.into())
    }
}

/// Credentials for the carrier's REST API, used to place outbound calls.
#[derive(Clone, Debug)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    pub api_base: String,
}

/// Settings for the generative-text service that explains predictions.
#[derive(Clone, Debug)]
pub struct TextModelConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    pub url: String,
    pub interval: Duration,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub agent: AgentConfig,
    pub public_host: Option<String>,
    pub telephony: Option<TelephonyConfig>,
    pub prediction_url: Option<String>,
    pub text_model: Option<TextModelConfig>,
    pub keepalive: Option<KeepaliveConfig>,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let agent = AgentConfig {
            agent_id: optional_var("AGENT_ID")
                .ok_or_else(|| ConfigError::MissingVar("AGENT_ID".to_string()))?,
            api_key: optional_var("AGENT_API_KEY"),
            ws_url: optional_var("AGENT_WS_URL")
                .unwrap_or_else(|| DEFAULT_AGENT_WS_URL.to_string()),
        };

        let telephony = match (
            optional_var("TWILIO_ACCOUNT_SID"),
            optional_var("TWILIO_AUTH_TOKEN"),
            optional_var("TWILIO_PHONE_NUMBER"),
        ) {
            (None, None, None) => None,
            (Some(account_sid), Some(auth_token), Some(phone_number)) => Some(TelephonyConfig {
                account_sid,
                auth_token,
                phone_number,
                api_base: optional_var("TWILIO_API_BASE")
                    .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string()),
            }),
            _ => {
                return Err(ConfigError::MissingVar(
                    "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER must be set together"
                        .to_string(),
                ));
            }
        };

        let text_model = optional_var("GEMINI_API_KEY").map(|api_key| TextModelConfig {
            api_key,
            model: optional_var("TEXT_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            api_base: optional_var("TEXT_API_BASE")
                .unwrap_or_else(|| DEFAULT_TEXT_API_BASE.to_string()),
        });

        let keepalive = match optional_var("KEEPALIVE_URL") {
            Some(url) => {
                let secs = match optional_var("KEEPALIVE_INTERVAL_SECS") {
                    Some(raw) => raw
                        .parse::<u64>()
                        .ok()
                        .filter(|s| *s > 0)
                        .ok_or_else(|| {
                            ConfigError::InvalidValue(
                                "KEEPALIVE_INTERVAL_SECS".to_string(),
                                format!("'{}' is not a positive number of seconds", raw),
                            )
                        })?,
                    None => DEFAULT_KEEPALIVE_INTERVAL_SECS,
                };
                Some(KeepaliveConfig {
                    url,
                    interval: Duration::from_secs(secs),
                })
            }
            None => None,
        };

        Ok(Self {
            bind_address,
            log_level,
            agent,
            public_host: optional_var("PUBLIC_HOST"),
            telephony,
            prediction_url: optional_var("PREDICTION_SERVICE_URL"),
            text_model,
            keepalive,
        })
    }
}
