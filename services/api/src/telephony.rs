//! Carrier-side call control: TwiML connection instructions and outbound calls.

use crate::config::TelephonyConfig;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::info;

/// Path of the media WebSocket endpoint the carrier is told to stream to.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

fn escape_xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// The secure media-stream URL for a public host name.
pub fn media_stream_url(host: &str) -> String {
    format!("wss://{}{}", host, MEDIA_STREAM_PATH)
}

/// TwiML instructing the carrier to connect the call audio to `stream_url`.
pub fn connect_stream_twiml(stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}" /></Connect></Response>"#,
        escape_xml_attr(stream_url)
    )
}

#[derive(Deserialize, Debug)]
struct CreateCallResponse {
    sid: String,
}

#[derive(Deserialize, Debug)]
struct CarrierErrorResponse {
    message: Option<String>,
}

/// Minimal client for the carrier's call-creation REST endpoint.
pub struct TelephonyClient {
    http: reqwest::Client,
    config: TelephonyConfig,
}

impl TelephonyClient {
    pub fn new(http: reqwest::Client, config: TelephonyConfig) -> Self {
        Self { http, config }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Dials `to` from the configured number and bridges the answered call to the relay.
    /// Returns the carrier's call identifier.
    pub async fn place_call(&self, to: &str, twiml: &str) -> Result<String> {
        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.phone_number.as_str()),
                ("Twiml", twiml),
            ])
            .send()
            .await
            .context("Carrier API unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<CarrierErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| "no error message".to_string());
            return Err(anyhow!("Carrier rejected the call ({}): {}", status, message));
        }

        let created: CreateCallResponse = response
            .json()
            .await
            .context("Carrier API returned an unexpected body")?;
        info!(call_sid = %created.sid, to, "Outbound call placed.");
        Ok(created.sid)
    }
}
