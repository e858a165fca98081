//! Outbound WebSocket connection to the conversational voice agent.

use crate::config::AgentConfig;
use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::client::IntoClientRequest,
};
use tracing::info;

pub(crate) type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the agent conversation for `config.agent_id`, authenticating with the API key when one is set.
pub(crate) async fn connect(config: AgentConfig) -> Result<AgentSocket> {
    let mut request = config
        .conversation_url()
        .context("Invalid agent WebSocket URL")?
        .into_client_request()?;
    if let Some(api_key) = &config.api_key {
        request
            .headers_mut()
            .insert("xi-api-key", api_key.parse()?);
    }

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to agent conversation WebSocket")?;
    info!(agent_id = %config.agent_id, "Agent leg connected.");
    Ok(ws_stream)
}
