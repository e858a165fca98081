//! Runs one media relay per carrier connection.
//!
//! Each call gets a single task that owns both legs and the [`Relay`] state
//! machine. Frames from either side are handled to completion (parse,
//! translate, send) before the next one is polled, so nothing here is locked.

use super::agent_leg::{self, AgentSocket};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use std::{collections::VecDeque, sync::Arc};
use tokio_tungstenite::tungstenite::{self, protocol::Message as WsMessage};
use tracing::{debug, error, info, instrument, warn};
use voicebridge_core::{
    agent::AgentEvent,
    carrier::CarrierEvent,
    relay::{Action, AgentLink, Relay},
};

type CarrierSink = SplitSink<WebSocket, Message>;
type AgentSink = SplitSink<AgentSocket, WsMessage>;
type AgentStream = SplitStream<AgentSocket>;

/// Axum handler that upgrades the carrier's media-stream request to a WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| run_media_relay(socket, state))
}

/// Drives one call from carrier connect until both legs are gone.
#[instrument(name = "media_relay", skip_all, fields(conn_id, stream_sid, call_sid, conversation_id))]
async fn run_media_relay(socket: WebSocket, state: Arc<AppState>) {
    let conn_id: u32 = rand::random();
    tracing::Span::current().record("conn_id", conn_id);
    info!("Carrier connected. Opening agent leg...");

    let (carrier_tx, mut carrier_rx) = socket.split();
    let mut bridge = Bridge::new(carrier_tx);

    let connect = agent_leg::connect(state.config.agent.clone());
    tokio::pin!(connect);
    let mut connecting = true;

    loop {
        tokio::select! {
            result = &mut connect, if connecting => {
                connecting = false;
                match result {
                    Ok(socket) => bridge.agent_connected(socket),
                    Err(e) => {
                        error!(error = ?e, "Agent leg failed to open.");
                        bridge.agent_closed().await;
                    }
                }
            }
            msg = carrier_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => bridge.carrier_text(text.as_str()).await,
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Carrier closed the media stream.");
                    bridge.carrier_closed().await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Carrier leg transport error.");
                    bridge.carrier_closed().await;
                }
                None => bridge.carrier_closed().await,
            },
            msg = next_agent_frame(&mut bridge.agent_rx), if bridge.agent_rx.is_some() => match msg {
                Some(Ok(WsMessage::Text(text))) => bridge.agent_text(text.as_str()).await,
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "Agent closed the conversation.");
                    bridge.agent_closed().await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Agent leg transport error.");
                    bridge.agent_closed().await;
                }
                None => bridge.agent_closed().await,
            },
        }

        if !bridge.carrier_open {
            break;
        }
    }

    info!("Media relay finished.");
}

/// Reads the next agent frame, or waits forever when the agent leg is not connected.
async fn next_agent_frame(
    rx: &mut Option<AgentStream>,
) -> Option<Result<WsMessage, tungstenite::Error>> {
    match rx {
        Some(rx) => rx.next().await,
        None => std::future::pending().await,
    }
}

fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(error = %e, "Failed to serialize outbound frame.");
            None
        }
    }
}

/// The relay state machine plus the sockets it acts on.
struct Bridge {
    relay: Relay,
    carrier_tx: CarrierSink,
    carrier_open: bool,
    agent_tx: Option<AgentSink>,
    agent_rx: Option<AgentStream>,
}

impl Bridge {
    fn new(carrier_tx: CarrierSink) -> Self {
        let mut relay = Relay::new();
        relay.carrier_connected();
        Self {
            relay,
            carrier_tx,
            carrier_open: true,
            agent_tx: None,
            agent_rx: None,
        }
    }

    fn agent_connected(&mut self, socket: AgentSocket) {
        self.relay.agent_opened();
        if self.relay.agent_link() != AgentLink::Open {
            // The call ended while the handshake was in flight.
            debug!("Dropping agent connection opened after termination.");
            return;
        }
        let (tx, rx) = socket.split();
        self.agent_tx = Some(tx);
        self.agent_rx = Some(rx);
    }

    async fn carrier_text(&mut self, text: &str) {
        let event = match CarrierEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping malformed carrier frame.");
                return;
            }
        };
        let is_start = matches!(event, CarrierEvent::Start { .. });
        let actions = self.relay.on_carrier_event(event);
        if is_start {
            let span = tracing::Span::current();
            if let Some(sid) = self.relay.stream_sid() {
                span.record("stream_sid", sid);
            }
            if let Some(sid) = self.relay.call_sid() {
                span.record("call_sid", sid);
            }
        }
        self.dispatch(actions).await;
    }

    async fn agent_text(&mut self, text: &str) {
        let event = match AgentEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping malformed agent frame.");
                return;
            }
        };
        let is_metadata = matches!(event, AgentEvent::ConversationInitiationMetadata { .. });
        let actions = self.relay.on_agent_event(event);
        if is_metadata {
            if let Some(id) = self.relay.conversation_id() {
                tracing::Span::current().record("conversation_id", id);
            }
        }
        self.dispatch(actions).await;
    }

    /// The carrier leg went away. Closing the sink flushes the Close reply
    /// tungstenite queued when the carrier initiated the handshake.
    async fn carrier_closed(&mut self) {
        if self.carrier_open {
            self.carrier_open = false;
            let _ = self.carrier_tx.close().await;
        }
        let actions = self.relay.on_carrier_closed();
        self.dispatch(actions).await;
    }

    async fn agent_closed(&mut self) {
        self.agent_rx = None;
        if let Some(mut tx) = self.agent_tx.take() {
            let _ = tx.close().await;
        }
        let actions = self.relay.on_agent_closed();
        self.dispatch(actions).await;
    }

    /// Executes relay actions in order. A failed send counts as that leg closing,
    /// and the close's own follow-up actions are executed in turn.
    async fn dispatch(&mut self, actions: Vec<Action>) {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                Action::SendToAgent(command) => {
                    let Some(tx) = self.agent_tx.as_mut() else {
                        continue;
                    };
                    let Some(text) = encode(&command) else {
                        continue;
                    };
                    if let Err(e) = tx.send(WsMessage::Text(text.into())).await {
                        warn!(error = %e, "Send to agent failed; ending call.");
                        self.agent_tx = None;
                        self.agent_rx = None;
                        queue.extend(self.relay.on_agent_closed());
                    }
                }
                Action::SendToCarrier(command) => {
                    if !self.carrier_open {
                        continue;
                    }
                    let Some(text) = encode(&command) else {
                        continue;
                    };
                    if let Err(e) = self.carrier_tx.send(Message::Text(text.into())).await {
                        warn!(error = %e, "Send to carrier failed; ending call.");
                        self.carrier_open = false;
                        queue.extend(self.relay.on_carrier_closed());
                    }
                }
                Action::CloseAgent => {
                    self.agent_rx = None;
                    if let Some(mut tx) = self.agent_tx.take() {
                        debug!("Closing agent leg.");
                        let _ = tx.send(WsMessage::Close(None)).await;
                        let _ = tx.close().await;
                    }
                }
                Action::CloseCarrier => {
                    if self.carrier_open {
                        debug!("Closing carrier leg.");
                        self.carrier_open = false;
                        let _ = self.carrier_tx.send(Message::Close(None)).await;
                        let _ = self.carrier_tx.close().await;
                    }
                }
            }
        }
    }
}
