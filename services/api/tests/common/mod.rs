//! Shared harness for the integration tests: a test config, the app on an
//! ephemeral port, and a scriptable stand-in for the voice agent.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        protocol::Message,
    },
};
use tracing::Level;
use voicebridge_api::{
    config::{AgentConfig, Config},
    router::create_router,
    state::AppState,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config(agent_ws_url: &str) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        log_level: Level::DEBUG,
        agent: AgentConfig {
            agent_id: "agent_test".to_string(),
            api_key: Some("key_test".to_string()),
            ws_url: agent_ws_url.to_string(),
        },
        public_host: None,
        telephony: None,
        prediction_url: None,
        text_model: None,
        keepalive: None,
    }
}

/// Serves the full router on an ephemeral port.
pub async fn spawn_app(config: Config) -> SocketAddr {
    let app = create_router(Arc::new(AppState::from_config(config)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

/// What the agent saw when the relay connected.
#[derive(Debug)]
pub struct Handshake {
    pub uri: String,
    pub api_key: Option<String>,
}

/// One conversation on a fake voice agent.
pub struct MockAgent {
    pub url: String,
    /// Frames the relay sent to the agent. A `Close` (or end of channel) means the leg is gone.
    pub received: mpsc::UnboundedReceiver<Message>,
    /// Frames the agent should send to the relay.
    pub send: mpsc::UnboundedSender<Message>,
    pub handshake: oneshot::Receiver<Handshake>,
    /// Transport errors the agent saw while reading from the relay.
    pub errors: mpsc::UnboundedReceiver<String>,
}

impl MockAgent {
    pub fn send_json(&self, value: Value) {
        self.send.send(Message::Text(value.to_string().into())).unwrap();
    }

    pub fn send_text(&self, text: &str) {
        self.send.send(Message::Text(text.to_string().into())).unwrap();
    }

    /// Next JSON frame the relay sent to the agent.
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(TIMEOUT, self.received.recv())
                .await
                .expect("timed out waiting for a frame at the agent")
                .expect("agent leg closed while waiting for a frame");
            match msg {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Close(_) => panic!("agent leg closed while waiting for a frame"),
                _ => continue,
            }
        }
    }

    /// Waits until the relay closes the agent leg.
    pub async fn expect_closed(&mut self) {
        loop {
            let msg = tokio::time::timeout(TIMEOUT, self.received.recv())
                .await
                .expect("timed out waiting for the agent leg to close");
            match msg {
                None | Some(Message::Close(_)) => return,
                Some(Message::Text(text)) => {
                    panic!("expected close, agent received {}", text.as_str())
                }
                Some(_) => continue,
            }
        }
    }

    /// Waits for the leg to close and checks the closing handshake completed.
    pub async fn expect_clean_close(&mut self) {
        self.expect_closed().await;
        if let Ok(e) = self.errors.try_recv() {
            panic!("agent leg closed with a transport error: {}", e);
        }
    }
}

/// The test-side ends of one conversation's channels.
struct Conversation {
    received: mpsc::UnboundedSender<Message>,
    send: mpsc::UnboundedReceiver<Message>,
    handshake: oneshot::Sender<Handshake>,
    errors: mpsc::UnboundedSender<String>,
}

fn conversation(url: String) -> (MockAgent, Conversation) {
    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let (send_tx, send_rx) = mpsc::unbounded_channel();
    let (handshake_tx, handshake_rx) = oneshot::channel();
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();
    let agent = MockAgent {
        url,
        received: received_rx,
        send: send_tx,
        handshake: handshake_rx,
        errors: errors_rx,
    };
    let conversation = Conversation {
        received: received_tx,
        send: send_rx,
        handshake: handshake_tx,
        errors: errors_tx,
    };
    (agent, conversation)
}

async fn serve_conversation(stream: TcpStream, conversation: Conversation) {
    let Conversation {
        received,
        mut send,
        handshake,
        errors,
    } = conversation;

    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let api_key = req
            .headers()
            .get("xi-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let _ = handshake.send(Handshake {
            uri: req.uri().to_string(),
            api_key,
        });
        Ok(resp)
    };
    let ws = accept_hdr_async(stream, callback).await.unwrap();
    let (mut tx, mut rx) = ws.split();

    loop {
        tokio::select! {
            Some(msg) = send.recv() => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            msg = rx.next() => match msg {
                Some(Ok(msg)) => {
                    let is_close = msg.is_close();
                    let _ = received.send(msg);
                    if is_close {
                        break;
                    }
                }
                Some(Err(e)) => {
                    let _ = errors.send(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }
}

/// Starts a mock agent for a single conversation. When `gate` is given, the
/// WebSocket handshake is held until it fires, so the relay sees the agent leg
/// as still connecting.
pub async fn spawn_mock_agent(gate: Option<oneshot::Receiver<()>>) -> MockAgent {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (agent, conversation) = conversation(format!("ws://{}/v1/convai/conversation", addr));

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        serve_conversation(stream, conversation).await;
    });

    agent
}

/// Starts a mock agent that serves `count` conversations on one address, in
/// the order the relay connects.
pub async fn spawn_mock_agents(count: usize) -> Vec<MockAgent> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/convai/conversation", listener.local_addr().unwrap());
    let (agents, conversations): (Vec<_>, Vec<_>) =
        (0..count).map(|_| conversation(url.clone())).unzip();

    tokio::spawn(async move {
        for conversation in conversations {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(serve_conversation(stream, conversation));
        }
    });

    agents
}
