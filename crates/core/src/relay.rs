//! Per-call media relay between the carrier and the voice agent.
//!
//! [`Relay`] is a plain state machine: it is fed one event at a time from
//! either leg and answers with the [`Action`]s the transport must perform, in
//! order. It owns no sockets, so a session task can drive it from a single
//! `select!` loop without any locking.
//!
//! Forwarding is best-effort. Caller audio that arrives while the agent
//! connection is still being established (or after it closed) is dropped,
//! never queued or retried.

use crate::{
    agent::{AgentCommand, AgentEvent},
    carrier::{CarrierCommand, CarrierEvent, MediaPayload},
};
use tracing::{debug, info, warn};

/// Lifecycle of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Streaming,
    Terminated,
}

/// State of the connection to the voice agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentLink {
    Connecting,
    Open,
    Closed,
}

/// Something the transport layer has to do on behalf of the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendToAgent(AgentCommand),
    SendToCarrier(CarrierCommand),
    CloseAgent,
    CloseCarrier,
}

#[derive(Debug)]
pub struct Relay {
    phase: Phase,
    agent: AgentLink,
    carrier_open: bool,
    stream_sid: Option<String>,
    call_sid: Option<String>,
    conversation_id: Option<String>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self {
            phase: Phase::Init,
            agent: AgentLink::Closed,
            carrier_open: false,
            stream_sid: None,
            call_sid: None,
            conversation_id: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn agent_link(&self) -> AgentLink {
        self.agent
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// The carrier connection was accepted; the agent connection is being opened.
    pub fn carrier_connected(&mut self) {
        if self.phase != Phase::Init {
            return;
        }
        self.phase = Phase::Streaming;
        self.carrier_open = true;
        self.agent = AgentLink::Connecting;
    }

    /// The agent connection finished its handshake.
    pub fn agent_opened(&mut self) {
        if self.agent == AgentLink::Connecting {
            self.agent = AgentLink::Open;
        }
    }

    pub fn on_carrier_event(&mut self, event: CarrierEvent) -> Vec<Action> {
        if self.phase != Phase::Streaming {
            return Vec::new();
        }

        match event {
            CarrierEvent::Start { start } => {
                if let Some(existing) = &self.stream_sid {
                    warn!(stream_sid = %existing, ignored = %start.stream_sid, "Duplicate start frame ignored.");
                } else {
                    info!(stream_sid = %start.stream_sid, call_sid = ?start.call_sid, "Media stream started.");
                    self.stream_sid = Some(start.stream_sid);
                    self.call_sid = start.call_sid;
                }
                Vec::new()
            }
            CarrierEvent::Media { media } => {
                if self.agent != AgentLink::Open {
                    debug!(agent = ?self.agent, "Agent leg not open; dropping caller audio.");
                    return Vec::new();
                }
                vec![Action::SendToAgent(AgentCommand::UserAudioChunk {
                    user_audio_chunk: media.payload,
                })]
            }
            CarrierEvent::Stop => {
                info!(stream_sid = ?self.stream_sid, "Carrier stopped the stream.");
                self.phase = Phase::Terminated;
                self.close_agent().into_iter().collect()
            }
            CarrierEvent::Other => Vec::new(),
        }
    }

    pub fn on_agent_event(&mut self, event: AgentEvent) -> Vec<Action> {
        // Pings are answered whenever the agent can hear us, whatever the call phase.
        if let AgentEvent::Ping { ping_event } = event {
            if self.agent != AgentLink::Open {
                return Vec::new();
            }
            return match ping_event.and_then(|p| p.event_id) {
                Some(event_id) => vec![Action::SendToAgent(AgentCommand::pong(event_id))],
                None => {
                    warn!("Ping without event id ignored.");
                    Vec::new()
                }
            };
        }

        if self.phase != Phase::Streaming {
            return Vec::new();
        }

        match event {
            AgentEvent::Audio { audio_event } => {
                match audio_event.and_then(|a| a.audio_base_64) {
                    Some(payload) => vec![Action::SendToCarrier(CarrierCommand::Media {
                        stream_sid: self.stream_sid.clone(),
                        media: MediaPayload { payload },
                    })],
                    None => Vec::new(),
                }
            }
            AgentEvent::Interruption => {
                debug!(stream_sid = ?self.stream_sid, "Caller barged in; clearing carrier playback.");
                vec![Action::SendToCarrier(CarrierCommand::Clear {
                    stream_sid: self.stream_sid.clone(),
                })]
            }
            AgentEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event,
            } => {
                if let Some(id) = conversation_initiation_metadata_event.and_then(|m| m.conversation_id) {
                    info!(conversation_id = %id, "Agent conversation initiated.");
                    self.conversation_id = Some(id);
                }
                Vec::new()
            }
            AgentEvent::UserTranscript {
                user_transcription_event,
            } => {
                if let Some(text) = user_transcription_event.and_then(|t| t.user_transcript) {
                    info!(transcript = %text, "Caller said.");
                }
                Vec::new()
            }
            AgentEvent::AgentResponse {
                agent_response_event,
            } => {
                if let Some(text) = agent_response_event.and_then(|r| r.agent_response) {
                    info!(response = %text, "Agent said.");
                }
                Vec::new()
            }
            AgentEvent::Ping { .. } | AgentEvent::Other => Vec::new(),
        }
    }

    /// The carrier connection is gone; take the agent down with it.
    pub fn on_carrier_closed(&mut self) -> Vec<Action> {
        self.carrier_open = false;
        self.phase = Phase::Terminated;
        self.close_agent().into_iter().collect()
    }

    /// The agent connection is gone (or never came up); hang up the carrier.
    pub fn on_agent_closed(&mut self) -> Vec<Action> {
        self.agent = AgentLink::Closed;
        self.phase = Phase::Terminated;
        if self.carrier_open {
            self.carrier_open = false;
            vec![Action::CloseCarrier]
        } else {
            Vec::new()
        }
    }

    fn close_agent(&mut self) -> Option<Action> {
        if self.agent == AgentLink::Closed {
            return None;
        }
        self.agent = AgentLink::Closed;
        Some(Action::CloseAgent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AudioEvent, PingEvent};
    use crate::carrier::StreamStart;
    use serde_json::json;

    fn streaming_relay() -> Relay {
        let mut relay = Relay::new();
        relay.carrier_connected();
        relay.agent_opened();
        relay
    }

    fn start(sid: &str) -> CarrierEvent {
        CarrierEvent::Start {
            start: StreamStart {
                stream_sid: sid.to_string(),
                call_sid: None,
            },
        }
    }

    fn media(payload: &str) -> CarrierEvent {
        CarrierEvent::Media {
            media: MediaPayload {
                payload: payload.to_string(),
            },
        }
    }

    fn agent_audio(payload: &str) -> AgentEvent {
        AgentEvent::Audio {
            audio_event: Some(AudioEvent {
                audio_base_64: Some(payload.to_string()),
            }),
        }
    }

    fn ping(id: serde_json::Value) -> AgentEvent {
        AgentEvent::Ping {
            ping_event: Some(PingEvent { event_id: Some(id) }),
        }
    }

    #[test]
    fn test_lifecycle_phases() {
        let mut relay = Relay::new();
        assert_eq!(relay.phase(), Phase::Init);
        assert_eq!(relay.agent_link(), AgentLink::Closed);

        relay.carrier_connected();
        assert_eq!(relay.phase(), Phase::Streaming);
        assert_eq!(relay.agent_link(), AgentLink::Connecting);

        relay.agent_opened();
        assert_eq!(relay.agent_link(), AgentLink::Open);

        relay.on_carrier_closed();
        assert_eq!(relay.phase(), Phase::Terminated);
        assert_eq!(relay.agent_link(), AgentLink::Closed);
    }

    #[test]
    fn test_frames_before_carrier_connects_are_ignored() {
        let mut relay = Relay::new();
        assert!(relay.on_carrier_event(start("SID")).is_empty());
        assert!(relay.on_agent_event(AgentEvent::Interruption).is_empty());
        assert!(relay.stream_sid().is_none());
    }

    #[test]
    fn test_media_passes_through_unchanged_when_agent_open() {
        let mut relay = streaming_relay();
        for payload in ["AB", "/v7+", "AAAAAAAA", "f39/fw=="] {
            let actions = relay.on_carrier_event(media(payload));
            assert_eq!(
                actions,
                vec![Action::SendToAgent(AgentCommand::UserAudioChunk {
                    user_audio_chunk: payload.to_string()
                })]
            );
        }
    }

    #[test]
    fn test_media_dropped_while_agent_connecting() {
        let mut relay = Relay::new();
        relay.carrier_connected();
        assert!(relay.on_carrier_event(media("AB")).is_empty());

        // Nothing was queued: opening the agent does not flush earlier audio.
        relay.agent_opened();
        assert_eq!(relay.on_carrier_event(media("CD")).len(), 1);
    }

    #[test]
    fn test_start_records_stream_sid_once() {
        let mut relay = streaming_relay();
        assert!(relay.on_carrier_event(CarrierEvent::Start {
            start: StreamStart {
                stream_sid: "SID123".to_string(),
                call_sid: Some("CA1".to_string()),
            }
        })
        .is_empty());
        assert_eq!(relay.stream_sid(), Some("SID123"));
        assert_eq!(relay.call_sid(), Some("CA1"));

        relay.on_carrier_event(start("SID999"));
        assert_eq!(relay.stream_sid(), Some("SID123"));
    }

    #[test]
    fn test_agent_audio_tagged_with_stream_sid() {
        let mut relay = streaming_relay();
        relay.on_carrier_event(start("SID123"));

        let actions = relay.on_agent_event(agent_audio("AB"));
        assert_eq!(
            actions,
            vec![Action::SendToCarrier(CarrierCommand::Media {
                stream_sid: Some("SID123".to_string()),
                media: MediaPayload {
                    payload: "AB".to_string()
                },
            })]
        );
    }

    #[test]
    fn test_agent_audio_before_start_is_untagged() {
        let mut relay = streaming_relay();
        let actions = relay.on_agent_event(agent_audio("AB"));
        assert_eq!(
            actions,
            vec![Action::SendToCarrier(CarrierCommand::Media {
                stream_sid: None,
                media: MediaPayload {
                    payload: "AB".to_string()
                },
            })]
        );
    }

    #[test]
    fn test_agent_audio_without_payload_is_ignored() {
        let mut relay = streaming_relay();
        assert!(relay
            .on_agent_event(AgentEvent::Audio { audio_event: None })
            .is_empty());
        assert!(relay
            .on_agent_event(AgentEvent::Audio {
                audio_event: Some(AudioEvent {
                    audio_base_64: None
                })
            })
            .is_empty());
    }

    #[test]
    fn test_interruption_clears_carrier_playback() {
        let mut relay = streaming_relay();
        relay.on_carrier_event(start("SID123"));
        assert_eq!(
            relay.on_agent_event(AgentEvent::Interruption),
            vec![Action::SendToCarrier(CarrierCommand::Clear {
                stream_sid: Some("SID123".to_string())
            })]
        );
    }

    #[test]
    fn test_ping_answered_with_same_event_id() {
        let mut relay = streaming_relay();
        assert_eq!(
            relay.on_agent_event(ping(json!("x"))),
            vec![Action::SendToAgent(AgentCommand::pong(json!("x")))]
        );
        assert_eq!(
            relay.on_agent_event(ping(json!(17))),
            vec![Action::SendToAgent(AgentCommand::pong(json!(17)))]
        );
    }

    #[test]
    fn test_ping_answered_before_start() {
        let mut relay = streaming_relay();
        assert!(relay.stream_sid().is_none());
        assert_eq!(relay.on_agent_event(ping(json!("early"))).len(), 1);
    }

    #[test]
    fn test_ping_without_id_ignored() {
        let mut relay = streaming_relay();
        assert!(relay
            .on_agent_event(AgentEvent::Ping { ping_event: None })
            .is_empty());
    }

    #[test]
    fn test_other_agent_events_are_ignored() {
        let mut relay = streaming_relay();
        assert!(relay.on_agent_event(AgentEvent::Other).is_empty());
        assert!(relay.on_carrier_event(CarrierEvent::Other).is_empty());
    }

    #[test]
    fn test_conversation_metadata_recorded() {
        let mut relay = streaming_relay();
        let event = AgentEvent::parse(
            r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv_9"}}"#,
        )
        .unwrap();
        assert!(relay.on_agent_event(event).is_empty());
        assert_eq!(relay.conversation_id(), Some("conv_9"));
    }

    #[test]
    fn test_stop_closes_agent_only() {
        let mut relay = streaming_relay();
        relay.on_carrier_event(start("SID123"));

        assert_eq!(relay.on_carrier_event(CarrierEvent::Stop), vec![Action::CloseAgent]);
        assert!(relay.is_terminated());

        // The carrier's own close arrives later and must not close the agent twice.
        assert!(relay.on_carrier_closed().is_empty());
        // Our own agent close echoing back does not hang up an already closed carrier.
        assert!(relay.on_agent_closed().is_empty());
    }

    #[test]
    fn test_stop_then_agent_close_hangs_up_open_carrier() {
        let mut relay = streaming_relay();
        relay.on_carrier_event(CarrierEvent::Stop);
        assert_eq!(relay.on_agent_closed(), vec![Action::CloseCarrier]);
        assert!(relay.on_agent_closed().is_empty());
    }

    #[test]
    fn test_carrier_close_closes_agent_once() {
        let mut relay = streaming_relay();
        assert_eq!(relay.on_carrier_closed(), vec![Action::CloseAgent]);
        assert!(relay.on_carrier_closed().is_empty());
        assert!(relay.on_agent_closed().is_empty());
    }

    #[test]
    fn test_carrier_close_while_agent_connecting() {
        let mut relay = Relay::new();
        relay.carrier_connected();
        assert_eq!(relay.on_carrier_closed(), vec![Action::CloseAgent]);
        // A late handshake completion must not resurrect the agent link.
        relay.agent_opened();
        assert_eq!(relay.agent_link(), AgentLink::Closed);
    }

    #[test]
    fn test_agent_close_closes_carrier_once() {
        let mut relay = streaming_relay();
        assert_eq!(relay.on_agent_closed(), vec![Action::CloseCarrier]);
        assert!(relay.on_agent_closed().is_empty());
        assert!(relay.on_carrier_closed().is_empty());
    }

    #[test]
    fn test_agent_connect_failure_hangs_up_carrier() {
        let mut relay = Relay::new();
        relay.carrier_connected();
        assert_eq!(relay.on_agent_closed(), vec![Action::CloseCarrier]);
        assert!(relay.is_terminated());
    }

    #[test]
    fn test_no_translation_after_termination() {
        let mut relay = streaming_relay();
        relay.on_carrier_event(start("SID123"));
        relay.on_carrier_event(CarrierEvent::Stop);

        assert!(relay.on_carrier_event(media("AB")).is_empty());
        assert!(relay.on_agent_event(agent_audio("AB")).is_empty());
        assert!(relay.on_agent_event(AgentEvent::Interruption).is_empty());
        assert!(relay.on_agent_event(ping(json!("x"))).is_empty());
    }
}
