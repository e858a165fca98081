//! Wire protocol of the conversational voice agent (the Agent Leg).

use crate::FrameError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame received from the voice agent.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Synthesized agent speech.
    Audio {
        #[serde(default)]
        audio_event: Option<AudioEvent>,
    },
    /// The caller started talking over the agent.
    Interruption,
    /// Keepalive that must be answered with a pong carrying the same id.
    Ping {
        #[serde(default)]
        ping_event: Option<PingEvent>,
    },
    ConversationInitiationMetadata {
        #[serde(default)]
        conversation_initiation_metadata_event: Option<ConversationMetadata>,
    },
    UserTranscript {
        #[serde(default)]
        user_transcription_event: Option<UserTranscription>,
    },
    AgentResponse {
        #[serde(default)]
        agent_response_event: Option<AgentResponseText>,
    },
    #[serde(other)]
    Other,
}

impl AgentEvent {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|source| FrameError::Agent { source })
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AudioEvent {
    #[serde(default)]
    pub audio_base_64: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PingEvent {
    /// Opaque; echoed back exactly as received.
    #[serde(default)]
    pub event_id: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConversationMetadata {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserTranscription {
    #[serde(default)]
    pub user_transcript: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AgentResponseText {
    #[serde(default)]
    pub agent_response: Option<String>,
}

/// A frame sent to the voice agent.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AgentCommand {
    /// Caller audio, base64 exactly as the carrier delivered it.
    UserAudioChunk { user_audio_chunk: String },
    Pong {
        #[serde(rename = "type")]
        kind: PongKind,
        event_id: Value,
    },
}

impl AgentCommand {
    pub fn pong(event_id: Value) -> Self {
        Self::Pong {
            kind: PongKind::Pong,
            event_id,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PongKind {
    Pong,
}
