//! Wire protocol of the telephony media stream (the Carrier Leg).
//!
//! Inbound frames are decoded into [`CarrierEvent`] at the transport boundary;
//! outbound frames are built as [`CarrierCommand`] and serialized just before
//! they hit the socket.

use crate::FrameError;
use serde::{Deserialize, Serialize};

/// A frame received from the carrier.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierEvent {
    /// The media stream has started and the carrier assigned it an identifier.
    Start { start: StreamStart },
    /// A chunk of caller audio.
    Media { media: MediaPayload },
    /// The call has ended.
    Stop,
    /// `connected`, `mark`, `dtmf` and anything added to the protocol later.
    #[serde(other)]
    Other,
}

impl CarrierEvent {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|source| FrameError::Carrier { source })
    }
}

/// Metadata carried by the `start` frame.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

/// Base64 audio, passed through without being decoded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaPayload {
    pub payload: String,
}

/// A frame sent to the carrier.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierCommand {
    /// Play this audio to the caller.
    Media {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    /// Drop any audio the carrier has buffered for playback.
    Clear {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
    },
}
