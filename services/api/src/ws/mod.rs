//! Carrier/Agent Media Relay over WebSockets
//!
//! - `agent_leg`: opens the outbound connection to the conversational voice agent.
//! - `session`: accepts the carrier's media stream and runs one relay actor per call.
//!
//! The protocol translation itself lives in `voicebridge_core::relay`; this
//! module only moves frames between sockets and the state machine.

mod agent_leg;
pub mod session;

pub use session::media_stream_handler;
