//! VoiceBridge API Library Crate
//!
//! This library contains the web service around the carrier/agent media relay:
//! configuration, application state, the REST glue for call setup and sensor
//! analysis, the media WebSocket, and routing. The `api` binary is a thin
//! wrapper around this library.

pub mod config;
pub mod handlers;
pub mod keepalive;
pub mod models;
pub mod router;
pub mod state;
pub mod telephony;
pub mod ws;
