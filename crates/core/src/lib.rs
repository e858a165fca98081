pub mod agent;
pub mod analysis;
pub mod carrier;
pub mod llm_client;
pub mod relay;

/// A text frame from either leg that could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed carrier frame: {source}")]
    Carrier { source: serde_json::Error },
    #[error("malformed agent frame: {source}")]
    Agent { source: serde_json::Error },
}
