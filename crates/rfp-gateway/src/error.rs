use rfp_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = GatewayError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("command queue full")]
    QueueFull,
    #[error("dispatcher stopped")]
    Closed,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("bridge disconnected")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(e: tokio::task::JoinError) -> Self {
        GatewayError::Join(e.to_string())
    }
}
