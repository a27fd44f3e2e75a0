use thiserror::Error;

use crate::reconnect::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is {state}, not open")]
    InvalidState { state: ConnectionState },
    #[error("transport session has shut down")]
    Closed,
    #[error("outbound queue is full")]
    QueueFull,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("request encode failed: {0}")]
    Encode(String),
    #[error("message decode failed: {0}")]
    Decode(String),
    #[error("unexpected message shape: {0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("invalid configuration: {0}")]
    Config(String),
}
