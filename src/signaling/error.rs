use media_router::{Precondition, RegistryError, RouterError};
use thiserror::Error;

use super::connection::ConnectionId;

/// Errors that can occur while handling a signaling command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignalingError {
    /// The message is not a valid command.
    #[error("invalid request: {0}")]
    Decode(#[from] serde_json::Error),

    /// The connection was never registered or has already been closed.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection is already publishing or playing a stream.
    #[error("connection {connection} is already bound to stream '{stream_id}'")]
    ConnectionBusy {
        connection: ConnectionId,
        stream_id: String,
    },

    /// The connection does not hold the role the command needs on this stream.
    #[error("connection {connection} is not bound to stream '{stream_id}'")]
    NotBound {
        connection: ConnectionId,
        stream_id: String,
    },

    /// No router is registered for the stream.
    #[error("stream '{0}' not found")]
    StreamNotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Router(#[from] RouterError),

    /// A blocking worker panicked or was cancelled.
    #[error("worker task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl SignalingError {
    pub const CODE_DECODE: u32 = 1;
    pub const CODE_UNKNOWN_CONNECTION: u32 = 2;
    pub const CODE_STREAM_NOT_FOUND: u32 = 3;
    pub const CODE_STREAM_EXISTS: u32 = 4;
    pub const CODE_CONNECTION_BUSY: u32 = 5;
    pub const CODE_NOT_BOUND: u32 = 6;
    pub const CODE_MALFORMED_OFFER: u32 = 7;
    pub const CODE_NEGOTIATION: u32 = 8;
    pub const CODE_NO_PUBLISHER: u32 = 9;
    pub const CODE_PRECONDITION: u32 = 10;
    pub const CODE_INTERNAL: u32 = 11;

    /// Stable numeric code sent to the client alongside the message.
    pub fn to_code(&self) -> u32 {
        match self {
            SignalingError::Decode(_) => Self::CODE_DECODE,
            SignalingError::UnknownConnection(_) => Self::CODE_UNKNOWN_CONNECTION,
            SignalingError::ConnectionBusy { .. } => Self::CODE_CONNECTION_BUSY,
            SignalingError::NotBound { .. } => Self::CODE_NOT_BOUND,
            SignalingError::StreamNotFound(_) => Self::CODE_STREAM_NOT_FOUND,
            SignalingError::Registry(RegistryError::RouterAlreadyExists(_)) => {
                Self::CODE_STREAM_EXISTS
            }
            SignalingError::Router(RouterError::MalformedOffer(_)) => Self::CODE_MALFORMED_OFFER,
            SignalingError::Router(RouterError::Negotiation(_)) => Self::CODE_NEGOTIATION,
            SignalingError::Router(RouterError::Precondition(Precondition::NoPublisher {
                ..
            })) => Self::CODE_NO_PUBLISHER,
            SignalingError::Router(RouterError::Precondition(_)) => Self::CODE_PRECONDITION,
            _ => Self::CODE_INTERNAL,
        }
    }
}
