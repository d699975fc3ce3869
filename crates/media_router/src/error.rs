use thiserror::Error;

/// Errors reported by a media transport engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// The offer text could not be parsed.
    #[error("malformed offer: {0}")]
    MalformedOffer(String),

    /// The engine rejected the offer/answer exchange.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The transport was already stopped.
    #[error("transport closed")]
    TransportClosed,
}

/// A router operation was called in a state that does not allow it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Precondition {
    /// Subscribing requires an active publisher.
    #[error("router '{router_id}' has no active publisher")]
    NoPublisher { router_id: String },

    /// The publisher cannot be replaced while subscribers are attached to it.
    #[error(
        "router '{router_id}' still has {subscribers} subscriber(s) bound to publisher '{publisher_id}'"
    )]
    PublisherHasSubscribers {
        router_id: String,
        publisher_id: String,
        subscribers: usize,
    },

    /// The publisher was replaced while a subscriber was negotiating against it.
    #[error("publisher '{expected}' on router '{router_id}' was replaced during negotiation")]
    PublisherChanged { router_id: String, expected: String },

    /// The router has been torn down.
    #[error("router '{router_id}' has been stopped")]
    Stopped { router_id: String },
}

/// Errors returned by [`MediaRouter`](crate::MediaRouter) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouterError {
    /// The offer text could not be parsed.
    #[error("malformed offer: {0}")]
    MalformedOffer(String),

    /// The transport engine rejected the exchange.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error(transparent)]
    Precondition(#[from] Precondition),
}

impl From<EngineError> for RouterError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::MalformedOffer(reason) => RouterError::MalformedOffer(reason),
            EngineError::Negotiation(reason) => RouterError::Negotiation(reason),
            EngineError::TransportClosed => {
                RouterError::Negotiation("transport closed".to_string())
            }
        }
    }
}

/// Errors returned by the process-wide registries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// A router with this id is already registered.
    #[error("router '{0}' is already registered")]
    RouterAlreadyExists(String),
}
