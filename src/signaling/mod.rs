//! Transport-agnostic signaling.
//!
//! Turns the JSON commands of a signaling connection into router operations and keeps
//! the connection's session binding in step. The socket carrying the messages is the
//! caller's business.

mod connection;
mod error;
mod handler;
mod message;

pub use connection::ConnectionId;
pub use error::SignalingError;
pub use handler::Signaling;
pub use message::{SignalRequest, SignalResponse};
