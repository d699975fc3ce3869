//! Signaling front for a selective forwarding unit.
//!
//! [`signaling::Signaling`] drives the routers of the `media_router` crate from JSON
//! commands; [`config::SfuConfig`] holds the process settings it advertises.

pub mod config;
pub mod signaling;

pub use config::SfuConfig;
pub use signaling::{ConnectionId, Signaling, SignalingError, SignalRequest, SignalResponse};
