//! Session coordination for a selective forwarding unit.
//!
//! A [`MediaRouter`] owns one routing domain: a single [`Publisher`] fanned out to any
//! number of [`Subscriber`]s. [`Routers`] and [`Sessions`] are the shared lookup tables
//! the signaling handlers use to find a router and to remember what each signaling
//! connection is bound to.
//!
//! Offer parsing, transport negotiation and media forwarding belong to an external
//! engine reached through the traits in [`engine`]. [`loopback`] provides an
//! in-memory one.

pub mod engine;
pub mod error;
pub mod loopback;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod subscriber;

pub use engine::{Capabilities, Capability, Endpoint, MediaKind};
pub use error::{EngineError, Precondition, RegistryError, RouterError};
pub use publisher::Publisher;
pub use registry::{Routers, SessionInfo, Sessions};
pub use router::{MediaRouter, RouterPhase};
pub use subscriber::Subscriber;
