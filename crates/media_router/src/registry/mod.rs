//! Process-wide lookup tables shared by the signaling handlers.
//!
//! Both registries are plain values: construct them once at startup and hand them to
//! every handler. Each guards its own map and never calls into the other.

mod routers;
mod sessions;

pub use routers::Routers;
pub use sessions::{SessionInfo, Sessions};
