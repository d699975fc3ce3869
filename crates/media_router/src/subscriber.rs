use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::engine::{OutgoingStream, Transport};

/// One media consumer attached to a publisher's tracks.
///
/// Immutable once created. Always owns both its outgoing stream and its transport.
pub struct Subscriber {
    id: String,
    publisher_id: String,
    outgoing: Arc<dyn OutgoingStream>,
    transport: Arc<dyn Transport>,
    stopped: AtomicBool,
}

impl Subscriber {
    pub(crate) fn new(
        id: String,
        publisher_id: String,
        outgoing: Arc<dyn OutgoingStream>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id,
            publisher_id,
            outgoing,
            transport,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the publisher this subscriber was created against.
    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    pub fn stream(&self) -> &Arc<dyn OutgoingStream> {
        &self.outgoing
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the outgoing stream and the transport. Later calls are no-ops returning `false`.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.outgoing.stop();
        self.transport.stop();

        debug!(
            subscriber_id = %self.id,
            publisher_id = %self.publisher_id,
            "Subscriber stopped"
        );
        true
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("publisher_id", &self.publisher_id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
