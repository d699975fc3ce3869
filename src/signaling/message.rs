use serde::{Deserialize, Serialize};

/// A command received from a signaling connection.
///
/// Encoded as JSON tagged by `cmd`, e.g.
/// `{"cmd": "publish", "stream_id": "live", "sdp": "v=0..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SignalRequest {
    /// Start publishing `stream_id` with the given offer.
    Publish { stream_id: String, sdp: String },
    /// Stop publishing `stream_id`, tearing down its router.
    Unpublish { stream_id: String },
    /// Start receiving `stream_id` with the given offer.
    Play { stream_id: String, sdp: String },
    /// Stop receiving `stream_id`.
    Unplay { stream_id: String },
}

/// A reply sent back on the signaling connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SignalResponse {
    Publish {
        stream_id: String,
        sdp: String,
    },
    Unpublish {
        stream_id: String,
    },
    Play {
        stream_id: String,
        subscriber_id: String,
        sdp: String,
    },
    Unplay {
        stream_id: String,
    },
    Error {
        code: u32,
        message: String,
    },
}
