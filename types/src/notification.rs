//! Unsolicited events pushed by the server.

use crate::ids::ObjectId;
use serde::{Deserialize, Serialize};

/// Event kind emitted locally when an object has been released.
pub const RELEASE_EVENT: &str = "release";

/// Event kind under which every outgoing control message of an object can
/// be observed.
pub const TRANSPORT_EVENT: &str = "_rpc";

/// Whether `kind` is handled locally and never subscribed on the server.
pub fn is_reserved(kind: &str) -> bool {
    kind == RELEASE_EVENT || kind == TRANSPORT_EVENT
}

/// Event delivered by the server for a subscribed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub target: ObjectId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(target: ObjectId, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            target,
            kind: kind.into(),
            data,
        }
    }
}
