//! Out-of-band control messages sent by pages.

use serde::Deserialize;
use serde_json::Value;

/// A recognised control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Let a waiting instance activate without waiting for old pages to close.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ControlMessage {
    /// Parse a message value. Anything unrecognised yields None.
    pub fn parse(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}
