use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record persisted under one key: the caller's value plus optional expiry metadata.
///
/// Serialized as `{"value": …}` or `{"value": …, "time": <ms>, "expire": <ms>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub value: Value,
    /// Write time in epoch milliseconds.
    #[serde(rename = "time", default, skip_serializing_if = "Option::is_none")]
    written_at: Option<i64>,
    /// Time-to-live in milliseconds.
    #[serde(rename = "expire", default, skip_serializing_if = "Option::is_none")]
    ttl_millis: Option<u64>,
}

impl Envelope {
    /// Envelope that never expires.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            written_at: None,
            ttl_millis: None,
        }
    }

    /// Envelope written at `written_at` that expires `ttl_millis` later.
    pub fn expiring(value: Value, written_at: i64, ttl_millis: u64) -> Self {
        Self {
            value,
            written_at: Some(written_at),
            ttl_millis: Some(ttl_millis),
        }
    }

    pub fn written_at(&self) -> Option<i64> {
        self.written_at
    }

    pub fn ttl_millis(&self) -> Option<u64> {
        self.ttl_millis
    }

    /// True once `now - written_at >= ttl`. Envelopes missing either field never expire.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        match (self.written_at, self.ttl_millis) {
            (Some(written_at), Some(ttl)) => {
                let elapsed = i128::from(now_millis) - i128::from(written_at);
                elapsed >= i128::from(ttl)
            }
            _ => false,
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}
