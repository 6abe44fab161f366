//! Wire records and serialization.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Event body as the collector stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingData {
    pub name: String,
    pub value: String,
    pub identity: String,
    pub session_id: String,
    pub platform: String,
    pub app_version: String,
    pub timestamp: String,
}

/// A single tracked event, posted on its own to `/track`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub tenant_id: String,
    pub tracking: TrackingData,
}

impl Tracking {
    /// Event name.
    pub fn name(&self) -> &str {
        &self.tracking.name
    }
}

/// Payload posted to `/batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchedTracks {
    pub tracks: Vec<Tracking>,
}

impl BatchedTracks {
    pub fn new(tracks: Vec<Tracking>) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Current UTC time as ISO-8601 with millisecond precision, e.g.
/// `2024-01-28T00:00:00.000Z`.
pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Encode string properties as a flat JSON object string.
pub(crate) fn props_to_value<I, K, V>(props: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let object: serde_json::Map<String, serde_json::Value> = props
        .into_iter()
        .map(|(k, v)| (k.into(), serde_json::Value::String(v.into())))
        .collect();
    serde_json::Value::Object(object).to_string()
}
