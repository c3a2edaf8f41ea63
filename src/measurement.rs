use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value key carrying a geohash.
pub const VALUE_GEOHASH: &str = "geo";
/// Value key carrying a latitude.
pub const VALUE_LAT: &str = "lat";
/// Value key carrying a longitude.
pub const VALUE_LON: &str = "lon";

/// One recorded data point for an entity.
///
/// The value map is opaque to the client and carried to the collector
/// as-is. Wire field names are single short keys to keep batch payloads
/// small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "id")]
    pub entity_id: String,

    #[serde(rename = "v")]
    pub values: HashMap<String, Value>,

    #[serde(rename = "tag")]
    pub tags: HashMap<String, String>,

    /// Capture time, seconds since the Unix epoch. Set at construction;
    /// override with [`Measurement::with_timestamp`].
    #[serde(rename = "t")]
    pub timestamp: i64,
}

impl Measurement {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            values: HashMap::new(),
            tags: HashMap::new(),
            timestamp: unix_now(),
        }
    }

    /// A gauge: the value of one or more named quantities at a point in time.
    pub fn gauge(entity_id: impl Into<String>, values: HashMap<String, Value>) -> Self {
        let mut m = Self::new(entity_id);
        m.values = values;
        m
    }

    /// A geohash position report.
    pub fn geohash(entity_id: impl Into<String>, geohash: impl Into<String>) -> Self {
        Self::new(entity_id).with_value(VALUE_GEOHASH, geohash.into())
    }

    /// A latitude/longitude position report.
    pub fn location(entity_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self::new(entity_id)
            .with_value(VALUE_LAT, lat)
            .with_value(VALUE_LON, lon)
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Merge `tags` into the measurement's tag set, overwriting duplicates.
    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn with_timestamp(mut self, secs: i64) -> Self {
        self.timestamp = secs;
        self
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
