use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Provider;

/// Opaque hot-store identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One operational fact ingested from a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub id: RecordId,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl RawRecord {
    /// Size of the record's compact JSON encoding, in bytes.
    ///
    /// This is the unit for `totalSizeBefore` / `totalSizeAfter`.
    #[must_use]
    pub fn footprint(&self) -> u64 {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len() as u64)
    }
}

/// A pre-computed summary for one location and date window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRecord {
    pub id: RecordId,
    pub location: String,
    pub date: DateTime<Utc>,
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample(location: Option<&str>) -> RawRecord {
        RawRecord {
            id: RecordId::new("r-1"),
            provider: Provider::Bork,
            endpoint: None,
            location: location.map(str::to_string),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
            payload: json!({"ticket": 42, "total": 18.5}),
        }
    }

    #[test]
    fn record_id_is_transparent_in_json() {
        assert_eq!(serde_json::to_string(&RecordId::new("abc")).unwrap(), "\"abc\"");
    }

    #[test]
    fn raw_record_uses_camel_case_and_keeps_null_location() {
        let value = serde_json::to_value(sample(None)).unwrap();
        assert_eq!(value["provider"], "bork");
        assert!(value["location"].is_null());
        assert!(value.get("endpoint").is_none());
        assert_eq!(value["timestamp"], "2026-03-14T12:00:00Z");
    }

    #[test]
    fn footprint_matches_compact_encoding() {
        let record = sample(Some("loc-1"));
        let compact = serde_json::to_vec(&record).unwrap();
        assert_eq!(record.footprint(), compact.len() as u64);
        assert!(record.footprint() > 0);
    }
}
