use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::from_utc;

/// Server-assigned identifier; numeric today, but treated as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedingId {
    Number(i64),
    Text(String),
}

impl fmt::Display for FeedingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedingId::Number(id) => write!(f, "{id}"),
            FeedingId::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedingEvent {
    pub id: FeedingId,
    /// UTC timestamp exactly as the server sent it.
    pub timestamp: String,
    /// Cups; negative values are corrections.
    pub amount: f64,
    #[serde(rename = "last_updated_by", default)]
    pub updated_by: Option<String>,
}

impl FeedingEvent {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        from_utc(&self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub date: String,
    pub amount_fed: f64,
    pub target: f64,
    #[serde(rename = "feedings", default)]
    pub events: Vec<FeedingEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedingBucket {
    pub bucket_start: NaiveDateTime,
    pub label: String,
    pub total_amount: f64,
    pub events: Vec<FeedingEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotalResponse {
    pub total: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TargetBody {
    pub target: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedingRequest {
    pub amount: f64,
}

/// Response to `POST /feeding`: the created event plus the running total when
/// the server includes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedFeeding {
    #[serde(flatten)]
    pub event: FeedingEvent,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feeding_event_reads_wire_names() {
        let event: FeedingEvent = serde_json::from_value(json!({
            "id": 7,
            "timestamp": "2026-01-05T16:02:00",
            "amount": 0.25,
            "last_updated_by": "sam"
        }))
        .unwrap();
        assert_eq!(event.id, FeedingId::Number(7));
        assert_eq!(event.updated_by.as_deref(), Some("sam"));
        assert!(event.instant().is_some());
    }

    #[test]
    fn daily_aggregate_reads_camel_case() {
        let day: DailyAggregate = serde_json::from_value(json!({
            "date": "2026-01-04",
            "amountFed": 2.5,
            "target": 2.0,
            "feedings": []
        }))
        .unwrap();
        assert_eq!(day.amount_fed, 2.5);
        assert!(day.events.is_empty());
    }

    #[test]
    fn created_feeding_keeps_optional_total() {
        let created: CreatedFeeding = serde_json::from_value(json!({
            "id": "abc",
            "timestamp": "2026-01-05T16:02:00Z",
            "amount": 0.5,
            "last_updated_by": null,
            "total": 1.75
        }))
        .unwrap();
        assert_eq!(created.event.id.to_string(), "abc");
        assert_eq!(created.total, Some(1.75));
        assert_eq!(created.date, None);
    }
}
