use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cross-cycle bookkeeping kept apart from the activity document.
///
/// `last_event`/`last_event_time` are the correlation dedup state; the rest
/// feeds the change gate's forced-refresh rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerState {
    pub last_event: Option<String>,
    pub last_event_time: Option<DateTime<Utc>>,
    pub last_inference_at: Option<DateTime<Utc>>,
    pub last_result: Option<String>,
}

impl TrackerState {
    pub fn record_event(&mut self, label: &str, now: DateTime<Utc>) {
        self.last_event = Some(label.to_string());
        self.last_event_time = Some(now);
    }

    pub fn record_inference(&mut self, result: &str, now: DateTime<Utc>) {
        self.last_inference_at = Some(now);
        self.last_result = Some(result.to_string());
    }
}
