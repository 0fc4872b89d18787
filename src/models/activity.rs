use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of transitions kept in `ActivityState::history`.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Sleeping,
    Playing,
    Held,
    Eating,
    AloneAwake,
    #[default]
    Unknown,
    Out,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Sleeping => "sleeping",
            ActivityStatus::Playing => "playing",
            ActivityStatus::Held => "held",
            ActivityStatus::Eating => "eating",
            ActivityStatus::AloneAwake => "alone_awake",
            ActivityStatus::Unknown => "unknown",
            ActivityStatus::Out => "out",
        }
    }

    /// Whether this status means the subject was seen indoors.
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            ActivityStatus::Sleeping
                | ActivityStatus::Playing
                | ActivityStatus::Held
                | ActivityStatus::Eating
                | ActivityStatus::AloneAwake
        )
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded change from one status to a different one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub from: ActivityStatus,
    pub to: ActivityStatus,
    /// Local wall-clock `HH:MM`, kept for human-readable history.
    pub time: String,
    pub ts: DateTime<Utc>,
    pub description: String,
}

/// The persisted activity document for the monitored subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivityState {
    pub status: ActivityStatus,
    /// Set only when `status` changes to a non-unknown value.
    pub status_since: Option<DateTime<Utc>>,
    pub room: String,
    pub companion: String,
    pub light: String,
    pub consecutive_unknown: u32,
    pub history: VecDeque<Transition>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for ActivityState {
    fn default() -> Self {
        Self {
            status: ActivityStatus::Unknown,
            status_since: None,
            room: "unknown".into(),
            companion: "unknown".into(),
            light: "unknown".into(),
            consecutive_unknown: 0,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            last_update: None,
        }
    }
}

impl ActivityState {
    /// Minutes spent in the current status, or 0 when it was never set.
    pub fn minutes_in_status(&self, now: DateTime<Utc>) -> f64 {
        match self.status_since {
            Some(since) => ((now - since).num_milliseconds() as f64 / 60_000.0).max(0.0),
            None => 0.0,
        }
    }

    /// Appends a transition, evicting the oldest entries past `HISTORY_LIMIT`.
    pub fn push_history(&mut self, transition: Transition) {
        self.history.push_back(transition);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    /// Degraded-mode bump used when the vision model could not be reached.
    pub fn record_inference_failure(&mut self) {
        self.consecutive_unknown = self.consecutive_unknown.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn transition(n: usize) -> Transition {
        Transition {
            from: ActivityStatus::Sleeping,
            to: ActivityStatus::Playing,
            time: "10:00".into(),
            ts: Utc::now(),
            description: format!("t{n}"),
        }
    }

    #[test]
    fn history_evicts_oldest_first() {
        let mut state = ActivityState::default();
        for n in 0..13 {
            state.push_history(transition(n));
        }

        assert_eq!(state.history.len(), HISTORY_LIMIT);
        assert_eq!(state.history.front().unwrap().description, "t3");
        assert_eq!(state.history.back().unwrap().description, "t12");
    }

    #[test]
    fn minutes_in_status_is_zero_when_unset() {
        let state = ActivityState::default();
        assert_eq!(state.minutes_in_status(Utc::now()), 0.0);
    }

    #[test]
    fn minutes_in_status_measures_from_anchor() {
        let now = Utc::now();
        let state = ActivityState {
            status: ActivityStatus::Sleeping,
            status_since: Some(now - Duration::minutes(42)),
            ..ActivityState::default()
        };
        assert!((state.minutes_in_status(now) - 42.0).abs() < 1e-9);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityStatus::AloneAwake).unwrap();
        assert_eq!(json, "\"alone_awake\"");
        assert!(!ActivityStatus::Out.is_visible());
        assert!(!ActivityStatus::Unknown.is_visible());
        assert!(ActivityStatus::Held.is_visible());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let state: ActivityState =
            serde_json::from_str(r#"{"status":"sleeping","consecutive_unknown":2}"#).unwrap();
        assert_eq!(state.status, ActivityStatus::Sleeping);
        assert_eq!(state.consecutive_unknown, 2);
        assert_eq!(state.room, "unknown");
        assert!(state.history.is_empty());
    }
}
