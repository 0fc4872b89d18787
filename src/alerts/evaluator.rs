use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{ActivityState, ActivityStatus, Alert, AlertLevel, Transition};

/// Duration and streak thresholds for alert rules. Boundaries are inclusive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub alone_awake_minutes: f64,
    pub long_sleep_minutes: f64,
    pub unknown_watch_streak: u32,
    pub unknown_alert_streak: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            alone_awake_minutes: 5.0,
            long_sleep_minutes: 180.0,
            unknown_watch_streak: 2,
            unknown_alert_streak: 3,
        }
    }
}

pub struct AlertEvaluator {
    subject: String,
    thresholds: AlertThresholds,
}

impl AlertEvaluator {
    pub fn new(subject: impl Into<String>, thresholds: AlertThresholds) -> Self {
        Self {
            subject: subject.into(),
            thresholds,
        }
    }

    /// Derives alerts from the current state and this cycle's transitions.
    ///
    /// Every rule is checked independently; matches are returned in rule order.
    pub fn evaluate(
        &self,
        state: &ActivityState,
        transitions: &[Transition],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let subject = &self.subject;
        let mut alerts = Vec::new();

        for t in transitions.iter().filter(|t| t.to == ActivityStatus::AloneAwake) {
            alerts.push(Alert::new(
                AlertLevel::Alert,
                format!("{subject} is awake and unattended! {}", t.description),
            ));
        }

        for t in transitions
            .iter()
            .filter(|t| t.to == ActivityStatus::Sleeping && t.from != ActivityStatus::Unknown)
        {
            alerts.push(Alert::new(
                AlertLevel::Normal,
                format!("{subject} fell asleep (was {})", t.from),
            ));
        }

        for t in transitions.iter().filter(|t| {
            t.from == ActivityStatus::Sleeping
                && !matches!(t.to, ActivityStatus::Unknown | ActivityStatus::Sleeping)
        }) {
            alerts.push(Alert::new(
                AlertLevel::Watch,
                format!("{subject} woke up: {}", t.description),
            ));
        }

        let minutes = state.minutes_in_status(now);
        let anchored = state.status_since.is_some();

        if anchored
            && state.status == ActivityStatus::AloneAwake
            && minutes >= self.thresholds.alone_awake_minutes
        {
            alerts.push(Alert::new(
                AlertLevel::Urgent,
                format!("{subject} has been awake alone for {minutes:.0} minutes! Please check."),
            ));
        }

        if anchored
            && state.status == ActivityStatus::Sleeping
            && minutes >= self.thresholds.long_sleep_minutes
        {
            alerts.push(Alert::new(
                AlertLevel::Watch,
                format!("{subject} has been asleep for {minutes:.0} minutes"),
            ));
        }

        alerts.extend(self.uncertainty_alert(state));
        alerts
    }

    /// The unknown-streak rule on its own, used when inference failed outright.
    pub fn uncertainty_alert(&self, state: &ActivityState) -> Option<Alert> {
        let count = state.consecutive_unknown;
        if count < self.thresholds.unknown_watch_streak {
            return None;
        }
        let level = if count >= self.thresholds.unknown_alert_streak {
            AlertLevel::Alert
        } else {
            AlertLevel::Watch
        };
        Some(Alert::new(
            level,
            format!(
                "Could not determine {}'s status {count} times in a row; camera or model may be malfunctioning",
                self.subject
            ),
        ))
    }
}
