use serde::{Deserialize, Serialize};

use super::activity::ActivityStatus;

const ABSENT_MARKERS: &[&str] = &["无人", "无", "nobody", "no one", "alone"];
const UNCERTAIN_MARKERS: &[&str] = &["不确定", "unsure", "uncertain"];

/// What the companion field says about adult supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionPresence {
    Absent,
    Uncertain,
    Present,
}

impl CompanionPresence {
    pub fn from_text(companion: &str) -> Self {
        let lowered = companion.to_lowercase();
        if ABSENT_MARKERS.iter().any(|m| lowered.contains(m)) {
            CompanionPresence::Absent
        } else if UNCERTAIN_MARKERS.iter().any(|m| lowered.contains(m)) {
            CompanionPresence::Uncertain
        } else {
            CompanionPresence::Present
        }
    }
}

/// Reconciles an activity-derived status with the companion field.
///
/// Presence outranks the activity description: an awake subject with nobody
/// around is `AloneAwake`, and `AloneAwake` with an adult present is `Playing`.
/// Held and eating are left untouched.
pub fn reconcile_with_companion(
    status: ActivityStatus,
    companion: Option<&str>,
) -> ActivityStatus {
    let Some(companion) = companion else {
        return status;
    };

    match (status, CompanionPresence::from_text(companion)) {
        (ActivityStatus::Playing, CompanionPresence::Absent) => ActivityStatus::AloneAwake,
        (ActivityStatus::AloneAwake, CompanionPresence::Present) => ActivityStatus::Playing,
        (other, _) => other,
    }
}

/// One parsed snapshot from a single inference call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Observation {
    pub status: ActivityStatus,
    pub room: Option<String>,
    pub companion: Option<String>,
    pub light: Option<String>,
    pub description: String,
    /// Original text for lines that could not be split into fields.
    pub raw: Option<String>,
}

impl Observation {
    pub fn unreadable(raw: &str) -> Self {
        Self {
            status: ActivityStatus::Unknown,
            raw: Some(raw.to_string()),
            ..Self::default()
        }
    }

    /// Synthetic observation recorded when the doorway check confirms a departure.
    pub fn departed(description: impl Into<String>) -> Self {
        Self {
            status: ActivityStatus::Out,
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn effective_status(&self) -> ActivityStatus {
        reconcile_with_companion(self.status, self.companion.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_markers() {
        assert_eq!(CompanionPresence::from_text("无人"), CompanionPresence::Absent);
        assert_eq!(CompanionPresence::from_text("Nobody"), CompanionPresence::Absent);
        assert_eq!(CompanionPresence::from_text("不确定"), CompanionPresence::Uncertain);
        assert_eq!(CompanionPresence::from_text("妈妈"), CompanionPresence::Present);
    }

    #[test]
    fn playing_alone_becomes_alone_awake() {
        let obs = Observation {
            status: ActivityStatus::Playing,
            companion: Some("无人".into()),
            ..Observation::default()
        };
        assert_eq!(obs.effective_status(), ActivityStatus::AloneAwake);
    }

    #[test]
    fn alone_awake_with_adult_becomes_playing() {
        assert_eq!(
            reconcile_with_companion(ActivityStatus::AloneAwake, Some("爸爸")),
            ActivityStatus::Playing
        );
        assert_eq!(
            reconcile_with_companion(ActivityStatus::AloneAwake, Some("不确定")),
            ActivityStatus::AloneAwake
        );
    }

    #[test]
    fn held_and_eating_are_not_reconciled() {
        assert_eq!(
            reconcile_with_companion(ActivityStatus::Held, Some("无人")),
            ActivityStatus::Held
        );
        assert_eq!(
            reconcile_with_companion(ActivityStatus::Eating, Some("妈妈")),
            ActivityStatus::Eating
        );
    }
}
