use chrono::{DateTime, Local, Utc};

use crate::models::{ActivityState, ActivityStatus, Observation, Transition};

/// Applies one observation to the stored state.
///
/// Unknown observations only bump `consecutive_unknown` and refresh context,
/// so a momentary misread never erases the last known status. At most one
/// transition is produced per call.
pub fn apply(
    mut state: ActivityState,
    observation: &Observation,
    now: DateTime<Utc>,
) -> (ActivityState, Option<Transition>) {
    let new_status = observation.effective_status();
    let mut transition = None;

    if new_status == ActivityStatus::Unknown {
        state.consecutive_unknown = state.consecutive_unknown.saturating_add(1);
    } else {
        state.consecutive_unknown = 0;

        if new_status != state.status {
            let record = Transition {
                from: state.status,
                to: new_status,
                time: now.with_timezone(&Local).format("%H:%M").to_string(),
                ts: now,
                description: observation.description.clone(),
            };
            state.status_since = Some(now);
            state.push_history(record.clone());
            transition = Some(record);
        }
        state.status = new_status;
    }

    refresh_context(&mut state, observation);
    state.last_update = Some(now);

    (state, transition)
}

fn refresh_context(state: &mut ActivityState, observation: &Observation) {
    if let Some(room) = observation.room.as_deref() {
        if !room.is_empty() && room != "unknown" {
            state.room = room.to_string();
        }
    }
    if let Some(companion) = observation.companion.as_deref() {
        if !companion.is_empty() {
            state.companion = companion.to_string();
        }
    }
    if let Some(light) = observation.light.as_deref() {
        if !light.is_empty() {
            state.light = light.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HISTORY_LIMIT;
    use chrono::Duration;

    fn observed(status: ActivityStatus) -> Observation {
        Observation {
            status,
            room: Some("bedroom".into()),
            companion: Some("mother".into()),
            light: Some("bright".into()),
            description: format!("{status} now"),
            raw: None,
        }
    }

    fn sleeping_since(since: DateTime<Utc>) -> ActivityState {
        ActivityState {
            status: ActivityStatus::Sleeping,
            status_since: Some(since),
            room: "bedroom".into(),
            ..ActivityState::default()
        }
    }

    #[test]
    fn unknown_keeps_status_and_bumps_counter() {
        let now = Utc::now();
        let since = now - Duration::minutes(40);
        let state = ActivityState {
            consecutive_unknown: 1,
            ..sleeping_since(since)
        };
        let obs = Observation {
            room: Some("living".into()),
            ..Observation::unreadable("garbled")
        };

        let (next, transition) = apply(state, &obs, now);

        assert!(transition.is_none());
        assert_eq!(next.status, ActivityStatus::Sleeping);
        assert_eq!(next.status_since, Some(since));
        assert_eq!(next.consecutive_unknown, 2);
        assert_eq!(next.room, "living");
        assert_eq!(next.last_update, Some(now));
    }

    #[test]
    fn change_emits_one_transition_and_resets_anchor() {
        let now = Utc::now();
        let state = ActivityState {
            consecutive_unknown: 4,
            ..sleeping_since(now - Duration::minutes(90))
        };

        let (next, transition) = apply(state, &observed(ActivityStatus::Held), now);

        let transition = transition.expect("status changed");
        assert_eq!(transition.from, ActivityStatus::Sleeping);
        assert_eq!(transition.to, ActivityStatus::Held);
        assert_eq!(transition.ts, now);
        assert_eq!(transition.description, "held now");
        assert_eq!(next.status, ActivityStatus::Held);
        assert_eq!(next.status_since, Some(now));
        assert_eq!(next.consecutive_unknown, 0);
        assert_eq!(next.history.back(), Some(&transition));
    }

    #[test]
    fn same_status_refreshes_context_only() {
        let now = Utc::now();
        let since = now - Duration::minutes(10);
        let state = sleeping_since(since);
        let obs = Observation {
            light: Some("night vision".into()),
            companion: Some("nobody".into()),
            ..observed(ActivityStatus::Sleeping)
        };

        let (next, transition) = apply(state, &obs, now);

        assert!(transition.is_none());
        assert_eq!(next.status_since, Some(since));
        assert_eq!(next.light, "night vision");
        assert_eq!(next.companion, "nobody");
        assert!(next.history.is_empty());
    }

    #[test]
    fn playing_with_nobody_present_becomes_alone_awake() {
        let now = Utc::now();
        let obs = Observation {
            status: ActivityStatus::Playing,
            companion: Some("无人".into()),
            ..Observation::default()
        };

        let (next, transition) = apply(sleeping_since(now - Duration::minutes(60)), &obs, now);

        assert_eq!(next.status, ActivityStatus::AloneAwake);
        assert_eq!(transition.map(|t| t.to), Some(ActivityStatus::AloneAwake));
    }

    #[test]
    fn first_observation_transitions_from_unknown() {
        let now = Utc::now();
        let (next, transition) = apply(ActivityState::default(), &observed(ActivityStatus::Playing), now);

        assert_eq!(transition.map(|t| t.from), Some(ActivityStatus::Unknown));
        assert_eq!(next.status, ActivityStatus::Playing);
    }

    #[test]
    fn unknown_room_does_not_overwrite_context() {
        let now = Utc::now();
        let obs = Observation {
            room: Some("unknown".into()),
            ..observed(ActivityStatus::Sleeping)
        };
        let (next, _) = apply(sleeping_since(now), &obs, now);
        assert_eq!(next.room, "bedroom");
    }

    #[test]
    fn history_is_capped_across_many_changes() {
        let mut state = ActivityState::default();
        let start = Utc::now();
        let cycle = [ActivityStatus::Sleeping, ActivityStatus::Held, ActivityStatus::Eating];

        for i in 0..25 {
            let now = start + Duration::minutes(i);
            let (next, transition) = apply(state, &observed(cycle[i as usize % 3]), now);
            assert!(transition.is_some());
            state = next;
            assert!(state.history.len() <= HISTORY_LIMIT);
        }

        assert_eq!(state.history.len(), HISTORY_LIMIT);
        assert_eq!(state.history.front().unwrap().ts, start + Duration::minutes(15));
    }
}
