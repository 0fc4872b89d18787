//! Persisted documents. Pure data access; policy lives in the callers.

mod document;

use std::path::Path;

use anyhow::Result;

use crate::models::{ActivityState, TrackerState};

pub use document::JsonDocument;

pub const ACTIVITY_FILE: &str = "activity_state.json";
pub const TRACKER_FILE: &str = "tracker_state.json";

/// Owns the activity-state document.
pub struct StateStore {
    doc: JsonDocument<ActivityState>,
}

impl StateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            doc: JsonDocument::new(state_dir.join(ACTIVITY_FILE)),
        }
    }

    pub fn load(&self) -> ActivityState {
        self.doc.load_or_default()
    }

    pub fn save(&self, state: &ActivityState) -> Result<()> {
        self.doc.save(state)
    }
}

/// Owns the tracker document (event dedup and last inference bookkeeping).
pub struct TrackerStore {
    doc: JsonDocument<TrackerState>,
}

impl TrackerStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            doc: JsonDocument::new(state_dir.join(TRACKER_FILE)),
        }
    }

    pub fn load(&self) -> TrackerState {
        self.doc.load_or_default()
    }

    pub fn save(&self, tracker: &TrackerState) -> Result<()> {
        self.doc.save(tracker)
    }
}
