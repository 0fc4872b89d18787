mod types;

pub use types::{DailyStats, RunStats};

use std::path::Path;

use chrono::{DateTime, Local, Utc};

use crate::store::JsonDocument;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const RUN_STATS_FILE: &str = "run_stats.json";

/// Records inference calls and skips. Bookkeeping only; write failures are logged.
pub struct StatsRecorder {
    doc: JsonDocument<RunStats>,
}

impl StatsRecorder {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            doc: JsonDocument::new(state_dir.join(RUN_STATS_FILE)),
        }
    }

    pub fn snapshot(&self) -> RunStats {
        self.doc.load_or_default()
    }

    pub fn record_call(&self, images: usize, now: DateTime<Utc>) {
        self.update(now, |stats, day| {
            stats.total_calls += 1;
            stats.total_images += images as u64;
            let daily = stats.day(day);
            daily.calls += 1;
            daily.images += images as u64;
        });
    }

    pub fn record_skip(&self, now: DateTime<Utc>) {
        self.update(now, |stats, day| {
            stats.total_skips += 1;
            stats.day(day).skips += 1;
        });
    }

    fn update(&self, now: DateTime<Utc>, apply: impl FnOnce(&mut RunStats, &str)) {
        let day = now.with_timezone(&Local).format("%Y-%m-%d").to_string();
        let mut stats = self.doc.load_or_default();
        apply(&mut stats, &day);
        if let Err(err) = self.doc.save(&stats) {
            log_warn!("Failed to save run stats: {err:#}");
        }
    }
}
