use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DailyStats {
    pub calls: u64,
    pub skips: u64,
    pub images: u64,
}

/// Cumulative usage counters, keyed per local day as `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunStats {
    pub total_calls: u64,
    pub total_skips: u64,
    pub total_images: u64,
    pub daily: BTreeMap<String, DailyStats>,
}

impl RunStats {
    pub fn day(&mut self, day: &str) -> &mut DailyStats {
        self.daily.entry(day.to_string()).or_default()
    }
}
