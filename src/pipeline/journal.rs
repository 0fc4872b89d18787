//! Human-readable daily activity log.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::models::ActivityStatus;

const ENTRY_PREFIX: &str = "- ";

pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `activity_YYYY-MM-DD.md` for the local day of `now`.
    pub fn path_for(&self, now: DateTime<Utc>) -> PathBuf {
        let day = now.with_timezone(&Local).format("%Y-%m-%d");
        self.dir.join(format!("activity_{day}.md"))
    }

    /// The last `n` entry lines of today's journal, oldest first.
    pub fn recent_entries(&self, n: usize, now: DateTime<Utc>) -> Vec<String> {
        let Ok(contents) = fs::read_to_string(self.path_for(now)) else {
            return Vec::new();
        };
        let entries: Vec<String> = contents
            .lines()
            .filter(|line| line.starts_with(ENTRY_PREFIX))
            .map(str::to_string)
            .collect();
        let skip = entries.len().saturating_sub(n);
        entries.into_iter().skip(skip).collect()
    }

    pub fn append_analysis(
        &self,
        now: DateTime<Utc>,
        status: ActivityStatus,
        summary: &str,
        event: Option<&str>,
    ) -> Result<()> {
        let mut entry = format!("- {} [{status}] | {summary}\n", hhmm(now));
        if let Some(label) = event {
            entry.push_str(&format!("  - EVENT: {label}\n"));
        }
        self.append(now, &entry)
    }

    pub fn append_skip(&self, now: DateTime<Utc>, status: ActivityStatus) -> Result<()> {
        self.append(now, &format!("- {} | (no change) continuing: {status}\n", hhmm(now)))
    }

    fn append(&self, now: DateTime<Utc>, text: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create log directory {}", self.dir.display()))?;
        let path = self.path_for(now);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open journal {}", path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("failed to append to {}", path.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn hhmm(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_last_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        let now = Utc::now();

        for _ in 0..4 {
            journal.append_skip(now, ActivityStatus::Sleeping).unwrap();
        }
        journal
            .append_analysis(now, ActivityStatus::Out, "left in the stroller", Some("departed"))
            .unwrap();

        let recent = journal.recent_entries(3, now);
        assert_eq!(recent.len(), 3);
        assert!(recent[2].ends_with("[out] | left in the stroller"));
        assert!(recent[0].ends_with("(no change) continuing: sleeping"));

        let contents = fs::read_to_string(journal.path_for(now)).unwrap();
        assert!(contents.contains("  - EVENT: departed\n"));
    }

    #[test]
    fn missing_journal_has_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("logs"));
        assert!(journal.recent_entries(6, Utc::now()).is_empty());
    }
}
