use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::error::AcquisitionError;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A captured still from one camera source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub source: String,
    pub captured_at: DateTime<Utc>,
    pub path: PathBuf,
}

impl Frame {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Anything that can list the recent frames of a camera source, oldest first.
pub trait FrameSource {
    fn list_frames(
        &self,
        source: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Frame>, AcquisitionError>;
}

/// Reads `<source>_*.jpg` captures from a directory, using file modification
/// time as the capture time.
pub struct DirectoryFrameSource {
    dir: PathBuf,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for DirectoryFrameSource {
    fn list_frames(
        &self,
        source: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Frame>, AcquisitionError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|err| AcquisitionError::Unreachable {
            source_id: source.to_string(),
            reason: format!("cannot read {}: {err}", self.dir.display()),
        })?;

        let prefix = format!("{source}_");
        let cutoff = now - window;
        let mut frames = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !has_frame_extension(&path) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let captured_at = DateTime::<Utc>::from(modified);
            if captured_at < cutoff {
                continue;
            }
            frames.push(Frame {
                source: source.to_string(),
                captured_at,
                path,
            });
        }

        frames.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(frames)
    }
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Picks `n` frames spread evenly across the sequence, keeping order.
pub fn sample_evenly(frames: &[Frame], n: usize) -> Vec<Frame> {
    if frames.len() <= n {
        return frames.to_vec();
    }
    if n == 0 {
        return Vec::new();
    }
    let step = frames.len() as f64 / n as f64;
    (0..n)
        .map(|i| frames[(i as f64 * step) as usize].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration as StdDuration, SystemTime};

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"frame").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - StdDuration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn lists_recent_frames_for_source_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bedroom_1010.jpg", 60);
        touch(dir.path(), "bedroom_1000.jpg", 600);
        touch(dir.path(), "bedroom_0930.jpg", 3600);
        touch(dir.path(), "living_1010.jpg", 60);
        touch(dir.path(), "bedroom_notes.txt", 60);

        let source = DirectoryFrameSource::new(dir.path());
        let frames = source
            .list_frames("bedroom", Duration::minutes(12), Utc::now())
            .unwrap();

        let names: Vec<String> = frames.iter().map(Frame::file_name).collect();
        assert_eq!(names, vec!["bedroom_1000.jpg", "bedroom_1010.jpg"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let source = DirectoryFrameSource::new("/nonexistent/cribwatch/captures");
        let frames = source
            .list_frames("bedroom", Duration::minutes(12), Utc::now())
            .unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn sample_evenly_spreads_picks() {
        let now = Utc::now();
        let frames: Vec<Frame> = (0..10)
            .map(|i| Frame {
                source: "bedroom".into(),
                captured_at: now,
                path: PathBuf::from(format!("bedroom_{i}.jpg")),
            })
            .collect();

        let picked: Vec<String> = sample_evenly(&frames, 5).iter().map(Frame::file_name).collect();
        assert_eq!(
            picked,
            vec!["bedroom_0.jpg", "bedroom_2.jpg", "bedroom_4.jpg", "bedroom_6.jpg", "bedroom_8.jpg"]
        );
        assert_eq!(sample_evenly(&frames[..3], 5).len(), 3);
    }
}
