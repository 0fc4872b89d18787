//! One capture pass against the local streaming gateway.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::AcquisitionError;
use crate::store::JsonDocument;
use crate::utils::{retry_async, RetryPolicy};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub gateway_url: String,
    /// Camera name -> gateway stream id.
    pub cameras: BTreeMap<String, String>,
    pub max_attempts: u32,
    pub backoff_secs: Vec<u64>,
    pub timeout_secs: u64,
    pub min_image_bytes: usize,
    pub retention_minutes: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let mut cameras = BTreeMap::new();
        cameras.insert("bedroom".to_string(), "bedroom".to_string());
        cameras.insert("living".to_string(), "living".to_string());
        Self {
            gateway_url: "http://127.0.0.1:1984".into(),
            cameras,
            max_attempts: 3,
            backoff_secs: vec![2, 5, 10],
            timeout_secs: 30,
            min_image_bytes: 1000,
            retention_minutes: 30,
        }
    }
}

pub const CAPTURE_HEALTH_FILE: &str = "capture_health.json";

/// Heartbeat of the capture job plus the gateway outage streak.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureHealth {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_gateway_failures: u32,
}

impl CaptureHealth {
    pub fn record(&mut self, gateway_ok: bool, saved: usize, now: DateTime<Utc>) {
        self.last_run = Some(now);
        if gateway_ok {
            self.consecutive_gateway_failures = 0;
        } else {
            self.consecutive_gateway_failures += 1;
        }
        if saved > 0 {
            self.last_success = Some(now);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Saved { path: PathBuf, bytes: usize },
    Failed { reason: String },
}

pub struct FrameCapturer {
    config: CaptureConfig,
    capture_dir: PathBuf,
    health: JsonDocument<CaptureHealth>,
    client: reqwest::Client,
}

impl FrameCapturer {
    pub fn new(config: CaptureConfig, capture_dir: PathBuf, state_dir: &Path) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build gateway HTTP client")?;
        Ok(Self {
            config,
            capture_dir,
            health: JsonDocument::new(state_dir.join(CAPTURE_HEALTH_FILE)),
            client,
        })
    }

    pub fn health(&self) -> CaptureHealth {
        self.health.load_or_default()
    }

    /// Grabs one frame per camera and prunes expired captures. Per-camera
    /// failures are reported in the outcome map, never returned as errors.
    pub async fn capture_all(&self, now: DateTime<Utc>) -> Result<BTreeMap<String, CaptureOutcome>> {
        fs::create_dir_all(&self.capture_dir).with_context(|| {
            format!("failed to create capture dir {}", self.capture_dir.display())
        })?;

        let mut health = self.health.load_or_default();
        let gateway_ok = self.gateway_healthy().await;
        if !gateway_ok {
            log_warn!(
                "Streaming gateway {} is offline ({} consecutive runs)",
                self.config.gateway_url,
                health.consecutive_gateway_failures + 1
            );
        }

        let stamp = now.with_timezone(&Local).format("%H%M").to_string();
        let mut outcomes = BTreeMap::new();

        for (camera, stream) in &self.config.cameras {
            let outcome = if !gateway_ok {
                CaptureOutcome::Failed {
                    reason: "gateway offline".into(),
                }
            } else {
                match self.capture_camera(camera, stream, &stamp).await {
                    Ok((path, bytes)) => {
                        log_info!("{camera}: {}KB -> {}", bytes / 1024, path.display());
                        CaptureOutcome::Saved { path, bytes }
                    }
                    Err(err) => {
                        log_warn!("{camera}: capture failed: {err}");
                        CaptureOutcome::Failed {
                            reason: err.to_string(),
                        }
                    }
                }
            };
            outcomes.insert(camera.clone(), outcome);
        }

        let saved = outcomes
            .values()
            .filter(|outcome| matches!(outcome, CaptureOutcome::Saved { .. }))
            .count();
        health.record(gateway_ok, saved, now);
        if let Err(err) = self.health.save(&health) {
            log_warn!("Failed to write capture heartbeat: {err:#}");
        }

        let removed = prune_older_than(
            &self.capture_dir,
            Duration::from_secs(self.config.retention_minutes * 60),
        );
        if removed > 0 {
            log_info!("Pruned {removed} expired captures");
        }

        Ok(outcomes)
    }

    async fn gateway_healthy(&self) -> bool {
        let url = format!("{}/api/streams", self.config.gateway_url);
        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn capture_camera(
        &self,
        camera: &str,
        stream: &str,
        stamp: &str,
    ) -> Result<(PathBuf, usize), AcquisitionError> {
        let policy = RetryPolicy::new(self.config.max_attempts, &self.config.backoff_secs);
        let bytes = retry_async(
            &policy,
            camera,
            || self.fetch_frame(camera, stream),
            AcquisitionError::is_retryable,
        )
        .await?;

        let path = self.capture_dir.join(format!("{camera}_{stamp}.jpg"));
        write_atomically(&path, &bytes).map_err(|err| AcquisitionError::Storage {
            reason: format!("{err:#}"),
        })?;
        Ok((path, bytes.len()))
    }

    async fn fetch_frame(&self, camera: &str, stream: &str) -> Result<Vec<u8>, AcquisitionError> {
        let url = format!("{}/api/frame.jpeg", self.config.gateway_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("src", stream)])
            .send()
            .await
            .map_err(|err| AcquisitionError::Unreachable {
                source_id: camera.to_string(),
                reason: err.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus {
                source_id: camera.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|err| AcquisitionError::Unreachable {
                source_id: camera.to_string(),
                reason: err.to_string(),
            })?;
        if body.len() < self.config.min_image_bytes {
            return Err(AcquisitionError::ImageTooSmall {
                source_id: camera.to_string(),
                bytes: body.len(),
            });
        }
        Ok(body.to_vec())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to move capture into {}", path.display()))?;
    Ok(())
}

/// Deletes frame files older than `max_age`; returns how many were removed.
pub fn prune_older_than(dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jpg"))
            .unwrap_or(false);
        if !is_frame {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|modified| modified < cutoff)
            .unwrap_or(false);
        if expired && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_removes_only_expired_jpgs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("bedroom_0900.jpg");
        let fresh = dir.path().join("bedroom_0930.jpg");
        let other = dir.path().join("activity_state.json");
        for path in [&old, &fresh, &other] {
            fs::write(path, b"x").unwrap();
        }
        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        for path in [&old, &other] {
            fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(an_hour_ago)
                .unwrap();
        }

        let removed = prune_older_than(dir.path(), Duration::from_secs(1800));

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(other.exists());
    }

    #[test]
    fn health_counts_gateway_outages_until_recovery() {
        let t0 = Utc::now();
        let mut health = CaptureHealth::default();

        health.record(false, 0, t0);
        health.record(false, 0, t0 + chrono::Duration::minutes(1));
        assert_eq!(health.consecutive_gateway_failures, 2);
        assert_eq!(health.last_run, Some(t0 + chrono::Duration::minutes(1)));
        assert_eq!(health.last_success, None);

        let t2 = t0 + chrono::Duration::minutes(2);
        health.record(true, 2, t2);
        assert_eq!(health.consecutive_gateway_failures, 0);
        assert_eq!(health.last_success, Some(t2));
    }

    #[tokio::test]
    async fn offline_gateway_writes_heartbeat_and_streak() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            // Nothing listens on the discard port.
            gateway_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..CaptureConfig::default()
        };
        let capturer =
            FrameCapturer::new(config, dir.path().join("captures"), dir.path()).unwrap();
        let now = Utc::now();

        let outcomes = capturer.capture_all(now).await.unwrap();
        assert!(outcomes
            .values()
            .all(|outcome| matches!(outcome, CaptureOutcome::Failed { .. })));
        capturer.capture_all(now).await.unwrap();

        let health = capturer.health();
        assert!(dir.path().join(CAPTURE_HEALTH_FILE).exists());
        assert_eq!(health.consecutive_gateway_failures, 2);
        assert_eq!(health.last_run, Some(now));
        assert_eq!(health.last_success, None);
    }

    #[test]
    fn atomic_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("living_1200.jpg");
        write_atomically(&path, b"jpeg bytes").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"jpeg bytes");
    }
}
