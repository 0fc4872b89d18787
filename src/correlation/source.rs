//! Doorway motion-event source.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

use crate::error::AcquisitionError;
use crate::inference::client::read_key;
use crate::settings::home_dir;
use crate::utils::{retry_async, RetryPolicy};

/// One motion alert reported by the doorway camera.
#[derive(Debug, Clone, PartialEq)]
pub struct DoorEvent {
    pub timestamp: DateTime<Utc>,
    pub image_url: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// Events from the last `window`, most recent first.
    async fn list_events(
        &self,
        source_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DoorEvent>, AcquisitionError>;

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, AcquisitionError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DoorConfig {
    pub enabled: bool,
    pub api_base: String,
    pub device_serial: String,
    pub app_key_path: PathBuf,
    pub app_secret_path: PathBuf,
    pub window_minutes: i64,
    pub max_images: usize,
    pub dedup_minutes: i64,
    /// Hamming distance under which two event images count as the same shot.
    pub duplicate_distance: u32,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_secs: Vec<u64>,
    pub model_timeout_secs: u64,
    pub min_image_bytes: usize,
    pub resize_width: u32,
    pub jpeg_quality: u8,
}

impl Default for DoorConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            enabled: true,
            api_base: "https://open.ys7.com".into(),
            device_serial: String::new(),
            app_key_path: home.join(".ys7_appkey"),
            app_secret_path: home.join(".ys7_secret"),
            window_minutes: 15,
            max_images: 3,
            dedup_minutes: 30,
            duplicate_distance: 4,
            request_timeout_secs: 15,
            max_attempts: 2,
            backoff_secs: vec![2],
            model_timeout_secs: 60,
            min_image_bytes: 1000,
            resize_width: 800,
            jpeg_quality: 85,
        }
    }
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlarmRecord {
    #[serde(default)]
    alarm_time: i64,
    alarm_pic_url: Option<String>,
}

/// EZVIZ open-platform client (token + device alarm list).
pub struct Ys7EventSource {
    client: reqwest::Client,
    api_base: String,
    app_key: String,
    app_secret: String,
    min_image_bytes: usize,
    retry: RetryPolicy,
}

impl Ys7EventSource {
    pub fn from_config(config: &DoorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build doorway HTTP client")?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            app_key: read_key(&config.app_key_path)?,
            app_secret: read_key(&config.app_secret_path)?,
            min_image_bytes: config.min_image_bytes,
            retry: RetryPolicy::new(config.max_attempts, &config.backoff_secs),
        })
    }

    fn unreachable(err: reqwest::Error) -> AcquisitionError {
        AcquisitionError::Unreachable {
            source_id: "doorway".into(),
            reason: err.without_url().to_string(),
        }
    }

    async fn post_api<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<Option<T>, AcquisitionError> {
        let resp = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .form(form)
            .send()
            .await
            .map_err(Self::unreachable)?;
        if !resp.status().is_success() {
            return Err(AcquisitionError::HttpStatus {
                source_id: "doorway".into(),
                status: resp.status().as_u16(),
            });
        }
        let envelope: ApiEnvelope<T> = resp.json().await.map_err(Self::unreachable)?;
        if envelope.code != "200" {
            return Err(AcquisitionError::Api {
                source_id: "doorway".into(),
                message: format!("{} {}", envelope.code, envelope.msg),
            });
        }
        Ok(envelope.data)
    }

    async fn access_token(&self) -> Result<String, AcquisitionError> {
        let data: Option<TokenData> = self
            .post_api(
                "/api/lapp/token/get",
                &[
                    ("appKey", self.app_key.clone()),
                    ("appSecret", self.app_secret.clone()),
                ],
            )
            .await?;
        data.map(|token| token.access_token)
            .ok_or_else(|| AcquisitionError::Api {
                source_id: "doorway".into(),
                message: "token response without data".into(),
            })
    }

    async fn list_once(
        &self,
        source_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DoorEvent>, AcquisitionError> {
        let token = self.access_token().await?;
        let start = now - window;
        // No alarms in the range comes back without a data field.
        let records: Vec<AlarmRecord> = self
            .post_api(
                "/api/lapp/alarm/device/list",
                &[
                    ("accessToken", token),
                    ("deviceSerial", source_id.to_string()),
                    ("startTime", start.timestamp_millis().to_string()),
                    ("endTime", now.timestamp_millis().to_string()),
                    ("pageSize", "10".to_string()),
                ],
            )
            .await?
            .unwrap_or_default();

        let mut events: Vec<DoorEvent> = records
            .into_iter()
            .map(|record| DoorEvent {
                timestamp: Utc
                    .timestamp_millis_opt(record.alarm_time)
                    .single()
                    .unwrap_or(now),
                image_url: record.alarm_pic_url.filter(|url| !url.is_empty()),
            })
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }
}

impl EventSource for Ys7EventSource {
    async fn list_events(
        &self,
        source_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DoorEvent>, AcquisitionError> {
        retry_async(
            &self.retry,
            "doorway events",
            || self.list_once(source_id, window, now),
            AcquisitionError::is_retryable,
        )
        .await
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, AcquisitionError> {
        let resp = self.client.get(url).send().await.map_err(Self::unreachable)?;
        if !resp.status().is_success() {
            return Err(AcquisitionError::HttpStatus {
                source_id: "doorway".into(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(Self::unreachable)?;
        if body.len() < self.min_image_bytes {
            return Err(AcquisitionError::ImageTooSmall {
                source_id: "doorway".into(),
                bytes: body.len(),
            });
        }
        Ok(body.to_vec())
    }
}

/// Production event source, or a stand-in when no credentials are configured.
pub enum DoorEvents {
    Ys7(Ys7EventSource),
    Disabled,
}

impl EventSource for DoorEvents {
    async fn list_events(
        &self,
        source_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DoorEvent>, AcquisitionError> {
        match self {
            DoorEvents::Ys7(source) => source.list_events(source_id, window, now).await,
            DoorEvents::Disabled => Ok(Vec::new()),
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, AcquisitionError> {
        match self {
            DoorEvents::Ys7(source) => source.fetch_image(url).await,
            DoorEvents::Disabled => Err(AcquisitionError::Unreachable {
                source_id: "doorway".into(),
                reason: "doorway source disabled".into(),
            }),
        }
    }
}
