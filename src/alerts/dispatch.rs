use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::DeliveryError;
use crate::models::{Alert, AlertLevel};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const PENDING_ALERTS_FILE: &str = "pending_alerts.txt";

/// Best-effort external notification channel.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_token: None,
            timeout_secs: 10,
        }
    }
}

/// Posts `{"text": message}` to a webhook, with an optional bearer token.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: config.webhook_url.clone().filter(|url| !url.is_empty()),
            token: config.webhook_token.clone().filter(|token| !token.is_empty()),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        let Some(url) = &self.url else {
            return Err(DeliveryError::NotConfigured);
        };

        let mut request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": message }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|err| DeliveryError::Unreachable {
            reason: err.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(DeliveryError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Append-only local queue read by an external redelivery process.
pub struct PendingQueue {
    path: PathBuf,
}

impl PendingQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, alert: &Alert, now: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let message = alert.message.replace('\n', " ");
        writeln!(file, "{}\t{}\t{}", now.to_rfc3339(), alert.level, message)?;
        Ok(())
    }
}

/// Routes alerts by level. Never returns an error to the caller.
pub struct AlertDispatcher<N> {
    notifier: N,
    queue: PendingQueue,
}

impl<N: Notifier> AlertDispatcher<N> {
    pub fn new(notifier: N, queue: PendingQueue) -> Self {
        Self { notifier, queue }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub async fn dispatch(&self, alert: &Alert, now: DateTime<Utc>) {
        if !alert.level.needs_delivery() {
            log_info!("[{}] {}", AlertLevel::Normal, alert.message);
            return;
        }

        match self.notifier.deliver(&alert.message).await {
            Ok(()) => log_info!("Delivered [{}] {}", alert.level, alert.message),
            Err(err) => {
                log_warn!("Delivery failed ({err}); queueing [{}] {}", alert.level, alert.message);
                if let Err(queue_err) = self.queue.append(alert, now) {
                    log_error!("Failed to queue alert locally: {queue_err:#}");
                }
            }
        }
    }

    pub async fn dispatch_all(&self, alerts: &[Alert], now: DateTime<Utc>) {
        for alert in alerts {
            self.dispatch(alert, now).await;
        }
    }
}
