pub mod activity;
pub mod alerts;
pub mod correlation;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod sensing;
pub mod settings;
pub mod store;
pub mod utils;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Timelike, Utc};

use alerts::WebhookNotifier;
use correlation::{DoorConfig, DoorEvents, Ys7EventSource};
use inference::GeminiClient;
use pipeline::PipelineDriver;
use sensing::{CaptureOutcome, DirectoryFrameSource, FrameCapturer};
use settings::Settings;
use utils::RetryPolicy;

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Analyze,
    Capture,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "analyze" => Ok(Command::Analyze),
            "capture" => Ok(Command::Capture),
            other => bail!("unknown command '{other}' (expected analyze or capture)"),
        }
    }
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let command = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => Command::Analyze,
    };
    let settings = Settings::from_env()?;

    let now = Utc::now();
    let hour = now.with_timezone(&Local).hour();
    if !settings.schedule.is_active(hour) {
        log_info!(
            "Outside active hours ({}:00-{}:00), nothing to do",
            settings.schedule.start_hour,
            settings.schedule.end_hour
        );
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async {
        match command {
            Command::Analyze => analyze(&settings, now).await,
            Command::Capture => capture(&settings, now).await,
        }
    })
}

async fn analyze(settings: &Settings, now: DateTime<Utc>) -> Result<()> {
    let model = GeminiClient::from_config(&settings.inference)?;
    let door_model = model.with_limits(
        Duration::from_secs(settings.door.model_timeout_secs),
        RetryPolicy::once(),
    )?;
    let notifier = WebhookNotifier::new(&settings.notify)?;
    let frames = DirectoryFrameSource::new(&settings.paths.capture_dir);

    let driver = PipelineDriver::new(
        settings,
        frames,
        model,
        door_model,
        door_events(&settings.door),
        notifier,
    );
    let outcome = driver.run_cycle(now).await;
    log_info!("Cycle finished: {outcome:?}");
    Ok(())
}

async fn capture(settings: &Settings, now: DateTime<Utc>) -> Result<()> {
    let capturer = FrameCapturer::new(
        settings.capture.clone(),
        settings.paths.capture_dir.clone(),
        &settings.paths.state_dir,
    )?;
    let outcomes = capturer.capture_all(now).await?;
    let saved = outcomes
        .values()
        .filter(|outcome| matches!(outcome, CaptureOutcome::Saved { .. }))
        .count();
    log_info!("Captured {saved}/{} cameras", outcomes.len());
    Ok(())
}

fn door_events(config: &DoorConfig) -> DoorEvents {
    if !config.enabled || config.device_serial.is_empty() {
        return DoorEvents::Disabled;
    }
    match Ys7EventSource::from_config(config) {
        Ok(source) => DoorEvents::Ys7(source),
        Err(err) => {
            log_warn!("Doorway correlation disabled: {err:#}");
            DoorEvents::Disabled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("analyze".parse::<Command>().unwrap(), Command::Analyze);
        assert_eq!("capture".parse::<Command>().unwrap(), Command::Capture);
        assert!("report".parse::<Command>().is_err());
    }

    #[test]
    fn doorway_without_serial_is_disabled() {
        let config = DoorConfig::default();
        assert!(matches!(door_events(&config), DoorEvents::Disabled));
    }
}
