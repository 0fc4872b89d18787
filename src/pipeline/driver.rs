//! One run of the activity pipeline:
//! gate -> (skip | infer -> parse -> transition -> correlate -> alert) -> persist.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::activity;
use crate::alerts::{AlertDispatcher, AlertEvaluator, Notifier, PendingQueue, PENDING_ALERTS_FILE};
use crate::correlation::{CorrelationEvent, EventCorrelator, EventKind, EventSource};
use crate::inference::prompt::activity_prompt;
use crate::inference::{encode_file_for_model, first_line, parse_line, InferenceConfig, ModelImage, VisionModel};
use crate::metrics::StatsRecorder;
use crate::models::{ActivityState, ActivityStatus, Observation};
use crate::sensing::{sample_evenly, ChangeGate, Frame, FrameSource};
use crate::settings::Settings;
use crate::store::{StateStore, TrackerStore};

use super::journal::Journal;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No frames in the window; nothing was touched.
    NoFrames,
    /// The gate saw no reason to call the model.
    Skipped,
    /// The model call failed; only the unknown counter moved.
    Degraded,
    Analyzed {
        status: ActivityStatus,
        event: Option<CorrelationEvent>,
    },
}

pub struct PipelineDriver<F, M, E, N> {
    subject: String,
    frames: F,
    model: M,
    correlator: EventCorrelator<E, M>,
    dispatcher: AlertDispatcher<N>,
    gate: ChangeGate,
    evaluator: AlertEvaluator,
    inference: InferenceConfig,
    states: StateStore,
    trackers: TrackerStore,
    journal: Journal,
    stats: StatsRecorder,
}

impl<F, M, E, N> PipelineDriver<F, M, E, N>
where
    F: FrameSource,
    M: VisionModel,
    E: EventSource,
    N: Notifier,
{
    /// `model` answers the activity prompt; `door_model` the doorway question.
    pub fn new(settings: &Settings, frames: F, model: M, door_model: M, events: E, notifier: N) -> Self {
        let state_dir = &settings.paths.state_dir;
        Self {
            subject: settings.subject_name.clone(),
            frames,
            model,
            correlator: EventCorrelator::new(
                events,
                door_model,
                settings.door.clone(),
                settings.subject_name.clone(),
            ),
            dispatcher: AlertDispatcher::new(notifier, PendingQueue::new(state_dir.join(PENDING_ALERTS_FILE))),
            gate: ChangeGate::new(settings.gate.clone()),
            evaluator: AlertEvaluator::new(settings.subject_name.clone(), settings.alerts.clone()),
            inference: settings.inference.clone(),
            states: StateStore::new(state_dir),
            trackers: TrackerStore::new(state_dir),
            journal: Journal::new(&settings.paths.log_dir),
            stats: StatsRecorder::new(state_dir),
        }
    }

    pub fn dispatcher(&self) -> &AlertDispatcher<N> {
        &self.dispatcher
    }

    pub fn correlator(&self) -> &EventCorrelator<E, M> {
        &self.correlator
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        log_info!("[{run_id}] cycle start");

        let frames = self.collect_frames(now);
        let total: usize = frames.values().map(Vec::len).sum();
        if total == 0 {
            log_info!("[{run_id}] no frames to analyse");
            return CycleOutcome::NoFrames;
        }

        let mut tracker = self.trackers.load();
        let decision = self.gate.evaluate(&frames, tracker.last_inference_at, now);
        if !decision.trigger {
            return self.skip(&run_id, now).await;
        }
        log_info!("[{run_id}] analysing ({}), {total} frames in window", decision.reason);

        let images = self.select_images(&frames);
        if images.is_empty() {
            log_warn!("[{run_id}] no usable frames from primary cameras");
            return self.skip(&run_id, now).await;
        }

        let state = self.states.load();
        let recent = self.journal.recent_entries(self.inference.recent_entries, now);
        let prompt = activity_prompt(&self.subject, &recent, &state);

        let answer = match self.model.infer(&images, &prompt).await {
            Ok(answer) => answer,
            Err(err) => {
                log_warn!("[{run_id}] inference failed: {err}");
                return self.degrade(state, now).await;
            }
        };

        let summary = first_line(&answer).to_string();
        log_info!("[{run_id}] {} images -> {summary}", images.len());
        let observation = parse_line(&summary);
        let previous = state.status;
        let (mut state, transition) = activity::apply(state, &observation, now);
        let transitions: Vec<_> = transition.into_iter().collect();

        let event = self
            .correlator
            .correlate(
                previous,
                observation.effective_status(),
                &mut tracker,
                &self.dispatcher,
                now,
            )
            .await;
        if matches!(&event, Some(e) if e.kind == EventKind::Departure) {
            let departed = Observation::departed(format!("{} left through the front door", self.subject));
            state = activity::apply(state, &departed, now).0;
        }

        let alerts = self.evaluator.evaluate(&state, &transitions, now);
        self.dispatcher.dispatch_all(&alerts, now).await;

        if let Err(err) = self.states.save(&state) {
            log_warn!("[{run_id}] failed to save activity state: {err:#}");
        }
        let label = event.as_ref().map(|e| e.kind.label());
        if let Err(err) = self.journal.append_analysis(now, state.status, &summary, label) {
            log_warn!("[{run_id}] failed to write journal: {err:#}");
        }

        tracker.record_inference(&answer, now);
        if let Err(err) = self.trackers.save(&tracker) {
            log_warn!("[{run_id}] failed to save tracker: {err:#}");
        }
        self.stats.record_call(images.len(), now);

        log_info!("[{run_id}] status={}", state.status);
        CycleOutcome::Analyzed {
            status: state.status,
            event,
        }
    }

    fn collect_frames(&self, now: DateTime<Utc>) -> BTreeMap<String, Vec<Frame>> {
        let window = Duration::minutes(self.gate.config().window_minutes);
        let mut frames = BTreeMap::new();
        for source in &self.gate.config().sources {
            match self.frames.list_frames(source, window, now) {
                Ok(list) => {
                    frames.insert(source.clone(), list);
                }
                Err(err) => log_warn!("{source}: frames unavailable this cycle: {err}"),
            }
        }
        frames
    }

    /// Evenly sampled, re-encoded frames of the primary cameras.
    fn select_images(&self, frames: &BTreeMap<String, Vec<Frame>>) -> Vec<ModelImage> {
        let mut images = Vec::new();
        for camera in &self.inference.primary_cameras {
            let Some(list) = frames.get(camera) else {
                continue;
            };
            for frame in sample_evenly(list, self.inference.max_frames_per_camera) {
                match encode_file_for_model(
                    &frame.path,
                    self.inference.resize_width,
                    self.inference.jpeg_quality,
                ) {
                    Ok(jpeg) => images.push(ModelImage {
                        label: format!("[{}]", frame.file_name()),
                        jpeg,
                    }),
                    Err(err) => log_warn!("Skipping frame {}: {err:#}", frame.path.display()),
                }
            }
        }
        log_debug!("Selected {} frames for the model", images.len());
        images
    }

    async fn skip(&self, run_id: &str, now: DateTime<Utc>) -> CycleOutcome {
        let state = self.states.load();
        let alerts = self.evaluator.evaluate(&state, &[], now);
        self.dispatcher.dispatch_all(&alerts, now).await;

        log_info!("[{run_id}] no change, continuing {}", state.status);
        if let Err(err) = self.journal.append_skip(now, state.status) {
            log_warn!("[{run_id}] failed to write journal: {err:#}");
        }
        self.stats.record_skip(now);
        CycleOutcome::Skipped
    }

    async fn degrade(&self, mut state: ActivityState, now: DateTime<Utc>) -> CycleOutcome {
        state.record_inference_failure();
        if let Err(err) = self.states.save(&state) {
            log_warn!("Failed to save activity state: {err:#}");
        }
        if let Some(alert) = self.evaluator.uncertainty_alert(&state) {
            self.dispatcher.dispatch(&alert, now).await;
        }
        self.stats.record_skip(now);
        CycleOutcome::Degraded
    }
}
