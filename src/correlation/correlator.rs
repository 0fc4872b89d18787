use chrono::{DateTime, Duration, Utc};

use crate::alerts::{AlertDispatcher, Notifier};
use crate::inference::prompt::{is_affirmative, DOOR_PROMPT};
use crate::inference::{encode_for_model, ModelImage, VisionModel};
use crate::models::{ActivityStatus, Alert, AlertLevel, TrackerState};
use crate::sensing::phash::dedupe_similar;

use super::source::{DoorConfig, EventSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Departure,
    Return,
}

impl EventKind {
    /// Label stored in the tracker and used for dedup.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Departure => "departed",
            EventKind::Return => "returned",
        }
    }

    fn check_tag(&self) -> &'static str {
        match self {
            EventKind::Departure => "possible departure",
            EventKind::Return => "possible return",
        }
    }
}

/// Result of a confirmed correlation check.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationEvent {
    pub kind: EventKind,
    /// False when suppressed by the dedup window.
    pub dispatched: bool,
}

/// Detects a visible/not-visible flip between two statuses.
pub fn visibility_flip(previous: ActivityStatus, current: ActivityStatus) -> Option<EventKind> {
    match (previous.is_visible(), current.is_visible()) {
        (true, false) => Some(EventKind::Departure),
        (false, true) => Some(EventKind::Return),
        _ => None,
    }
}

/// Suppress a repeat of the last dispatched label inside the dedup window.
pub fn should_dispatch(
    tracker: &TrackerState,
    label: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    match (&tracker.last_event, tracker.last_event_time) {
        (Some(last), Some(at)) if last == label => now - at >= window,
        _ => true,
    }
}

pub struct EventCorrelator<E, M> {
    events: E,
    model: M,
    config: DoorConfig,
    subject: String,
}

impl<E: EventSource, M: VisionModel> EventCorrelator<E, M> {
    pub fn new(events: E, model: M, config: DoorConfig, subject: impl Into<String>) -> Self {
        Self {
            events,
            model,
            config,
            subject: subject.into(),
        }
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs the doorway check for a flip and dispatches a deduplicated event.
    ///
    /// Returns `None` when there is no flip, correlation is disabled or the
    /// doorway check does not confirm.
    pub async fn correlate<N: Notifier>(
        &self,
        previous: ActivityStatus,
        current: ActivityStatus,
        tracker: &mut TrackerState,
        dispatcher: &AlertDispatcher<N>,
        now: DateTime<Utc>,
    ) -> Option<CorrelationEvent> {
        if !self.config.enabled {
            return None;
        }
        let kind = visibility_flip(previous, current)?;
        log_info!("{} ({previous} -> {current}), checking doorway", kind.check_tag());

        if !self.confirm(now).await {
            return None;
        }

        let label = kind.label();
        let window = Duration::minutes(self.config.dedup_minutes);
        if !should_dispatch(tracker, label, now, window) {
            log_info!("Suppressing repeated '{label}' event inside dedup window");
            return Some(CorrelationEvent {
                kind,
                dispatched: false,
            });
        }

        let message = match kind {
            EventKind::Departure => format!("{} went out (stroller seen at the door)", self.subject),
            EventKind::Return => format!("{} is back home (stroller seen at the door)", self.subject),
        };
        dispatcher
            .dispatch(&Alert::new(AlertLevel::Watch, message), now)
            .await;
        tracker.record_event(label, now);

        Some(CorrelationEvent {
            kind,
            dispatched: true,
        })
    }

    /// Asks the vision model about recent doorway snapshots. Any failure is "no".
    pub async fn confirm(&self, now: DateTime<Utc>) -> bool {
        let window = Duration::minutes(self.config.window_minutes);
        let events = match self
            .events
            .list_events(&self.config.device_serial, window, now)
            .await
        {
            Ok(events) => events,
            Err(err) => {
                log_warn!("Doorway event query failed: {err}");
                return false;
            }
        };
        if events.is_empty() {
            log_info!("No doorway events in the last {} minutes", self.config.window_minutes);
            return false;
        }

        let mut downloads = Vec::new();
        for url in events
            .iter()
            .filter_map(|event| event.image_url.as_deref())
            .take(self.config.max_images)
        {
            match self.events.fetch_image(url).await {
                Ok(bytes) => downloads.push(bytes),
                Err(err) => log_warn!("Skipping doorway image: {err}"),
            }
        }

        let fetched = downloads.len();
        let unique = dedupe_similar(downloads, self.config.duplicate_distance);
        log_debug!("Doorway images: {fetched} fetched, {} distinct", unique.len());

        let images: Vec<ModelImage> = unique
            .iter()
            .enumerate()
            .filter_map(|(idx, bytes)| {
                match encode_for_model(bytes, self.config.resize_width, self.config.jpeg_quality) {
                    Ok(jpeg) => Some(ModelImage {
                        label: format!("[door alert {}]", idx + 1),
                        jpeg,
                    }),
                    Err(err) => {
                        log_warn!("Skipping undecodable doorway image: {err:#}");
                        None
                    }
                }
            })
            .collect();
        if images.is_empty() {
            log_info!("No usable doorway images");
            return false;
        }

        match self.model.infer(&images, DOOR_PROMPT).await {
            Ok(answer) => {
                let confirmed = is_affirmative(&answer);
                log_info!("Doorway check answered '{}' -> {confirmed}", answer.trim());
                confirmed
            }
            Err(err) => {
                log_warn!("Doorway check inference failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::PendingQueue;
    use crate::correlation::source::DoorEvent;
    use crate::error::{AcquisitionError, DeliveryError, InferenceError};
    use std::cell::{Cell, RefCell};
    use std::io::Cursor;

    struct FakeEvents {
        events: Vec<DoorEvent>,
        image: Vec<u8>,
    }

    impl EventSource for FakeEvents {
        async fn list_events(
            &self,
            _source_id: &str,
            _window: Duration,
            _now: DateTime<Utc>,
        ) -> Result<Vec<DoorEvent>, AcquisitionError> {
            Ok(self.events.clone())
        }

        async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, AcquisitionError> {
            Ok(self.image.clone())
        }
    }

    struct FakeModel {
        answer: &'static str,
        calls: Cell<usize>,
    }

    impl VisionModel for FakeModel {
        async fn infer(&self, _images: &[ModelImage], _prompt: &str) -> Result<String, InferenceError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.answer.to_string())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
            self.sent.borrow_mut().push(message.to_string());
            Ok(())
        }
    }

    fn jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_fn(64, 48, |x, y| image::Rgb([(x * 4) as u8, (y * 5) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    fn correlator(events: Vec<DoorEvent>, answer: &'static str) -> EventCorrelator<FakeEvents, FakeModel> {
        EventCorrelator::new(
            FakeEvents { events, image: jpeg() },
            FakeModel {
                answer,
                calls: Cell::new(0),
            },
            DoorConfig::default(),
            "Rui",
        )
    }

    fn door_event(now: DateTime<Utc>) -> DoorEvent {
        DoorEvent {
            timestamp: now - Duration::minutes(3),
            image_url: Some("https://pics.example/1.jpg".into()),
        }
    }

    #[test]
    fn flips_follow_visibility() {
        use ActivityStatus::*;
        assert_eq!(visibility_flip(Sleeping, Unknown), Some(EventKind::Departure));
        assert_eq!(visibility_flip(Out, Playing), Some(EventKind::Return));
        assert_eq!(visibility_flip(Unknown, Out), None);
        assert_eq!(visibility_flip(Held, Eating), None);
    }

    #[test]
    fn dedup_window() {
        let now = Utc::now();
        let mut tracker = TrackerState::default();
        let window = Duration::minutes(30);
        assert!(should_dispatch(&tracker, "departed", now, window));

        tracker.record_event("departed", now - Duration::minutes(10));
        assert!(!should_dispatch(&tracker, "departed", now, window));
        assert!(should_dispatch(&tracker, "returned", now, window));

        tracker.record_event("departed", now - Duration::minutes(30));
        assert!(should_dispatch(&tracker, "departed", now, window));
    }

    #[tokio::test]
    async fn no_doorway_events_means_no_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AlertDispatcher::new(
            RecordingNotifier::default(),
            PendingQueue::new(dir.path().join("pending.txt")),
        );
        let correlator = correlator(Vec::new(), "YES");
        let mut tracker = TrackerState::default();

        let outcome = correlator
            .correlate(
                ActivityStatus::Sleeping,
                ActivityStatus::Unknown,
                &mut tracker,
                &dispatcher,
                Utc::now(),
            )
            .await;

        assert_eq!(outcome, None);
        assert_eq!(correlator.model.calls.get(), 0);
        assert!(dispatcher.notifier().sent.borrow().is_empty());
        assert_eq!(tracker, TrackerState::default());
    }

    #[tokio::test]
    async fn confirmed_departure_dispatches_once_per_window() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AlertDispatcher::new(
            RecordingNotifier::default(),
            PendingQueue::new(dir.path().join("pending.txt")),
        );
        let now = Utc::now();
        let correlator = correlator(vec![door_event(now), door_event(now)], "YES");
        let mut tracker = TrackerState::default();

        let first = correlator
            .correlate(ActivityStatus::Playing, ActivityStatus::Unknown, &mut tracker, &dispatcher, now)
            .await
            .unwrap();
        assert_eq!(first.kind, EventKind::Departure);
        assert!(first.dispatched);
        assert_eq!(tracker.last_event.as_deref(), Some("departed"));

        let later = now + Duration::minutes(5);
        let second = correlator
            .correlate(ActivityStatus::Held, ActivityStatus::Unknown, &mut tracker, &dispatcher, later)
            .await
            .unwrap();
        assert!(!second.dispatched);
        assert_eq!(tracker.last_event_time, Some(now));
        assert_eq!(dispatcher.notifier().sent.borrow().len(), 1);

        let after_window = now + Duration::minutes(31);
        let third = correlator
            .correlate(ActivityStatus::Held, ActivityStatus::Unknown, &mut tracker, &dispatcher, after_window)
            .await
            .unwrap();
        assert!(third.dispatched);
        assert_eq!(dispatcher.notifier().sent.borrow().len(), 2);
    }

    #[tokio::test]
    async fn negative_answer_is_not_an_event() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AlertDispatcher::new(
            RecordingNotifier::default(),
            PendingQueue::new(dir.path().join("pending.txt")),
        );
        let now = Utc::now();
        let correlator = correlator(vec![door_event(now)], "NO");
        let mut tracker = TrackerState::default();

        let outcome = correlator
            .correlate(ActivityStatus::Out, ActivityStatus::Playing, &mut tracker, &dispatcher, now)
            .await;

        assert_eq!(outcome, None);
        assert_eq!(correlator.model.calls.get(), 1);
    }
}
