pub mod correlator;
pub mod source;

pub use correlator::{should_dispatch, visibility_flip, CorrelationEvent, EventCorrelator, EventKind};
pub use source::{DoorConfig, DoorEvent, DoorEvents, EventSource, Ys7EventSource};
