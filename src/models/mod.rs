pub mod activity;
pub mod alert;
pub mod observation;
pub mod tracker;

pub use activity::{ActivityState, ActivityStatus, Transition, HISTORY_LIMIT};
pub use alert::{Alert, AlertLevel};
pub use observation::{reconcile_with_companion, CompanionPresence, Observation};
pub use tracker::TrackerState;
