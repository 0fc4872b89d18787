pub mod dispatch;
pub mod evaluator;

pub use dispatch::{AlertDispatcher, Notifier, NotifyConfig, PendingQueue, WebhookNotifier, PENDING_ALERTS_FILE};
pub use evaluator::{AlertEvaluator, AlertThresholds};
