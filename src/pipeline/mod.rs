pub mod driver;
pub mod journal;

pub use driver::{CycleOutcome, PipelineDriver};
pub use journal::Journal;
