pub mod dedup;
pub mod scheduler;
pub mod sink;
pub mod tracker;
pub mod watermark;

pub use dedup::DedupCache;
pub use scheduler::{CycleOutcome, PollScheduler, SchedulerConfig};
pub use sink::{ChannelSink, EventRecorder, EventSink};
pub use tracker::{Tracker, TrackerHandle};
pub use watermark::WatermarkStore;
