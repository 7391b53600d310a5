pub mod fanout;
pub mod scheduler;

pub use fanout::{BatchReport, CameraProbeReport, FanOutEngine};
pub use scheduler::{HealthScheduler, PassSummary, SchedulerSettings, SchedulerStatus};
