//! OBD-II Request Scheduler
//!
//! Polls gauge requests in rate groups through an `ObdClient`, with an
//! adaptive coolant rate boost when the engine runs hot.

mod scheduler;

pub use scheduler::{RequestScheduler, ScheduledRequest, SchedulerConfig, StopHandle};
