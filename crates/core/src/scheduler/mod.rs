//! Discovery scheduler: periodic time-windowed catalog queries feeding the
//! download queue through the manifest dedupe.

mod discovery;
mod window;

pub use discovery::{DiscoveryReport, DiscoveryScheduler, SchedulerStatus};
pub use window::search_window;
