//! Component G: the priority queue (SS4.7) - a bounded worker pool
//! consuming a priority-ordered in-memory queue of Jobs, each driven
//! through the Progressive Processor (F).

mod error;
mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{job_status_str, PriorityQueue, QueueStats};
