//! Component F: the progressive per-video processor (SS4.6), advancing
//! through EXTRACTING -> CAPTIONING -> ANALYZING over the dispatcher
//! (E), emitting progress events on an in-process broadcast channel.

mod error;
mod processor;
mod progress;

pub use error::{ProcessorError, ProcessorResult};
pub use processor::ProgressiveProcessor;
pub use progress::{ProgressEvent, Stage};
