//! Component D: the single writer of `ContextRecord`s (SS4.4). Owns
//! validation-before-write, the idempotency sentinel, best-effort
//! lineage, and the fixed-schedule retry over transient store errors.

mod error;
mod retry;
mod service;

pub use error::{PersistenceError, PersistenceResult};
pub use service::{CompletenessReport, KindCounts, PersistenceService};
