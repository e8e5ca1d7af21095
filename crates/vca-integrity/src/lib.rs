//! Component I: integrity tooling (SS4.9) - a thin batch driver over
//! the store (A) and persistence service (D), re-invoking tools
//! through the dispatcher (E) where reconciliation needs it. Owns no
//! queue or worker pool of its own.

mod consistency;
mod error;
mod lineage;
mod reconciliation;
mod retry;

pub use consistency::{ConsistencyChecker, ConsistencyReport, Violation};
pub use error::{IntegrityError, IntegrityResult};
pub use lineage::LineageQueries;
pub use reconciliation::{ReconcileOutcome, Reconciler};
pub use retry::{reconcile_with_retry, DeadLetterEntry, DeadLetterQueue};
