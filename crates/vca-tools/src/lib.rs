//! Component E: the tool registry and dispatcher (SS4.5) plus the
//! shared retry/circuit-breaker utilities a tool invocation runs under
//! (SS7). Tool implementations themselves are external collaborators
//! reached over HTTP through `ToolRunnerClient`; this crate owns the
//! dispatch table, not any model inference.

mod circuit_breaker;
mod dispatcher;
mod error;
mod registry;
mod retry;
mod rpc;
mod schema;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use dispatcher::{BatchOutcome, DispatchOutcome, Dispatcher, DispatcherConfig};
pub use error::{ToolError, ToolResult};
pub use registry::{ToolContext, ToolOutcome, ToolRegistry, ToolSpec};
pub use retry::{with_retry, RetryConfig};
pub use rpc::{ToolRunnerClient, ToolRunnerConfig};
pub use schema::{CaptionFramesParams, DetectObjectsParams, ExtractFramesParams, TranscribeAudioParams};
