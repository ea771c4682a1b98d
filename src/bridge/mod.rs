// src/bridge/mod.rs

//! Execution correlation and lifecycle bridge.
//!
//! - [`signal`] classifies completion signals reported by the executor.
//! - [`correlation`] holds one `oneshot` slot per attempt that is waiting
//!   for its signal; first resolution wins.
//! - [`dispatch`] runs the dispatch-and-wait protocol for each attempt the
//!   scheduler invokes and maps the outcome to a `WorkResult`.

pub mod correlation;
pub mod dispatch;
pub mod signal;

pub use correlation::{CorrelationTable, PendingCorrelation, Resolution};
pub use dispatch::{AttemptPhase, BridgeOptions, DEFAULT_DISPATCH_TIMEOUT, DispatchBridge};
pub use signal::{CompletionSignal, Delivery, SignalResult};
