// src/exec/mod.rs

//! Executor side of the bridge.
//!
//! - [`backend`] defines the `ExecutorBackend` trait the dispatch bridge
//!   sends work through, plus the dispatch and host-state types.
//! - [`channel`] provides a channel-backed backend and the matching host
//!   handle that drains it.

pub mod backend;
pub mod channel;

pub use backend::{Dispatch, DispatchMode, ExecutorBackend, HostState};
pub use channel::{ChannelExecutor, DEFAULT_CHANNEL_CAPACITY, ExecutorHost, channel_executor};
