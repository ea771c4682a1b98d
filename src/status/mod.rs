// src/status/mod.rs

//! Live status fan-out to subscribers.

pub mod fanout;

pub use fanout::{ListenerId, StatusFanout, StatusSink, StatusUpdate};
