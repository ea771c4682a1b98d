// src/host/mod.rs

//! Hosting an out-of-process executor.
//!
//! - [`protocol`] defines the JSON line messages exchanged with it.
//! - [`process`] spawns the executor command and serves its requests.

pub mod process;
pub mod protocol;

pub use process::{HostSession, ProcessHost};
pub use protocol::{HostEvent, HostOp, HostRequest, Reply};
