// src/exec/channel.rs

//! Channel-backed executor backend.
//!
//! [`channel_executor`] returns two halves:
//!
//! - [`ChannelExecutor`], the `ExecutorBackend` given to the bridge. It
//!   forwards dispatches over a bounded mpsc channel.
//! - [`ExecutorHost`], held by whatever actually runs the work (the stdio
//!   process host in production, a test body in tests). It drains the
//!   dispatch channel and reports the host state.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::errors::{BridgeError, Result};
use crate::exec::backend::{Dispatch, ExecutorBackend, HostState};
use crate::scheduler::BoxFuture;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Create a connected executor backend / host pair.
pub fn channel_executor(capacity: usize) -> (ChannelExecutor, ExecutorHost) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (state_tx, state_rx) = watch::channel(HostState::Detached);

    (
        ChannelExecutor {
            tx,
            state: state_rx,
        },
        ExecutorHost {
            rx,
            state: state_tx,
        },
    )
}

/// Backend half: used by the dispatch bridge.
#[derive(Debug, Clone)]
pub struct ChannelExecutor {
    tx: mpsc::Sender<Dispatch>,
    state: watch::Receiver<HostState>,
}

impl ChannelExecutor {
    /// Resolves once a host has attached. Returns `false` if the host half
    /// was dropped first.
    pub async fn wait_attached(&self) -> bool {
        let mut state = self.state.clone();
        state.wait_for(HostState::is_attached).await.is_ok()
    }
}

impl ExecutorBackend for ChannelExecutor {
    fn host_state(&self) -> HostState {
        if self.tx.is_closed() {
            return HostState::Detached;
        }
        *self.state.borrow()
    }

    fn dispatch(&self, dispatch: Dispatch) -> BoxFuture<'_, Result<()>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            let id = dispatch.attempt_id;
            tx.send(dispatch).await.map_err(|_| {
                BridgeError::ExecutorUnavailable(format!(
                    "executor host dropped before attempt {id} was dispatched"
                ))
            })
        })
    }
}

/// Host half: receives dispatches and owns the host state.
#[derive(Debug)]
pub struct ExecutorHost {
    rx: mpsc::Receiver<Dispatch>,
    state: watch::Sender<HostState>,
}

impl ExecutorHost {
    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    pub fn set_state(&self, state: HostState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "executor host state changed");
        }
    }

    pub fn attach_background(&self) {
        self.set_state(HostState::Background);
    }

    pub fn attach_foreground(&self) {
        self.set_state(HostState::Foreground);
    }

    pub fn detach(&self) {
        self.set_state(HostState::Detached);
    }

    /// Next dispatch, or `None` once every backend half is gone.
    pub async fn next_dispatch(&mut self) -> Option<Dispatch> {
        let dispatch = self.rx.recv().await?;
        debug!(attempt.id = %dispatch.attempt_id, worker = %dispatch.worker, "dispatch received by host");
        Some(dispatch)
    }

    /// Non-blocking variant of [`next_dispatch`](Self::next_dispatch).
    pub fn try_next_dispatch(&mut self) -> Option<Dispatch> {
        self.rx.try_recv().ok()
    }
}
