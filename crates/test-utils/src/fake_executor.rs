use std::sync::Mutex;

use tokio::sync::mpsc;
use workbridge::errors::{BridgeError, Result};
use workbridge::exec::{Dispatch, ExecutorBackend, HostState};
use workbridge::scheduler::BoxFuture;

/// A fake executor that:
/// - reports whatever host state the test sets
/// - records every dispatch on a channel the test reads from
/// - can be told to reject dispatches
pub struct FakeExecutor {
    state: Mutex<HostState>,
    reject: Mutex<bool>,
    dispatches: mpsc::UnboundedSender<Dispatch>,
}

impl FakeExecutor {
    pub fn new(state: HostState) -> (Self, mpsc::UnboundedReceiver<Dispatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Mutex::new(state),
                reject: Mutex::new(false),
                dispatches: tx,
            },
            rx,
        )
    }

    pub fn attached() -> (Self, mpsc::UnboundedReceiver<Dispatch>) {
        Self::new(HostState::Background)
    }

    pub fn set_state(&self, state: HostState) {
        *self.state.lock().unwrap() = state;
    }

    /// Make every following dispatch fail like a broken transport.
    pub fn reject_dispatches(&self, reject: bool) {
        *self.reject.lock().unwrap() = reject;
    }
}

impl ExecutorBackend for FakeExecutor {
    fn host_state(&self) -> HostState {
        *self.state.lock().unwrap()
    }

    fn dispatch(&self, dispatch: Dispatch) -> BoxFuture<'_, Result<()>> {
        let rejected = *self.reject.lock().unwrap();
        let tx = self.dispatches.clone();

        Box::pin(async move {
            if rejected {
                return Err(BridgeError::ExecutorUnavailable(
                    "fake executor rejects dispatches".to_string(),
                ));
            }
            // The test may have dropped its receiver; that is not a
            // transport failure.
            let _ = tx.send(dispatch);
            Ok(())
        })
    }
}
