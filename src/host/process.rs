// src/host/process.rs

//! Executor process host.
//!
//! Spawns the executor as a child process and connects it to a
//! [`WorkManager`] over newline-delimited JSON on its stdio:
//!
//! - dispatches from the bridge, status updates for subscribed attempts and
//!   notification actions are written to the child's stdin,
//! - requests read from the child's stdout are handled by a
//!   [`HostSession`] and answered with a reply line.
//!
//! The executor host state is `background` while the child runs and
//! `detached` once it exits, so attempts dispatched while no executor is
//! attached are retried by the scheduler.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::exec::ExecutorHost;
use crate::host::protocol::{self, HostEvent, HostOp, HostRequest, Reply};
use crate::manager::WorkManager;
use crate::presentation::Progress;
use crate::status::{ListenerId, StatusUpdate};
use crate::types::AttemptId;

/// Request handling state for one connected executor.
///
/// The executor holds at most one status subscription per attempt id.
pub struct HostSession {
    manager: Arc<WorkManager>,
    listeners: HashMap<AttemptId, ListenerId>,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl HostSession {
    /// Status updates for subscribed attempts arrive on the returned
    /// receiver.
    pub fn new(manager: Arc<WorkManager>) -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        (
            Self {
                manager,
                listeners: HashMap::new(),
                status_tx,
            },
            status_rx,
        )
    }

    pub fn subscriptions(&self) -> usize {
        self.listeners.len()
    }

    /// Handle one request and build its reply.
    pub async fn handle(&mut self, host: &ExecutorHost, request: HostRequest) -> Reply {
        let seq = request.seq;
        let op = request.op.name();
        debug!(op, ?seq, "executor request");

        match self.handle_op(host, request.op, seq).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(op, error = %err, "executor request failed");
                Reply::error(seq, err)
            }
        }
    }

    async fn handle_op(
        &mut self,
        host: &ExecutorHost,
        op: HostOp,
        seq: Option<u64>,
    ) -> crate::errors::Result<Reply> {
        let mut reply = Reply::ok(seq);

        match op {
            HostOp::Register { worker } => {
                reply.id = self.manager.register(worker).await?;
            }
            HostOp::Enqueue { worker, payload } => {
                reply.id = Some(self.manager.enqueue(&worker, payload).await?);
            }
            HostOp::Cancel { id } => {
                self.manager.cancel(id).await?;
                reply.id = Some(id);
            }
            HostOp::Info { id } => {
                reply.id = Some(id);
                reply.status = Some(self.manager.query_status(id).await?);
            }
            HostOp::Subscribe { id } => {
                let listener = match self.listeners.get(&id) {
                    Some(listener) => *listener,
                    None => {
                        let listener = self.manager.subscribe(id, self.status_tx.clone()).await?;
                        self.listeners.insert(id, listener);
                        listener
                    }
                };
                reply.id = Some(id);
                reply.listener = Some(listener);
            }
            HostOp::Unsubscribe { id } => {
                if let Some(listener) = self.listeners.remove(&id) {
                    self.manager.unsubscribe(id, listener);
                }
                reply.id = Some(id);
            }
            HostOp::Result { id, result, value } => {
                reply.id = Some(id);
                reply.delivery = Some(self.manager.signal_completion(id, &result, value));
            }
            HostOp::AppState { state } => {
                host.set_state(state);
            }
            HostOp::Progress {
                id,
                worker,
                done,
                total,
            } => {
                let definition = self.manager.registry().lookup(&worker)?;
                let template = definition.notification.clone().unwrap_or_default();
                self.manager.bridge().presenter().progress(
                    &worker,
                    id,
                    &template,
                    Progress { done, total },
                );
                reply.id = Some(id);
            }
            HostOp::Action { id, action } => {
                self.manager.bridge().presenter().dispatch_action(id, action);
                reply.id = Some(id);
            }
        }

        Ok(reply)
    }

    /// Drop every status subscription held for the executor.
    pub fn close(&mut self) {
        for (id, listener) in self.listeners.drain() {
            self.manager.unsubscribe(id, listener);
        }
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Runs the executor command and bridges it to a [`WorkManager`].
pub struct ProcessHost {
    cmd: String,
    manager: Arc<WorkManager>,
}

impl ProcessHost {
    pub fn new(cmd: impl Into<String>, manager: Arc<WorkManager>) -> Self {
        Self {
            cmd: cmd.into(),
            manager,
        }
    }

    /// Run until the child exits or `shutdown` fires.
    pub async fn run(&self, host: &mut ExecutorHost, shutdown: oneshot::Receiver<()>) -> Result<()> {
        let result = self.run_inner(host, shutdown).await;
        host.detach();
        if let Err(err) = &result {
            error!(cmd = %self.cmd, error = %err, "executor host error");
        }
        result
    }

    async fn run_inner(
        &self,
        host: &mut ExecutorHost,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<()> {
        info!(cmd = %self.cmd, "starting executor process");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning executor process '{}'", self.cmd))?;

        let stdin = child.stdin.take().context("executor stdin not captured")?;
        let stdout = child.stdout.take().context("executor stdout not captured")?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("executor stderr: {}", line);
                }
            });
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel::<HostEvent>();
        let writer = tokio::spawn(write_events(stdin, out_rx));

        let (mut session, mut status_rx) = HostSession::new(Arc::clone(&self.manager));
        let mut actions = self.manager.bridge().presenter().subscribe_actions();
        let mut lines = BufReader::new(stdout).lines();

        host.attach_background();

        loop {
            tokio::select! {
                dispatch = host.next_dispatch() => {
                    let Some(dispatch) = dispatch else {
                        debug!("dispatch channel closed");
                        break;
                    };
                    let _ = out_tx.send(HostEvent::Dispatch(dispatch));
                }

                line = lines.next_line() => {
                    let line = line.context("reading executor stdout")?;
                    let Some(line) = line else {
                        info!("executor closed its stdout");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match protocol::decode(&line) {
                        Ok(request) => {
                            let reply = session.handle(host, request).await;
                            let _ = out_tx.send(HostEvent::Reply(reply));
                        }
                        Err(err) => {
                            warn!(error = %err, line = %line, "malformed executor request");
                            let _ = out_tx.send(HostEvent::Reply(Reply::error(None, err)));
                        }
                    }
                }

                Some(update) = status_rx.recv() => {
                    let _ = out_tx.send(HostEvent::Status(update));
                }

                action = actions.recv() => {
                    if let Ok(action) = action {
                        let _ = out_tx.send(HostEvent::Action(action));
                    }
                }

                status = child.wait() => {
                    let status = status.context("waiting for executor process")?;
                    info!(exit_code = status.code().unwrap_or(-1), "executor process exited");
                    break;
                }

                _ = &mut shutdown => {
                    info!("shutdown requested; stopping executor process");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill executor process");
                    }
                    break;
                }
            }
        }

        host.detach();
        session.close();
        drop(out_tx);
        let _ = writer.await;
        Ok(())
    }
}

async fn write_events(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<HostEvent>) {
    while let Some(event) = rx.recv().await {
        let line = match protocol::encode(&event) {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "failed to encode executor event");
                continue;
            }
        };
        if let Err(err) = write_line(&mut stdin, &line).await {
            debug!(error = %err, "executor stdin closed");
            return;
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}
