// src/host/protocol.rs

//! Newline-delimited JSON protocol spoken with the executor process.
//!
//! Every line the executor writes is a [`HostRequest`]: an `op` plus its
//! fields and an optional `seq` that is echoed back in the [`Reply`].
//!
//! ```text
//! {"op":"enqueue","seq":1,"worker":"upload","payload":"{\"file\":\"a.png\"}"}
//! {"op":"result","id":"6b1f...","result":"success","value":"done"}
//! ```
//!
//! Every line written to the executor is a [`HostEvent`], tagged by `event`.

use serde::{Deserialize, Serialize};

use crate::bridge::Delivery;
use crate::errors::Result;
use crate::exec::{Dispatch, HostState};
use crate::presentation::NotificationAction;
use crate::registry::RawWorkerDefinition;
use crate::status::{ListenerId, StatusUpdate};
use crate::types::{AttemptId, WorkStatus};

/// One line received from the executor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostRequest {
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub op: HostOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    Register {
        worker: RawWorkerDefinition,
    },
    Enqueue {
        worker: String,
        #[serde(default)]
        payload: String,
    },
    Cancel {
        id: AttemptId,
    },
    Info {
        id: AttemptId,
    },
    Subscribe {
        id: AttemptId,
    },
    Unsubscribe {
        id: AttemptId,
    },
    /// Completion signal for a dispatched attempt.
    Result {
        id: AttemptId,
        result: String,
        #[serde(default)]
        value: Option<String>,
    },
    /// The host app moved between foreground and background.
    AppState {
        state: HostState,
    },
    Progress {
        id: AttemptId,
        worker: String,
        done: u32,
        total: u32,
    },
    /// A notification action was pressed.
    Action {
        id: AttemptId,
        action: String,
    },
}

impl HostOp {
    pub fn name(&self) -> &'static str {
        match self {
            HostOp::Register { .. } => "register",
            HostOp::Enqueue { .. } => "enqueue",
            HostOp::Cancel { .. } => "cancel",
            HostOp::Info { .. } => "info",
            HostOp::Subscribe { .. } => "subscribe",
            HostOp::Unsubscribe { .. } => "unsubscribe",
            HostOp::Result { .. } => "result",
            HostOp::AppState { .. } => "app_state",
            HostOp::Progress { .. } => "progress",
            HostOp::Action { .. } => "action",
        }
    }
}

/// One line sent to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Dispatch(Dispatch),
    Status(StatusUpdate),
    Action(NotificationAction),
    Reply(Reply),
}

/// Answer to a [`HostRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub seq: Option<u64>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<AttemptId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener: Option<ListenerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(seq: Option<u64>) -> Self {
        Self {
            seq,
            ok: true,
            ..Self::default()
        }
    }

    pub fn error(seq: Option<u64>, error: impl ToString) -> Self {
        Self {
            seq,
            ok: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

pub fn decode(line: &str) -> Result<HostRequest> {
    Ok(serde_json::from_str(line)?)
}

/// Serialise an event as one line, without the trailing newline.
pub fn encode(event: &HostEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}
