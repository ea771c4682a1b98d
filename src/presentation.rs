// src/presentation.rs

//! User-visible notification state for running attempts.
//!
//! This is a side-effect consumer of dispatch state: the bridge tells the
//! [`NotificationAdapter`] when an attempt starts and finishes, the adapter
//! builds a [`Notification`] from the worker's template and hands it to a
//! [`Presenter`]. Nothing here can change the outcome of an attempt.
//!
//! Notification actions (buttons) flow the other way: the presenting side
//! reports a pressed action via [`NotificationAdapter::dispatch_action`] and
//! it is broadcast to whoever listens (the executor host forwards it to the
//! executor).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::scheduler::WorkResult;
use crate::types::AttemptId;

/// Notification template attached to a worker definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub title: String,
    #[serde(default)]
    pub text: String,
    /// Action labels shown as buttons.
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub done: u32,
    pub total: u32,
}

/// Fully resolved notification for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Channel id; one channel per worker name.
    pub channel: String,
    pub attempt_id: AttemptId,
    pub title: String,
    pub text: String,
    pub actions: Vec<String>,
    pub progress: Option<Progress>,
    /// Ongoing notifications cannot be dismissed by the user.
    pub ongoing: bool,
}

/// An action pressed on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    #[serde(rename = "id")]
    pub attempt_id: AttemptId,
    pub action: String,
}

/// Where notifications end up.
pub trait Presenter: Send + Sync {
    fn present(&self, notification: &Notification);
    fn dismiss(&self, attempt_id: AttemptId);
}

/// Presenter that only logs. Used when no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn present(&self, notification: &Notification) {
        info!(
            channel = %notification.channel,
            attempt.id = %notification.attempt_id,
            title = %notification.title,
            progress = ?notification.progress,
            "notification"
        );
    }

    fn dismiss(&self, attempt_id: AttemptId) {
        debug!(attempt.id = %attempt_id, "notification dismissed");
    }
}

/// Builds notifications from worker metadata and forwards them to a
/// [`Presenter`].
#[derive(Clone)]
pub struct NotificationAdapter {
    presenter: Arc<dyn Presenter>,
    actions: broadcast::Sender<NotificationAction>,
}

impl std::fmt::Debug for NotificationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAdapter").finish_non_exhaustive()
    }
}

impl Default for NotificationAdapter {
    fn default() -> Self {
        Self::new(Arc::new(TracingPresenter))
    }
}

impl NotificationAdapter {
    pub fn new(presenter: Arc<dyn Presenter>) -> Self {
        let (actions, _) = broadcast::channel(32);
        Self { presenter, actions }
    }

    /// Build the notification shown while an attempt runs headless.
    pub fn build(
        worker: &str,
        attempt_id: AttemptId,
        template: &NotificationTemplate,
    ) -> Notification {
        let title = if template.title.is_empty() {
            worker.to_string()
        } else {
            template.title.clone()
        };

        Notification {
            channel: worker.to_string(),
            attempt_id,
            title,
            text: template.text.clone(),
            actions: template.actions.clone(),
            progress: None,
            ongoing: true,
        }
    }

    pub fn attempt_started(
        &self,
        worker: &str,
        attempt_id: AttemptId,
        template: Option<&NotificationTemplate>,
    ) {
        if let Some(template) = template {
            self.presenter
                .present(&Self::build(worker, attempt_id, template));
        }
    }

    /// Update the progress shown for a running attempt.
    pub fn progress(
        &self,
        worker: &str,
        attempt_id: AttemptId,
        template: &NotificationTemplate,
        progress: Progress,
    ) {
        let mut notification = Self::build(worker, attempt_id, template);
        notification.progress = Some(progress);
        self.presenter.present(&notification);
    }

    pub fn attempt_finished(&self, attempt_id: AttemptId, result: &WorkResult) {
        debug!(attempt.id = %attempt_id, result = result.label(), "clearing attempt notification");
        self.presenter.dismiss(attempt_id);
    }

    /// Report that the user pressed `action` on an attempt's notification.
    ///
    /// Returns how many listeners received it.
    pub fn dispatch_action(&self, attempt_id: AttemptId, action: impl Into<String>) -> usize {
        let action = NotificationAction {
            attempt_id,
            action: action.into(),
        };
        debug!(attempt.id = %attempt_id, action = %action.action, "notification action");
        self.actions.send(action).unwrap_or(0)
    }

    pub fn subscribe_actions(&self) -> broadcast::Receiver<NotificationAction> {
        self.actions.subscribe()
    }
}
