use std::sync::Mutex;

use workbridge::presentation::{Notification, Presenter};
use workbridge::types::AttemptId;

/// One call made against the [`RecordingPresenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Presented { attempt_id: AttemptId, title: String },
    Dismissed(AttemptId),
}

/// A presenter that records what would have been shown.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn presented(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, PresenterEvent::Presented { .. }))
            .count()
    }

    pub fn dismissed(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, PresenterEvent::Dismissed(_)))
            .count()
    }

    pub fn was_dismissed(&self, id: AttemptId) -> bool {
        self.events().contains(&PresenterEvent::Dismissed(id))
    }

    /// Attempts presented at least once and not dismissed since.
    pub fn still_shown(&self) -> Vec<AttemptId> {
        let mut shown: Vec<AttemptId> = Vec::new();
        for event in self.events() {
            match event {
                PresenterEvent::Presented { attempt_id, .. } => {
                    if !shown.contains(&attempt_id) {
                        shown.push(attempt_id);
                    }
                }
                PresenterEvent::Dismissed(id) => shown.retain(|shown| *shown != id),
            }
        }
        shown
    }
}

impl Presenter for RecordingPresenter {
    fn present(&self, notification: &Notification) {
        self.events.lock().unwrap().push(PresenterEvent::Presented {
            attempt_id: notification.attempt_id,
            title: notification.title.clone(),
        });
    }

    fn dismiss(&self, attempt_id: AttemptId) {
        self.events
            .lock()
            .unwrap()
            .push(PresenterEvent::Dismissed(attempt_id));
    }
}
