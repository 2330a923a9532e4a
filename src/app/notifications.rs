// ABOUTME: User-visible reporting of group operation outcomes

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info};

use super::GroupError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Repository path or node id the message is about
    pub scope: String,
    pub message: String,
    pub is_error: bool,
}

/// Sink for messages the display layer shows to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn report(&self, err: &GroupError) {
        self.notify(Notification {
            scope: err.scope().to_string(),
            message: err.to_string(),
            is_error: true,
        });
    }

    fn info(&self, scope: &str, message: &str) {
        self.notify(Notification {
            scope: scope.to_string(),
            message: message.to_string(),
            is_error: false,
        });
    }
}

/// Logs every notification and nothing else.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        if notification.is_error {
            error!(scope = %notification.scope, "{}", notification.message);
        } else {
            info!(scope = %notification.scope, "{}", notification.message);
        }
    }
}

/// Keeps every notification in order, for front-ends that render them after the fact.
#[derive(Debug, Default, Clone)]
pub struct NotificationLog {
    entries: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.entries().into_iter().filter(|n| n.is_error).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|n| n.is_error)
    }

    /// Remove and return everything collected so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        TracingNotifier.notify(notification.clone());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
