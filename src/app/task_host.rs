// ABOUTME: Sequential task host - one installed popup, a pending queue, and an in-progress gate
// Long-running group operations are pushed through here so they never interleave

use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

use super::{GroupError, GroupResult, Notifier};

/// A unit of user-confirmed, possibly long-running work.
#[async_trait]
pub trait Popup: Send {
    fn title(&self) -> String;

    /// Whether the popup can run right now. A failing check leaves it installed.
    fn check(&self) -> bool {
        true
    }

    /// Run the body. `Ok(true)` means finished; `Ok(false)` keeps the popup installed.
    async fn sure(&mut self) -> GroupResult<bool>;
}

#[derive(Default)]
struct Slot {
    title: Option<String>,
    body: Option<Box<dyn Popup>>,
    in_progress: bool,
    queue: VecDeque<Box<dyn Popup>>,
}

impl Slot {
    fn install(&mut self, popup: Box<dyn Popup>) {
        self.title = Some(popup.title());
        self.body = Some(popup);
    }

    fn clear(&mut self) {
        self.title = None;
        self.body = None;
    }

    fn is_active(&self) -> bool {
        self.in_progress || self.body.is_some()
    }
}

/// Explicit host handle; clones share the same slot and queue.
#[derive(Clone)]
pub struct TaskHost {
    name: String,
    slot: Arc<Mutex<Slot>>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for TaskHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHost")
            .field("name", &self.name)
            .field("in_progress", &self.is_in_progress())
            .field("queued", &self.queued())
            .finish()
    }
}

impl TaskHost {
    pub fn new(name: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            name: name.into(),
            slot: Arc::new(Mutex::new(Slot::default())),
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True iff nothing is currently running.
    pub fn can_create_popup(&self) -> bool {
        !self.slot().in_progress
    }

    pub fn is_in_progress(&self) -> bool {
        self.slot().in_progress
    }

    /// Title of the installed popup, kept while its body runs.
    pub fn popup_title(&self) -> Option<String> {
        self.slot().title.clone()
    }

    pub fn has_popup(&self) -> bool {
        self.slot().title.is_some()
    }

    pub fn queued(&self) -> usize {
        self.slot().queue.len()
    }

    /// Install `popup` without starting it, dropping anything queued.
    /// Refused while another popup is running.
    pub fn show_popup(&self, popup: Box<dyn Popup>) -> bool {
        let mut slot = self.slot();
        if slot.in_progress {
            drop(slot);
            self.notifier.report(&GroupError::Busy {
                scope: popup.title(),
            });
            return false;
        }
        debug!("[{}] Showing popup '{}'", self.name, popup.title());
        slot.queue.clear();
        slot.install(popup);
        true
    }

    /// Run `popup` now, or after everything already installed or queued.
    pub async fn show_and_start_popup(&self, popup: Box<dyn Popup>) {
        {
            let mut slot = self.slot();
            if slot.is_active() {
                debug!("[{}] Queueing popup '{}' ({} ahead)", self.name, popup.title(), slot.queue.len() + 1);
                slot.queue.push_back(popup);
                return;
            }
            slot.install(popup);
        }
        self.process_popup().await;
    }

    /// Run the installed popup, then every queued one in order.
    /// Returns false if nothing ran because the slot was empty, busy, or the check failed.
    pub async fn process_popup(&self) -> bool {
        let mut ran = false;
        loop {
            let (mut body, title) = {
                let mut slot = self.slot();
                if slot.in_progress {
                    return ran;
                }
                let Some(body) = slot.body.take() else {
                    return ran;
                };
                if !body.check() {
                    debug!("[{}] Popup '{}' check failed", self.name, body.title());
                    slot.body = Some(body);
                    return ran;
                }
                slot.in_progress = true;
                let title = slot.title.clone().unwrap_or_default();
                (body, title)
            };

            info!("[{}] Starting '{}'", self.name, title);
            let outcome = AssertUnwindSafe(body.sure()).catch_unwind().await;
            ran = true;

            let mut slot = self.slot();
            slot.in_progress = false;
            let finished = match outcome {
                Ok(Ok(true)) => {
                    info!("[{}] Finished '{}'", self.name, title);
                    true
                }
                Ok(Ok(false)) => {
                    debug!("[{}] '{}' is not finished, keeping it installed", self.name, title);
                    false
                }
                Ok(Err(e)) => {
                    error!("[{}] '{}' failed: {}", self.name, title, e);
                    drop(slot);
                    self.notifier.report(&e);
                    slot = self.slot();
                    true
                }
                Err(_) => {
                    error!("[{}] '{}' panicked", self.name, title);
                    drop(slot);
                    self.notifier.report(&GroupError::validation(title.clone(), format!("{title} panicked")));
                    slot = self.slot();
                    true
                }
            };

            if !finished {
                slot.body = Some(body);
                return ran;
            }

            drop(body);
            match slot.queue.pop_front() {
                Some(next) => slot.install(next),
                None => {
                    slot.clear();
                    return ran;
                }
            }
        }
    }

    /// Drop the installed popup and the queue. No-op while a popup is running.
    pub fn cancel_popup(&self) -> bool {
        let mut slot = self.slot();
        if slot.in_progress {
            debug!("[{}] Cancel ignored, popup in progress", self.name);
            return false;
        }
        slot.clear();
        slot.queue.clear();
        true
    }
}
