// ABOUTME: Task host tests - serial execution, queueing, busy refusal, failure and panic recovery

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use gitgroup::app::{GroupError, GroupResult, NotificationLog, Popup};

use super::fixtures::host;

type Journal = Arc<Mutex<Vec<String>>>;

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Records start/end in the journal; optionally signals when started and waits to be released.
struct Step {
    name: &'static str,
    journal: Journal,
    started: Option<oneshot::Sender<()>>,
    release: Option<oneshot::Receiver<()>>,
    outcome: fn() -> GroupResult<bool>,
}

impl Step {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: Arc::clone(journal),
            started: None,
            release: None,
            outcome: || Ok(true),
        }
    }

    /// A step that blocks until the returned sender fires; `started` fires when it begins.
    fn held(name: &'static str, journal: &Journal) -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let step = Self {
            started: Some(started_tx),
            release: Some(release_rx),
            ..Self::new(name, journal)
        };
        (step, started_rx, release_tx)
    }

    fn failing(name: &'static str, journal: &Journal) -> Self {
        Self {
            outcome: || Err(GroupError::validation("/ws/app", "boom")),
            ..Self::new(name, journal)
        }
    }
}

#[async_trait]
impl Popup for Step {
    fn title(&self) -> String {
        self.name.to_string()
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        self.journal.lock().unwrap().push(format!("start {}", self.name));
        if let Some(started) = self.started.take() {
            let _ = started.send(());
        }
        if let Some(release) = self.release.take() {
            let _ = release.await;
        }
        self.journal.lock().unwrap().push(format!("end {}", self.name));
        (self.outcome)()
    }
}

struct Panics;

#[async_trait]
impl Popup for Panics {
    fn title(&self) -> String {
        "panics".to_string()
    }

    async fn sure(&mut self) -> GroupResult<bool> {
        panic!("popup body exploded");
    }
}

#[tokio::test]
async fn test_popups_started_while_busy_run_after_the_current_one() {
    let log = NotificationLog::new();
    let host = host(&log);
    let journal: Journal = Arc::default();

    let (first, started, release) = Step::held("first", &journal);
    let runner = {
        let host = host.clone();
        tokio::spawn(async move { host.show_and_start_popup(Box::new(first)).await })
    };
    started.await.unwrap();

    assert!(host.is_in_progress());
    assert!(!host.can_create_popup());
    assert_eq!(host.popup_title().as_deref(), Some("first"));

    // Returns immediately: the popup is queued behind the running one.
    host.show_and_start_popup(Box::new(Step::new("second", &journal))).await;
    host.show_and_start_popup(Box::new(Step::new("third", &journal))).await;
    assert_eq!(host.queued(), 2);
    assert_eq!(entries(&journal), vec!["start first"]);

    release.send(()).unwrap();
    runner.await.unwrap();

    assert_eq!(
        entries(&journal),
        vec!["start first", "end first", "start second", "end second", "start third", "end third"]
    );
    assert!(!host.is_in_progress());
    assert!(!host.has_popup());
    assert_eq!(host.queued(), 0);
}

#[tokio::test]
async fn test_show_popup_is_refused_while_in_progress() {
    let log = NotificationLog::new();
    let host = host(&log);
    let journal: Journal = Arc::default();

    let (held, started, release) = Step::held("held", &journal);
    let runner = {
        let host = host.clone();
        tokio::spawn(async move { host.show_and_start_popup(Box::new(held)).await })
    };
    started.await.unwrap();

    assert!(!host.show_popup(Box::new(Step::new("confirm", &journal))));
    assert!(!host.cancel_popup());
    assert_eq!(host.popup_title().as_deref(), Some("held"));

    release.send(()).unwrap();
    runner.await.unwrap();

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, "confirm");
    assert!(errors[0].message.contains("in progress"), "unexpected message: {}", errors[0].message);
    assert_eq!(entries(&journal), vec!["start held", "end held"]);
}

#[tokio::test]
async fn test_installed_popup_waits_for_process_popup() {
    let log = NotificationLog::new();
    let host = host(&log);
    let journal: Journal = Arc::default();

    assert!(host.show_popup(Box::new(Step::new("discard", &journal))));
    assert!(host.has_popup());
    assert!(entries(&journal).is_empty());

    // A start request queues behind the installed popup instead of replacing it.
    host.show_and_start_popup(Box::new(Step::new("fetch", &journal))).await;
    assert_eq!(host.queued(), 1);

    assert!(host.process_popup().await);
    assert_eq!(entries(&journal), vec!["start discard", "end discard", "start fetch", "end fetch"]);
    assert!(!host.has_popup());
}

#[tokio::test]
async fn test_failures_and_panics_are_reported_and_the_queue_keeps_draining() {
    let log = NotificationLog::new();
    let host = host(&log);
    let journal: Journal = Arc::default();

    assert!(host.show_popup(Box::new(Step::failing("fails", &journal))));
    host.show_and_start_popup(Box::new(Panics)).await;
    host.show_and_start_popup(Box::new(Step::new("after", &journal))).await;

    assert!(host.process_popup().await);

    assert_eq!(entries(&journal), vec!["start fails", "end fails", "start after", "end after"]);
    assert!(!host.is_in_progress());
    let scopes: Vec<String> = log.errors().into_iter().map(|n| n.scope).collect();
    assert_eq!(scopes, vec!["/ws/app".to_string(), "panics".to_string()]);
}

#[tokio::test]
async fn test_cancel_drops_installed_popup_and_queue() {
    let log = NotificationLog::new();
    let host = host(&log);
    let journal: Journal = Arc::default();

    host.show_popup(Box::new(Step::new("one", &journal)));
    host.show_and_start_popup(Box::new(Step::new("two", &journal))).await;

    assert!(host.cancel_popup());
    assert!(!host.has_popup());
    assert_eq!(host.queued(), 0);
    assert!(!host.process_popup().await);
    assert!(entries(&journal).is_empty());
}
