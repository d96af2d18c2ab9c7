//! Debounced autosave of the working document.
//!
//! An [`AutosaveScheduler`] is created when an editing session starts and
//! destroyed when it ends. It owns one background task that:
//!
//! - coalesces [`AutosaveScheduler::schedule_save`] calls into a single save
//!   once the document has been quiet for the debounce window
//! - sends [`AutosaveScheduler::save_now`] requests immediately, unless a
//!   save is already in flight
//! - never has more than one save in flight; a request that arrives while a
//!   save is running waits for it and then sends the *latest* state
//! - reports `idle | saving | saved | error` through a callback
//!
//! A failed save keeps its state as pending; the next scheduled or manual
//! save (or a flush) sends whatever is newest. The in-memory document is
//! never touched by a failure.

use serde::Serialize;
use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::GraphSnapshot;
use crate::storage::{CanvasRepository, UpsertOutcome};
use crate::{Error, Result};

/// Quiet period before a scheduled save fires.
pub const DEFAULT_DEBOUNCE_MS: u64 = 3000;

/// Save progress as reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Error,
}

impl SaveStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaveStatus::Saved | SaveStatus::Error)
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStatus::Idle => write!(f, "idle"),
            SaveStatus::Saving => write!(f, "saving"),
            SaveStatus::Saved => write!(f, "saved"),
            SaveStatus::Error => write!(f, "error"),
        }
    }
}

/// Notified after every successful save.
pub trait SaveListener: Send + Sync {
    fn on_saved(&self, canvas_id: &str, snapshot: &GraphSnapshot);
}

/// Callback invoked on every status transition.
pub type StatusCallback = Arc<dyn Fn(SaveStatus) + Send + Sync>;

type SaveReply = oneshot::Sender<Result<UpsertOutcome>>;

enum Command {
    Schedule(GraphSnapshot),
    SaveNow(GraphSnapshot, Option<SaveReply>),
    SetCanvas(Option<String>),
    Flush(oneshot::Sender<SaveStatus>),
    Shutdown,
}

/// Outcome of one spawned store call.
struct SaveAttempt {
    canvas_id: Option<String>,
    snapshot: GraphSnapshot,
    result: Result<UpsertOutcome>,
}

/// Builder for [`AutosaveScheduler`].
pub struct AutosaveBuilder {
    repo: Arc<dyn CanvasRepository>,
    canvas_id: Option<String>,
    debounce: Duration,
    listener: Option<Arc<dyn SaveListener>>,
    on_status: Option<StatusCallback>,
}

impl AutosaveBuilder {
    pub fn canvas_id(mut self, canvas_id: Option<String>) -> Self {
        self.canvas_id = canvas_id;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn SaveListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn on_status_change(mut self, callback: StatusCallback) -> Self {
        self.on_status = Some(callback);
        self
    }

    /// Start the background task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> AutosaveScheduler {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);
        let canvas_tx = Arc::new(watch::channel(self.canvas_id.clone()).0);

        let worker = Worker {
            repo: self.repo,
            listener: self.listener,
            on_status: self.on_status,
            status_tx,
            canvas_tx: Arc::clone(&canvas_tx),
            debounce: self.debounce,
            canvas_id: self.canvas_id,
            latest: None,
            deadline: None,
            wanted: false,
            waiters: Vec::new(),
            in_flight_waiters: Vec::new(),
            flushers: Vec::new(),
        };
        let handle = tokio::spawn(worker.run(rx));

        AutosaveScheduler {
            tx,
            status_rx,
            canvas_tx,
            worker: Some(handle),
        }
    }
}

/// Handle to the autosave task of one editing session.
pub struct AutosaveScheduler {
    tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<SaveStatus>,
    canvas_tx: Arc<watch::Sender<Option<String>>>,
    worker: Option<JoinHandle<()>>,
}

impl AutosaveScheduler {
    pub fn builder(repo: Arc<dyn CanvasRepository>) -> AutosaveBuilder {
        AutosaveBuilder {
            repo,
            canvas_id: None,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            listener: None,
            on_status: None,
        }
    }

    /// Record the latest state and restart the debounce timer.
    pub fn schedule_save(&self, snapshot: GraphSnapshot) {
        if self.tx.send(Command::Schedule(snapshot)).is_err() {
            warn!("autosave task has stopped; scheduled save dropped");
        }
    }

    /// Send `snapshot` now (after any in-flight save) and wait for the
    /// save that carries it or a newer state.
    pub async fn save_now(&self, snapshot: GraphSnapshot) -> Result<UpsertOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::SaveNow(snapshot, Some(reply_tx)))
            .map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())?
    }

    /// Like [`save_now`](Self::save_now) without waiting for the result.
    pub fn request_save_now(&self, snapshot: GraphSnapshot) {
        if self.tx.send(Command::SaveNow(snapshot, None)).is_err() {
            warn!("autosave task has stopped; save request dropped");
        }
    }

    /// Rebind to another canvas. Pending saves for the old one are dropped.
    pub fn set_canvas_id(&self, canvas_id: Option<String>) {
        self.canvas_tx.send_replace(canvas_id.clone());
        if self.tx.send(Command::SetCanvas(canvas_id)).is_err() {
            warn!("autosave task has stopped; canvas rebind ignored");
        }
    }

    /// The canvas saves go to; set after the first save creates one.
    pub fn canvas_id(&self) -> Option<String> {
        self.canvas_tx.borrow().clone()
    }

    pub fn status(&self) -> SaveStatus {
        *self.status_rx.borrow()
    }

    /// Send any pending state immediately and wait until nothing is queued
    /// or in flight. Returns the status at that point.
    pub async fn flush(&self) -> SaveStatus {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Flush(tx)).is_err() {
            return self.status();
        }
        rx.await.unwrap_or_else(|_| self.status())
    }

    /// Cancel pending timers and stop the task, letting an in-flight save
    /// finish. Call exactly once when the editing session ends.
    pub async fn destroy(mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "autosave task ended abnormally");
            }
        }
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.tx.send(Command::Shutdown);
        }
    }
}

fn stopped() -> Error {
    Error::Persistence("autosave scheduler has stopped".to_string())
}

/// Copy an error for each caller waiting on the same save.
fn duplicate(e: &Error) -> Error {
    match e {
        Error::Auth => Error::Auth,
        Error::NotFound(m) => Error::NotFound(m.clone()),
        Error::Validation(m) => Error::Validation(m.clone()),
        Error::Permission(m) => Error::Permission(m.clone()),
        Error::Persistence(m) => Error::Persistence(m.clone()),
        other => Error::Persistence(other.to_string()),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn join_in_flight(
    slot: &mut Option<JoinHandle<SaveAttempt>>,
) -> std::result::Result<SaveAttempt, JoinError> {
    match slot.as_mut() {
        Some(handle) => handle.await,
        None => pending().await,
    }
}

struct Worker {
    repo: Arc<dyn CanvasRepository>,
    listener: Option<Arc<dyn SaveListener>>,
    on_status: Option<StatusCallback>,
    status_tx: watch::Sender<SaveStatus>,
    canvas_tx: Arc<watch::Sender<Option<String>>>,
    debounce: Duration,
    canvas_id: Option<String>,
    /// Newest state not yet handed to a save
    latest: Option<GraphSnapshot>,
    deadline: Option<Instant>,
    /// Send as soon as nothing is in flight
    wanted: bool,
    /// `save_now` callers whose state is still in `latest`
    waiters: Vec<SaveReply>,
    /// `save_now` callers whose state is in the running save
    in_flight_waiters: Vec<SaveReply>,
    flushers: Vec<oneshot::Sender<SaveStatus>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut in_flight: Option<JoinHandle<SaveAttempt>> = None;

        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = sleep_until_opt(deadline) => {
                    debug!("debounce window elapsed");
                    self.deadline = None;
                    self.wanted = true;
                }
                joined = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    self.complete(joined);
                }
            }

            if in_flight.is_none() {
                in_flight = self.dispatch();
            }
            self.release_flushers(in_flight.is_none());
        }

        // Timers die with the loop; a running save cannot be cancelled.
        self.deadline = None;
        self.wanted = false;
        if let Some(handle) = in_flight.take() {
            let joined = handle.await;
            self.complete(joined);
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(stopped()));
        }
        self.release_flushers(true);
        debug!("autosave task stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Schedule(snapshot) => {
                self.reset_terminal_status();
                self.latest = Some(snapshot);
                self.deadline = Some(Instant::now() + self.debounce);
            }
            Command::SaveNow(snapshot, reply) => {
                self.reset_terminal_status();
                self.latest = Some(snapshot);
                self.deadline = None;
                self.wanted = true;
                if let Some(reply) = reply {
                    self.waiters.push(reply);
                }
            }
            Command::SetCanvas(canvas_id) => {
                if canvas_id != self.canvas_id {
                    info!(
                        from = ?self.canvas_id,
                        to = ?canvas_id,
                        "autosave rebound to another canvas"
                    );
                    self.deadline = None;
                    self.latest = None;
                    self.wanted = false;
                    for waiter in self.waiters.drain(..) {
                        let _ = waiter.send(Err(Error::Persistence(
                            "save cancelled: canvas changed".to_string(),
                        )));
                    }
                    self.canvas_id = canvas_id;
                }
            }
            Command::Flush(tx) => {
                if self.latest.is_some() {
                    self.deadline = None;
                    self.wanted = true;
                }
                self.flushers.push(tx);
            }
            Command::Shutdown => {}
        }
    }

    /// Start a save of the latest state if one is wanted.
    fn dispatch(&mut self) -> Option<JoinHandle<SaveAttempt>> {
        if !self.wanted {
            return None;
        }
        self.wanted = false;
        let snapshot = self.latest.take()?;

        self.in_flight_waiters = std::mem::take(&mut self.waiters);
        self.set_status(SaveStatus::Saving);
        debug!(
            canvas_id = ?self.canvas_id,
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "dispatching save"
        );

        let repo = Arc::clone(&self.repo);
        let canvas_id = self.canvas_id.clone();
        Some(tokio::spawn(async move {
            let result = repo.upsert(canvas_id.as_deref(), &snapshot).await;
            SaveAttempt {
                canvas_id,
                snapshot,
                result,
            }
        }))
    }

    fn complete(&mut self, joined: std::result::Result<SaveAttempt, JoinError>) {
        let waiters = std::mem::take(&mut self.in_flight_waiters);

        let attempt = match joined {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!(error = %e, "save task failed to complete");
                self.set_status(SaveStatus::Error);
                for waiter in waiters {
                    let _ = waiter.send(Err(Error::Persistence(e.to_string())));
                }
                return;
            }
        };

        let same_canvas = attempt.canvas_id == self.canvas_id;
        match attempt.result {
            Ok(outcome) => {
                if same_canvas && self.canvas_id.is_none() {
                    self.canvas_id = Some(outcome.canvas_id.clone());
                    self.canvas_tx.send_replace(self.canvas_id.clone());
                }
                info!(canvas_id = %outcome.canvas_id, action = %outcome.action, "canvas saved");
                if let Some(listener) = &self.listener {
                    listener.on_saved(&outcome.canvas_id, &attempt.snapshot);
                }
                self.set_status(SaveStatus::Saved);
                for waiter in waiters {
                    let _ = waiter.send(Ok(outcome.clone()));
                }
            }
            Err(e) => {
                warn!(canvas_id = ?attempt.canvas_id, error = %e, "save failed");
                if same_canvas && self.latest.is_none() {
                    self.latest = Some(attempt.snapshot);
                }
                self.set_status(SaveStatus::Error);
                for waiter in waiters {
                    let _ = waiter.send(Err(duplicate(&e)));
                }
            }
        }
    }

    fn reset_terminal_status(&mut self) {
        if self.status_tx.borrow().is_terminal() {
            self.set_status(SaveStatus::Idle);
        }
    }

    fn set_status(&self, status: SaveStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            if let Some(callback) = &self.on_status {
                callback(status);
            }
        }
    }

    fn release_flushers(&mut self, idle: bool) {
        let quiet = idle && !self.wanted && self.deadline.is_none();
        if quiet && !self.flushers.is_empty() {
            let status = *self.status_tx.borrow();
            for tx in self.flushers.drain(..) {
                let _ = tx.send(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Node, NodeKind, PermissionLevel, Position, SaveSlot, SharePermission, SlotSummary,
    };
    use crate::permissions::Role;
    use crate::storage::{CanvasSummary, LoadedCanvas, UpsertAction};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Repository double that records upserts and can be slowed or failed.
    #[derive(Default)]
    struct RecordingRepo {
        calls: Mutex<Vec<(Option<String>, GraphSnapshot)>>,
        fail: AtomicBool,
        delay_ms: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl RecordingRepo {
        fn calls(&self) -> Vec<(Option<String>, GraphSnapshot)> {
            self.calls.lock().unwrap().clone()
        }

        fn node_counts(&self) -> Vec<usize> {
            self.calls().iter().map(|(_, s)| s.nodes.len()).collect()
        }
    }

    #[async_trait]
    impl CanvasRepository for RecordingRepo {
        async fn upsert(
            &self,
            canvas_id: Option<&str>,
            snapshot: &GraphSnapshot,
        ) -> Result<UpsertOutcome> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);

            let delay = self.delay_ms.load(Ordering::SeqCst) as u64;
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.calls
                .lock()
                .unwrap()
                .push((canvas_id.map(str::to_string), snapshot.clone()));
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Persistence("store unreachable".to_string()));
            }
            Ok(match canvas_id {
                Some(id) => UpsertOutcome {
                    canvas_id: id.to_string(),
                    action: UpsertAction::Updated,
                },
                None => UpsertOutcome {
                    canvas_id: "cv-new".to_string(),
                    action: UpsertAction::Created,
                },
            })
        }

        async fn load(&self, _canvas_id: Option<&str>) -> Result<LoadedCanvas> {
            Ok(LoadedCanvas::empty())
        }

        async fn role_for(&self, _canvas_id: &str) -> Result<Role> {
            Ok(Role::Owner)
        }

        async fn list_canvases(&self) -> Result<Vec<CanvasSummary>> {
            Ok(Vec::new())
        }

        async fn list_shares(&self, _canvas_id: &str) -> Result<Vec<SharePermission>> {
            Ok(Vec::new())
        }

        async fn add_or_update_share(
            &self,
            _canvas_id: &str,
            _email: &str,
            _level: PermissionLevel,
        ) -> Result<SharePermission> {
            Err(Error::Persistence("unsupported".to_string()))
        }

        async fn remove_share(&self, _canvas_id: &str, _email: &str) -> Result<()> {
            Ok(())
        }

        async fn save_slot(&self, _slot: &SaveSlot) -> Result<()> {
            Ok(())
        }

        async fn load_slot(&self, canvas_id: &str, slot_number: u32) -> Result<SaveSlot> {
            Err(Error::NotFound(format!("{} {}", canvas_id, slot_number)))
        }

        async fn list_slots(&self, _canvas_id: &str) -> Result<Vec<SlotSummary>> {
            Ok(Vec::new())
        }

        async fn delete_slot(&self, _canvas_id: &str, _slot_number: u32) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct SavedLog {
        saved: Mutex<Vec<(String, usize)>>,
    }

    impl SaveListener for SavedLog {
        fn on_saved(&self, canvas_id: &str, snapshot: &GraphSnapshot) {
            self.saved
                .lock()
                .unwrap()
                .push((canvas_id.to_string(), snapshot.nodes.len()));
        }
    }

    fn snapshot(n: usize) -> GraphSnapshot {
        GraphSnapshot {
            nodes: (0..n)
                .map(|i| Node::new(format!("n{}", i), NodeKind::TaskBlock, Position::default()))
                .collect(),
            edges: Vec::new(),
            title: None,
        }
    }

    fn scheduler(repo: &Arc<RecordingRepo>) -> AutosaveScheduler {
        AutosaveScheduler::builder(repo.clone())
            .canvas_id(Some("cv-1".to_string()))
            .spawn()
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_in_window_coalesce_into_one_save() {
        let repo = Arc::new(RecordingRepo::default());
        let autosave = scheduler(&repo);

        for n in 1..=5 {
            autosave.schedule_save(snapshot(n));
            wait(100).await;
        }
        wait(2800).await;
        assert!(repo.calls().is_empty(), "saved before the window elapsed");

        wait(300).await;
        assert_eq!(repo.node_counts(), vec![5]);

        wait(10_000).await;
        assert_eq!(repo.calls().len(), 1);
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_now_sends_latest_and_cancels_timer() {
        let repo = Arc::new(RecordingRepo::default());
        let autosave = scheduler(&repo);

        autosave.schedule_save(snapshot(1));
        let outcome = autosave.save_now(snapshot(2)).await.unwrap();
        assert_eq!(outcome.action, UpsertAction::Updated);
        assert_eq!(repo.node_counts(), vec![2]);

        wait(5000).await;
        assert_eq!(repo.calls().len(), 1);
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_during_flight_queue_with_latest_state() {
        let repo = Arc::new(RecordingRepo::default());
        repo.delay_ms.store(1000, Ordering::SeqCst);
        let autosave = scheduler(&repo);

        let (first, third) = tokio::join!(autosave.save_now(snapshot(1)), async {
            wait(10).await;
            autosave.schedule_save(snapshot(2));
            wait(10).await;
            autosave.save_now(snapshot(3)).await
        });

        assert!(first.is_ok());
        assert!(third.is_ok());
        assert_eq!(repo.node_counts(), vec![1, 3]);
        assert_eq!(repo.max_running.load(Ordering::SeqCst), 1);
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_firing_during_flight_waits_its_turn() {
        let repo = Arc::new(RecordingRepo::default());
        repo.delay_ms.store(5000, Ordering::SeqCst);
        let autosave = scheduler(&repo);

        autosave.request_save_now(snapshot(1));
        wait(10).await;
        autosave.schedule_save(snapshot(2));
        wait(100).await;
        autosave.schedule_save(snapshot(4));

        assert_eq!(autosave.flush().await, SaveStatus::Saved);
        assert_eq!(repo.node_counts(), vec![1, 4]);
        assert_eq!(repo.max_running.load(Ordering::SeqCst), 1);
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_next_save_carries_current_state() {
        let repo = Arc::new(RecordingRepo::default());
        repo.fail.store(true, Ordering::SeqCst);
        let autosave = scheduler(&repo);

        let err = autosave.save_now(snapshot(1)).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(autosave.status(), SaveStatus::Error);

        repo.fail.store(false, Ordering::SeqCst);
        autosave.schedule_save(snapshot(3));
        assert_eq!(autosave.status(), SaveStatus::Error);
        wait(3100).await;

        assert_eq!(repo.node_counts(), vec![1, 3]);
        assert_eq!(autosave.status(), SaveStatus::Saved);
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_retries_state_kept_after_failure() {
        let repo = Arc::new(RecordingRepo::default());
        repo.fail.store(true, Ordering::SeqCst);
        let autosave = scheduler(&repo);

        assert!(autosave.save_now(snapshot(2)).await.is_err());
        repo.fail.store(false, Ordering::SeqCst);

        assert_eq!(autosave.flush().await, SaveStatus::Saved);
        assert_eq!(repo.node_counts(), vec![2, 2]);

        // Nothing left to send
        assert_eq!(autosave.flush().await, SaveStatus::Saved);
        assert_eq!(repo.calls().len(), 2);
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_transitions_reported_by_callback() {
        let repo = Arc::new(RecordingRepo::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let autosave = AutosaveScheduler::builder(repo.clone())
            .canvas_id(Some("cv-1".to_string()))
            .on_status_change(Arc::new(move |status| sink.lock().unwrap().push(status)))
            .spawn();

        autosave.save_now(snapshot(1)).await.unwrap();
        autosave.schedule_save(snapshot(2));
        wait(3100).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SaveStatus::Saving,
                SaveStatus::Saved,
                SaveStatus::Idle,
                SaveStatus::Saving,
                SaveStatus::Saved,
            ]
        );
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebinding_drops_pending_save() {
        let repo = Arc::new(RecordingRepo::default());
        let autosave = scheduler(&repo);

        autosave.schedule_save(snapshot(1));
        wait(1000).await;
        autosave.set_canvas_id(Some("cv-2".to_string()));
        assert_eq!(autosave.canvas_id().as_deref(), Some("cv-2"));
        wait(10_000).await;
        assert!(repo.calls().is_empty());

        autosave.save_now(snapshot(2)).await.unwrap();
        assert_eq!(repo.calls()[0].0.as_deref(), Some("cv-2"));
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_save_adopts_created_canvas() {
        let repo = Arc::new(RecordingRepo::default());
        let autosave = AutosaveScheduler::builder(repo.clone()).spawn();
        assert!(autosave.canvas_id().is_none());

        let outcome = autosave.save_now(snapshot(1)).await.unwrap();
        assert_eq!(outcome.action, UpsertAction::Created);
        assert_eq!(autosave.canvas_id().as_deref(), Some("cv-new"));

        autosave.save_now(snapshot(2)).await.unwrap();
        assert_eq!(repo.calls()[1].0.as_deref(), Some("cv-new"));
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_sees_successful_saves_only() {
        let repo = Arc::new(RecordingRepo::default());
        let log = Arc::new(SavedLog::default());
        let autosave = AutosaveScheduler::builder(repo.clone())
            .canvas_id(Some("cv-1".to_string()))
            .listener(log.clone())
            .spawn();

        autosave.save_now(snapshot(1)).await.unwrap();
        repo.fail.store(true, Ordering::SeqCst);
        let _ = autosave.save_now(snapshot(2)).await;

        assert_eq!(*log.saved.lock().unwrap(), vec![("cv-1".to_string(), 1)]);
        autosave.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_cancels_pending_timer() {
        let repo = Arc::new(RecordingRepo::default());
        let autosave = scheduler(&repo);

        autosave.schedule_save(snapshot(1));
        autosave.destroy().await;
        wait(10_000).await;
        assert!(repo.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_lets_in_flight_save_finish() {
        let repo = Arc::new(RecordingRepo::default());
        repo.delay_ms.store(500, Ordering::SeqCst);
        let autosave = scheduler(&repo);

        autosave.request_save_now(snapshot(1));
        wait(10).await;
        autosave.destroy().await;
        assert_eq!(repo.node_counts(), vec![1]);
    }
}
