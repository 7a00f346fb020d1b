//! Debounced autosave state machine for remote persistence.
//!
//! The controller observes buffer mutations, coalesces bursts of keystrokes
//! into a single upsert request, and tracks a transient save status for the
//! UI (`idle -> saving -> {saved, error} -> idle`). Create-vs-update
//! semantics are resolved by pinning the backend-assigned project id after
//! the first successful save; the pin is set-once, so out-of-order responses
//! can never regress an update back into a duplicate create.
//!
//! Failures are logged and surfaced only through the status indicator; they
//! are never thrown to the edit path. There is no explicit retry or backoff:
//! the next edit starts the next debounce cycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::buffer::SourceBundle;
use crate::remote::{ProjectRepository, RemoteContext};

/// Transient, UI-facing save state. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    /// No save scheduled or displayed
    #[default]
    Idle,
    /// An upsert request is in flight
    Saving,
    /// The last save succeeded (displayed briefly)
    Saved,
    /// The last save failed (displayed briefly)
    Error,
}

/// Timing configuration for the autosave cycle
#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a save dispatches
    pub debounce: Duration,
    /// How long the `Saved` status stays visible
    pub saved_display: Duration,
    /// How long the `Error` status stays visible
    pub error_display: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            saved_display: Duration::from_millis(2000),
            error_display: Duration::from_millis(3000),
        }
    }
}

/// Provider of the current bundle, read at dispatch time rather than at
/// notify time so a coalesced save never persists stale content
pub type SnapshotFn = Arc<dyn Fn() -> SourceBundle + Send + Sync>;

/// Mutable controller state shared with spawned save tasks
struct SaveState {
    /// Bumped on every status write; display-clear timers compare against it
    /// so a stale timeout never clobbers a newer status.
    generation: u64,
    /// Backend-assigned project id, pinned set-once after the first
    /// successful save (or at mount when resuming a saved project)
    project_id: Option<String>,
}

struct Inner {
    context: Option<RemoteContext>,
    repository: Arc<dyn ProjectRepository>,
    snapshot: SnapshotFn,
    config: AutosaveConfig,
    state: Mutex<SaveState>,
    status_tx: watch::Sender<SaveStatus>,
}

impl Inner {
    /// Write a status, bumping the generation. Returns the new generation so
    /// a display-clear timer can detect staleness.
    ///
    /// The bump and the publish happen under one lock: a status visible to
    /// observers always belongs to the latest generation.
    fn set_status(&self, status: SaveStatus) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;
        // watch::send is non-blocking, safe to hold the lock across it.
        let _ = self.status_tx.send(status);
        generation
    }

    /// Reset to idle after `delay`, unless the status has changed since
    /// `generation` was issued.
    fn schedule_clear(self: Arc<Self>, generation: u64, delay: Duration) -> JoinHandle<()> {
        let inner = self;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = inner.state.lock();
            if state.generation != generation {
                return;
            }
            state.generation += 1;
            // Guard check and publish must be one atomic step, so the send
            // stays under the same lock as the generation compare.
            let _ = inner.status_tx.send(SaveStatus::Idle);
        })
    }

    /// Issue one upsert carrying the current snapshot and the pinned id
    async fn dispatch_save(self: Arc<Self>) {
        let context = match &self.context {
            Some(context) => context.clone(),
            None => return,
        };

        self.set_status(SaveStatus::Saving);
        let bundle = (self.snapshot)();
        let existing = self.state.lock().project_id.clone();

        match self
            .repository
            .save(&context, &bundle, existing.as_deref())
            .await
        {
            Ok(id) => {
                self.pin_project_id(id);
                let generation = self.set_status(SaveStatus::Saved);
                let delay = self.config.saved_display;
                let _ = Arc::clone(&self).schedule_clear(generation, delay);
            }
            Err(err) => {
                error!(error = %err, "autosave failed");
                let generation = self.set_status(SaveStatus::Error);
                let delay = self.config.error_display;
                let _ = Arc::clone(&self).schedule_clear(generation, delay);
            }
        }
    }

    fn pin_project_id(&self, id: String) {
        let mut state = self.state.lock();
        if state.project_id.is_none() {
            debug!(project_id = %id, "pinning remote project id");
            state.project_id = Some(id);
        }
    }
}

/// The autosave state machine.
///
/// At most one debounce timer is live at a time: every `notify` cancels the
/// pending timer and arms a fresh one. An already-dispatched request is never
/// cancelled, so two saves can briefly be in flight when a save is slow and
/// another debounce fires; both carry full up-to-date snapshots and the
/// upsert is idempotent, so this race is accepted rather than corrected.
pub struct AutosaveController {
    inner: Arc<Inner>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveController {
    /// Create a controller. A `None` context disables autosave entirely:
    /// every `notify` becomes a no-op and the status stays idle.
    ///
    /// `snapshot` is invoked at dispatch time to read the latest bundle.
    pub fn new(
        context: Option<RemoteContext>,
        repository: Arc<dyn ProjectRepository>,
        snapshot: SnapshotFn,
        config: AutosaveConfig,
    ) -> Self {
        let project_id = context.as_ref().and_then(|c| c.project_id.clone());
        let (status_tx, _) = watch::channel(SaveStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                context,
                repository,
                snapshot,
                config,
                state: Mutex::new(SaveState {
                    generation: 0,
                    project_id,
                }),
                status_tx,
            }),
            pending: Mutex::new(None),
        }
    }

    /// Record a local buffer mutation: cancel any pending timer and arm a new
    /// one for the debounce delay. Must be called from within the runtime.
    pub fn notify(&self) {
        if self.inner.context.is_none() {
            return;
        }

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let inner = Arc::clone(&self.inner);
        let debounce = inner.config.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Detach the save so cancelling a later timer never aborts an
            // in-flight request.
            tokio::spawn(inner.dispatch_save());
        }));
    }

    /// Pin the remote project id if none is pinned yet (set-once).
    ///
    /// Used at mount when a saved project is loaded before any save runs.
    pub fn pin_project_id(&self, id: String) {
        self.inner.pin_project_id(id);
    }

    /// The currently pinned remote project id, if any
    pub fn project_id(&self) -> Option<String> {
        self.inner.state.lock().project_id.clone()
    }

    /// Observe save status transitions
    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Cancel the pending debounce timer, if any. In-flight requests are
    /// abandoned, not cancelled.
    pub fn cancel(&self) {
        if let Some(timer) = self.pending.lock().take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::time::sleep;

    use crate::remote::{ProjectRecord, RemoteError, RemoteResult};

    /// Recording repository with configurable latency and failure
    struct MockRepository {
        calls: StdMutex<Vec<(SourceBundle, Option<String>)>>,
        assigned_id: String,
        latency: Duration,
        fail: std::sync::atomic::AtomicBool,
    }

    impl MockRepository {
        fn new(assigned_id: &str) -> Arc<Self> {
            Self::with_latency(assigned_id, Duration::ZERO)
        }

        fn with_latency(assigned_id: &str, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                assigned_id: assigned_id.to_string(),
                latency,
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn calls(&self) -> Vec<(SourceBundle, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProjectRepository for MockRepository {
        async fn load_by_id(
            &self,
            _context: &RemoteContext,
            id: &str,
        ) -> RemoteResult<ProjectRecord> {
            Err(RemoteError::NotFound(id.to_string()))
        }

        async fn load_latest_for_topic(
            &self,
            _context: &RemoteContext,
        ) -> RemoteResult<Option<ProjectRecord>> {
            Ok(None)
        }

        async fn save(
            &self,
            _context: &RemoteContext,
            bundle: &SourceBundle,
            existing_id: Option<&str>,
        ) -> RemoteResult<String> {
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            self.calls
                .lock()
                .unwrap()
                .push((bundle.clone(), existing_id.map(str::to_string)));
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(RemoteError::Malformed("boom".into()));
            }
            Ok(self.assigned_id.clone())
        }
    }

    fn context() -> RemoteContext {
        RemoteContext {
            api_base: "https://lms.example".to_string(),
            auth_token: "tok".to_string(),
            student_id: "s".to_string(),
            course_id: "c".to_string(),
            topic_id: "t".to_string(),
            topic_name: "T".to_string(),
            level_id: "l".to_string(),
            project_id: None,
            team_member_ids: Vec::new(),
            editor_url: String::new(),
        }
    }

    fn controller_with(
        repository: Arc<MockRepository>,
        bundle: Arc<parking_lot::Mutex<SourceBundle>>,
    ) -> AutosaveController {
        let snapshot: SnapshotFn = Arc::new(move || bundle.lock().clone());
        AutosaveController::new(
            Some(context()),
            repository,
            snapshot,
            AutosaveConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_coalesces_to_one_save() {
        let repository = MockRepository::new("p1");
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(Arc::clone(&repository), Arc::clone(&bundle));

        for text in ["<p>a</p>", "<p>ab</p>", "<p>abc</p>"] {
            bundle.lock().markup = text.to_string();
            controller.notify();
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_secs(3)).await;

        let calls = repository.calls();
        assert_eq!(calls.len(), 1);
        // The dispatched save carries the latest snapshot, not a captured one.
        assert_eq!(calls[0].0.markup, "<p>abc</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_apart_produce_two_saves() {
        let repository = MockRepository::new("p1");
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(Arc::clone(&repository), Arc::clone(&bundle));

        controller.notify();
        sleep(Duration::from_secs(2)).await;
        controller.notify();
        sleep(Duration::from_secs(2)).await;

        assert_eq!(repository.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_cancels_pending_timer() {
        let repository = MockRepository::new("p1");
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(Arc::clone(&repository), Arc::clone(&bundle));

        controller.notify();
        sleep(Duration::from_millis(1000)).await;
        controller.notify();
        // The first timer would have fired at 1500ms if it were still live.
        sleep(Duration::from_millis(1000)).await;
        assert!(repository.calls().is_empty());

        sleep(Duration::from_millis(600)).await;
        assert_eq!(repository.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_save_creates_then_updates_with_pinned_id() {
        let repository = MockRepository::new("p1");
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(Arc::clone(&repository), Arc::clone(&bundle));

        controller.notify();
        sleep(Duration::from_secs(2)).await;
        controller.notify();
        sleep(Duration::from_secs(2)).await;

        let calls = repository.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, None);
        assert_eq!(calls[1].1, Some("p1".to_string()));
        assert_eq!(controller.project_id(), Some("p1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_project_id_pin_is_set_once() {
        let repository = MockRepository::new("p2");
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(repository, bundle);

        controller.pin_project_id("p1".to_string());
        controller.pin_project_id("p9".to_string());
        assert_eq!(controller.project_id(), Some("p1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_cycle_on_success() {
        let repository = MockRepository::new("p1");
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(repository, bundle);
        let status = controller.status();

        assert_eq!(*status.borrow(), SaveStatus::Idle);
        controller.notify();
        sleep(Duration::from_millis(1600)).await;
        assert_eq!(*status.borrow(), SaveStatus::Saved);

        sleep(Duration::from_millis(2100)).await;
        assert_eq!(*status.borrow(), SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_cycle_on_failure_never_throws() {
        let repository = MockRepository::new("p1");
        repository.set_fail(true);
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(repository, bundle);
        let status = controller.status();

        controller.notify();
        sleep(Duration::from_millis(1600)).await;
        assert_eq!(*status.borrow(), SaveStatus::Error);

        sleep(Duration::from_millis(3100)).await;
        assert_eq!(*status.borrow(), SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_display_clear_does_not_clobber_newer_saving() {
        let repository = MockRepository::with_latency("p1", Duration::from_millis(1000));
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(repository, bundle);
        let status = controller.status();

        // t=0 edit; t=1500 dispatch; t=2500 saved; clear scheduled for t=4500.
        controller.notify();
        sleep(Duration::from_millis(2600)).await;
        assert_eq!(*status.borrow(), SaveStatus::Saved);

        // Second edit at t=2600; dispatch at t=4100, still saving when the
        // stale clear fires at t=4500.
        controller.notify();
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(*status.borrow(), SaveStatus::Saving);

        // Second save lands at t=5100, its own clear at t=7100.
        sleep(Duration::from_millis(500)).await;
        assert_eq!(*status.borrow(), SaveStatus::Saved);
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(*status.borrow(), SaveStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_status_publish_is_atomic_with_generation_guard() {
        let repository = MockRepository::new("p1");
        let snapshot: SnapshotFn = Arc::new(SourceBundle::default);
        let controller = AutosaveController::new(
            Some(context()),
            repository,
            snapshot,
            AutosaveConfig::default(),
        );
        let inner = Arc::clone(&controller.inner);
        let status = controller.status();

        // Race a due display-clear against a newer `Saving` write. Whichever
        // order they run in, the clear either loses its guard check or
        // publishes strictly before the newer status, so `Saving` is what
        // stays displayed; an `Idle` here means a stale clear clobbered an
        // in-flight save.
        for _ in 0..200 {
            let generation = inner.set_status(SaveStatus::Saved);
            let clear = Arc::clone(&inner).schedule_clear(generation, Duration::ZERO);
            let saving = {
                let inner = Arc::clone(&inner);
                tokio::spawn(async move { inner.set_status(SaveStatus::Saving) })
            };
            clear.await.unwrap();
            saving.await.unwrap();

            assert_eq!(*status.borrow(), SaveStatus::Saving);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_without_context_is_a_no_op() {
        let repository = MockRepository::new("p1");
        let snapshot: SnapshotFn = Arc::new(SourceBundle::default);
        let controller = AutosaveController::new(
            None,
            Arc::clone(&repository) as Arc<dyn ProjectRepository>,
            snapshot,
            AutosaveConfig::default(),
        );

        controller.notify();
        sleep(Duration::from_secs(5)).await;

        assert!(repository.calls().is_empty());
        assert_eq!(*controller.status().borrow(), SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_timer() {
        let repository = MockRepository::new("p1");
        let bundle = Arc::new(parking_lot::Mutex::new(SourceBundle::default()));
        let controller = controller_with(Arc::clone(&repository), bundle);

        controller.notify();
        controller.cancel();
        sleep(Duration::from_secs(5)).await;

        assert!(repository.calls().is_empty());
    }
}
