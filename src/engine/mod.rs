//! Composition root wiring buffers, preview, autosave and broadcast together.
//!
//! Data flow for a local edit:
//! `edit -> BufferStore.replace` which synchronously re-renders the preview,
//! publishes a full-bundle broadcast (local/broadcast mode, fire-and-forget)
//! and notifies the debounced autosave (remote mode). Inbound events (remote
//! load at mount, broadcast messages from other sessions) apply with a remote
//! origin, which re-renders the preview but never re-publishes or re-saves,
//! preventing echo loops.
//!
//! The two collaboration modes are mutually exclusive per session: a remote
//! context enables LMS autosave and disables the broadcast channel, its
//! absence does the opposite.
//!
//! All buffer mutations are funneled through the engine, so the store needs
//! no locking discipline beyond its mutex: local edits, the mount-load
//! completion and the broadcast receive task are the only writers.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autosave::{AutosaveConfig, AutosaveController, SaveStatus, SnapshotFn};
use crate::broadcast::{BroadcastChannel, SessionId, TextUpdate};
use crate::buffer::{BufferField, BufferStore, EditOrigin, SourceBundle};
use crate::launch::LaunchParams;
use crate::preview::{self, ExportFile, PreviewDocument};
use crate::remote::{ProjectRepository, RemoteContext};

/// The edit-sync-persist engine for one editing session
pub struct SyncEngine {
    session: SessionId,
    context: Option<RemoteContext>,
    store: Arc<Mutex<BufferStore>>,
    repository: Arc<dyn ProjectRepository>,
    /// Present only in local/broadcast mode
    channel: Option<Arc<dyn BroadcastChannel>>,
    autosave: Arc<AutosaveController>,
    preview_tx: Arc<watch::Sender<PreviewDocument>>,
    ready_tx: watch::Sender<bool>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Wire up an engine. A present `context` selects remote (LMS-backed)
    /// mode; otherwise the session is local with realtime broadcast.
    ///
    /// Must be constructed within a tokio runtime.
    pub fn new(
        context: Option<RemoteContext>,
        repository: Arc<dyn ProjectRepository>,
        channel: Arc<dyn BroadcastChannel>,
        config: AutosaveConfig,
    ) -> Self {
        let session = SessionId::generate();
        let store = Arc::new(Mutex::new(BufferStore::new()));

        let snapshot_store = Arc::clone(&store);
        let snapshot: SnapshotFn = Arc::new(move || snapshot_store.lock().snapshot());
        let autosave = Arc::new(AutosaveController::new(
            context.clone(),
            Arc::clone(&repository),
            snapshot,
            config,
        ));

        let (preview_tx, _) = watch::channel(preview::render(&SourceBundle::default()));
        let preview_tx = Arc::new(preview_tx);
        let (ready_tx, _) = watch::channel(false);

        let channel = if context.is_none() { Some(channel) } else { None };

        {
            let mut store = store.lock();

            // Preview re-renders on every mutation, local or remote.
            let render_tx = Arc::clone(&preview_tx);
            store.subscribe(move |bundle, _origin| {
                let _ = render_tx.send(preview::render(bundle));
            });

            // Broadcast publish and autosave notify fire on local edits only;
            // remote-applied bundles must not echo back out.
            if let Some(channel) = &channel {
                let publish_channel = Arc::clone(channel);
                let publish_session = session.clone();
                store.subscribe(move |bundle, origin| {
                    if origin == EditOrigin::Local {
                        publish_channel.publish(TextUpdate::new(&publish_session, bundle));
                    }
                });
            }
            if context.is_some() {
                let notify = Arc::clone(&autosave);
                store.subscribe(move |_bundle, origin| {
                    if origin == EditOrigin::Local {
                        notify.notify();
                    }
                });
            }
        }

        Self {
            session,
            context,
            store,
            repository,
            channel,
            autosave,
            preview_tx,
            ready_tx,
            receive_task: Mutex::new(None),
        }
    }

    /// Build an engine from parsed launch parameters
    pub fn from_launch(
        params: &LaunchParams,
        repository: Arc<dyn ProjectRepository>,
        channel: Arc<dyn BroadcastChannel>,
        config: AutosaveConfig,
    ) -> Self {
        Self::new(params.remote_context(), repository, channel, config)
    }

    /// Mount the session: load the saved project in remote mode, or start the
    /// broadcast receive loop in local mode. Flips `ready` when done.
    ///
    /// A load failure is logged and leaves the buffers empty; it never blocks
    /// the editor.
    pub async fn start(&self) {
        match self.context.clone() {
            Some(context) => self.load_remote(&context).await,
            None => self.spawn_receive_loop(),
        }
        let _ = self.ready_tx.send(true);
    }

    async fn load_remote(&self, context: &RemoteContext) {
        let loaded = match &context.project_id {
            Some(id) => self.repository.load_by_id(context, id).await.map(Some),
            None => self.repository.load_latest_for_topic(context).await,
        };

        match loaded {
            Ok(Some(record)) => {
                if let Some(bundle) = record.bundle() {
                    info!(project_id = %record.id, "resuming saved project");
                    self.autosave.pin_project_id(record.id.clone());
                    self.store.lock().load(bundle, EditOrigin::Remote);
                }
            }
            Ok(None) => debug!("no saved project for topic, starting empty"),
            Err(err) => warn!(error = %err, "failed to load saved project, starting empty"),
        }
    }

    fn spawn_receive_loop(&self) {
        let channel = match &self.channel {
            Some(channel) => Arc::clone(channel),
            None => return,
        };
        let store = Arc::clone(&self.store);
        let session = self.session.clone();

        // Subscribe before spawning so no update published after mount can
        // slip past the receive loop.
        let mut updates = channel.subscribe();
        let task = tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                if update.id == session {
                    continue;
                }
                store.lock().load(update.into_bundle(), EditOrigin::Remote);
            }
        });
        *self.receive_task.lock() = Some(task);
    }

    /// Apply a user-driven edit to one buffer
    pub fn edit(&self, field: BufferField, value: impl Into<String>) {
        self.store.lock().replace(field, value, EditOrigin::Local);
    }

    /// Apply an externally sourced full-bundle snapshot (never re-published
    /// or re-saved)
    pub fn apply_remote(&self, bundle: SourceBundle) {
        self.store.lock().load(bundle, EditOrigin::Remote);
    }

    /// A snapshot of the current buffers
    pub fn snapshot(&self) -> SourceBundle {
        self.store.lock().snapshot()
    }

    /// Observe the always-current sandboxed preview document
    pub fn preview(&self) -> watch::Receiver<PreviewDocument> {
        self.preview_tx.subscribe()
    }

    /// Observe autosave status transitions (stays idle in local mode)
    pub fn save_status(&self) -> watch::Receiver<SaveStatus> {
        self.autosave.status()
    }

    /// Observe mount completion
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// The remote project id pinned for this session, if any
    pub fn project_id(&self) -> Option<String> {
        self.autosave.project_id()
    }

    /// This session's broadcast identity
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Whether the session persists to the remote backend
    pub fn is_remote(&self) -> bool {
        self.context.is_some()
    }

    /// Standalone HTML export of the current content
    pub fn export(&self) -> ExportFile {
        preview::export_document(&self.snapshot())
    }

    /// Tear down the session: cancel the pending save timer and stop the
    /// broadcast receive loop. In-flight saves are abandoned, not cancelled.
    pub fn shutdown(&self) {
        self.autosave.cancel();
        if let Some(task) = self.receive_task.lock().take() {
            task.abort();
        }
    }
}
