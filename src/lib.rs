//! Playground Engine - Edit-Sync-Persist core for a multi-buffer web playground
//!
//! Three editable source buffers (markup, styles, script) are combined into a
//! sandboxed live preview, optionally persisted to a remote course-management
//! backend with a debounced autosave, and optionally mirrored in real time to
//! other sessions over a broadcast transport. The crate provides:
//! - A single source of truth for buffer state with origin-tagged notifications
//! - A pure, sandboxed preview document renderer
//! - A debounced autosave state machine with create-vs-update upsert semantics
//! - A transport-only broadcast channel with session-based echo filtering
//! - A composition root wiring all of the above together
//!
//! The editor widgets, split-pane layout, and page shell are external
//! collaborators: the engine exposes interfaces and observable state only.

pub mod autosave;
pub mod broadcast;
pub mod buffer;
pub mod engine;
pub mod launch;
pub mod preview;
pub mod remote;

pub use autosave::{AutosaveConfig, AutosaveController, SaveStatus};
pub use broadcast::{BroadcastChannel, LocalBroadcast, SessionId, TextUpdate};
pub use buffer::{BufferField, BufferStore, EditOrigin, SourceBundle};
pub use engine::SyncEngine;
pub use launch::LaunchParams;
pub use preview::{render, ExportFile, PreviewDocument};
pub use remote::{LmsClient, ProjectRecord, ProjectRepository, RemoteContext, RemoteError};
