//! Buffer state management for the three playground source buffers.
//!
//! The [`BufferStore`] is the single source of truth for "current content".
//! Every other component receives read-only snapshots through synchronous
//! subscriber notifications tagged with the origin of the edit, so that
//! downstream consumers can avoid feedback loops (a remote-applied edit must
//! never be re-broadcast or re-saved).

use serde::{Deserialize, Serialize};

/// One of the three editable source buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferField {
    /// HTML body content
    Markup,
    /// CSS stylesheet
    Style,
    /// Executable script
    Script,
}

/// Where a buffer mutation came from.
///
/// Subscribers use this to break feedback loops: edits applied from a network
/// load or an inbound broadcast message are tagged [`EditOrigin::Remote`] and
/// must not trigger another publish or autosave cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// A user-driven edit from the local session
    Local,
    /// An edit applied from a remote load or broadcast message
    Remote,
}

/// The canonical edit state: one project's full content.
///
/// Absent buffers are represented as empty strings, never as missing fields,
/// so a bundle is never partially invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBundle {
    /// HTML markup rendered as body content
    pub markup: String,
    /// CSS embedded inline in the preview head
    pub style: String,
    /// Script executed in the preview's own global scope
    pub script: String,
}

impl SourceBundle {
    /// Create a bundle from the three buffer values
    pub fn new(
        markup: impl Into<String>,
        style: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            markup: markup.into(),
            style: style.into(),
            script: script.into(),
        }
    }

    /// Read one buffer by field
    pub fn get(&self, field: BufferField) -> &str {
        match field {
            BufferField::Markup => &self.markup,
            BufferField::Style => &self.style,
            BufferField::Script => &self.script,
        }
    }

    /// Replace one buffer by field
    pub fn set(&mut self, field: BufferField, value: impl Into<String>) {
        let slot = match field {
            BufferField::Markup => &mut self.markup,
            BufferField::Style => &mut self.style,
            BufferField::Script => &mut self.script,
        };
        *slot = value.into();
    }

    /// Whether all three buffers are empty
    pub fn is_empty(&self) -> bool {
        self.markup.is_empty() && self.style.is_empty() && self.script.is_empty()
    }
}

/// Subscriber callback invoked synchronously on every mutation
type Subscriber = Box<dyn FnMut(&SourceBundle, EditOrigin) + Send>;

/// Holds the three source buffers and notifies subscribers on every mutation.
///
/// `replace` is total: any string input is accepted unmodified, including
/// malformed markup. Notification is synchronous and strictly ordered, so a
/// subscriber always observes the bundle as of the mutation that triggered it.
#[derive(Default)]
pub struct BufferStore {
    bundle: SourceBundle,
    subscribers: Vec<Subscriber>,
}

impl BufferStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a bundle (no notification is fired)
    pub fn with_bundle(bundle: SourceBundle) -> Self {
        Self {
            bundle,
            subscribers: Vec::new(),
        }
    }

    /// Register a subscriber invoked on every subsequent mutation
    pub fn subscribe(&mut self, subscriber: impl FnMut(&SourceBundle, EditOrigin) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Replace a single buffer and notify all subscribers
    pub fn replace(&mut self, field: BufferField, value: impl Into<String>, origin: EditOrigin) {
        self.bundle.set(field, value);
        self.notify(origin);
    }

    /// Replace all three buffers at once and notify subscribers a single time.
    ///
    /// Used for inbound full-bundle snapshots (remote load, broadcast message).
    pub fn load(&mut self, bundle: SourceBundle, origin: EditOrigin) {
        self.bundle = bundle;
        self.notify(origin);
    }

    /// A read-only snapshot of the current bundle
    pub fn snapshot(&self) -> SourceBundle {
        self.bundle.clone()
    }

    fn notify(&mut self, origin: EditOrigin) {
        for subscriber in &mut self.subscribers {
            subscriber(&self.bundle, origin);
        }
    }
}
