// SPDX-License-Identifier: GPL-3.0-only

//! Panel state aggregate and its change notifications.
//!
//! [`PanelState`] is the single source of truth for everything the engine
//! told the panel: lookup table, auxiliary text, visibility flags, caret
//! rectangle and the property registry. Presentation and tray code only
//! read it, through the [`PanelModel`] passed to every listener.
//!
//! # Notifications
//!
//! Listeners are plain closures called synchronously, in registration order,
//! before the mutating call returns. Scalar setters skip the notification
//! when the value did not change; `set_lookup_table` and `set_caret_rect`
//! always notify since every such call from the engine is meaningful.
//!
//! Listeners must not mutate the state they are notified about.

use crate::property::{Property, PropertyRegistry, RegistryChange, decode_many};

// ============================================================================
// Data Types
// ============================================================================

/// The caret rectangle as reported by the engine.
///
/// Coordinates are in the reporting peer's space, which may be physical or
/// logical pixels depending on the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaretRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl CaretRect {
    /// Creates a caret rectangle.
    #[must_use]
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// The all-zero rectangle means no caret information has arrived yet.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.x == 0 && self.y == 0 && self.w <= 0 && self.h <= 0
    }
}

/// Snapshot of the candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    /// Selection labels ("1.", "a", ...).
    pub labels: Vec<String>,
    /// Candidate texts; authoritative for the candidate count.
    pub texts: Vec<String>,
    /// Per-candidate comments.
    pub comments: Vec<String>,
    /// Whether a previous page exists.
    pub has_prev: bool,
    /// Whether a next page exists.
    pub has_next: bool,
    /// Highlighted candidate, `-1` for none.
    pub cursor: i32,
    /// Layout hint from the engine, passed through untouched.
    pub layout: i32,
}

impl Default for LookupTable {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            texts: Vec::new(),
            comments: Vec::new(),
            has_prev: false,
            has_next: false,
            cursor: -1,
            layout: 0,
        }
    }
}

/// One row of the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub label: &'a str,
    pub text: &'a str,
    pub comment: &'a str,
    pub selected: bool,
}

impl LookupTable {
    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether the table has no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// The highlighted index, if the cursor points at an existing candidate.
    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        usize::try_from(self.cursor)
            .ok()
            .filter(|index| *index < self.texts.len())
    }

    /// Iterates the candidates; missing labels or comments read as empty.
    pub fn candidates(&self) -> impl Iterator<Item = Candidate<'_>> {
        let selected = self.selected();
        self.texts.iter().enumerate().map(move |(i, text)| Candidate {
            label: self.labels.get(i).map_or("", String::as_str),
            text: text.as_str(),
            comment: self.comments.get(i).map_or("", String::as_str),
            selected: selected == Some(i),
        })
    }
}

/// Auxiliary text shown above the candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxState {
    pub text: String,
    pub visible: bool,
}

// ============================================================================
// Model
// ============================================================================

/// Everything the engine has told the panel so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelModel {
    pub caret: CaretRect,
    pub lookup: LookupTable,
    pub lookup_visible: bool,
    pub aux: AuxState,
    pub enabled: bool,
    pub properties: PropertyRegistry,
}

impl PanelModel {
    /// Whether the lookup table part has something to show.
    #[must_use]
    pub fn lookup_has_content(&self) -> bool {
        self.lookup_visible && !self.lookup.is_empty()
    }

    /// Whether the aux part has something to show.
    #[must_use]
    pub fn aux_has_content(&self) -> bool {
        self.aux.visible && !self.aux.text.trim().is_empty()
    }

    /// Derived panel visibility.
    #[must_use]
    pub fn should_show(&self) -> bool {
        self.enabled && (self.lookup_has_content() || self.aux_has_content())
    }

    /// Looks up a registered property.
    #[must_use]
    pub fn property_for_key(&self, key: &str) -> Option<&Property> {
        self.properties.find(key)
    }
}

// ============================================================================
// Events & Listeners
// ============================================================================

/// A change notification fanned out to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    /// A new lookup table was set.
    LookupChanged,
    /// A new caret rectangle was set.
    CaretChanged,
    /// Aux text or aux visibility changed.
    AuxChanged,
    /// Lookup table visibility changed.
    LookupVisibleChanged,
    /// The enabled flag changed.
    EnabledChanged,
    /// The set or order of properties changed.
    PropertiesChanged,
    /// A single property changed (or was re-announced or removed).
    PropertyChanged(String),
    /// The engine asked for a menu with these entries.
    MenuReceived(Vec<Property>),
}

impl From<RegistryChange> for PanelEvent {
    fn from(change: RegistryChange) -> Self {
        match change {
            RegistryChange::Replaced => PanelEvent::PropertiesChanged,
            RegistryChange::Changed(key) => PanelEvent::PropertyChanged(key),
        }
    }
}

/// A state listener.
pub type Listener = Box<dyn FnMut(&PanelEvent, &PanelModel)>;

/// Handle returned by [`PanelState::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

// ============================================================================
// PanelState
// ============================================================================

/// Owner of the [`PanelModel`] and its listeners.
#[derive(Default)]
pub struct PanelState {
    model: PanelModel,
    listeners: Listeners,
}

impl std::fmt::Debug for PanelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelState")
            .field("model", &self.model)
            .field("listeners", &self.listeners.entries.len())
            .finish()
    }
}

impl PanelState {
    /// Creates an empty state with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the model.
    #[must_use]
    pub fn model(&self) -> &PanelModel {
        &self.model
    }

    /// Registers a listener; it is called after every notification.
    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.listeners.next_id);
        self.listeners.next_id += 1;
        self.listeners.entries.push((id, listener));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.entries.len();
        self.listeners.entries.retain(|(entry, _)| *entry != id);
        before != self.listeners.entries.len()
    }

    fn emit(&mut self, event: PanelEvent) {
        for (_, listener) in &mut self.listeners.entries {
            listener(&event, &self.model);
        }
    }

    fn emit_registry(&mut self, changes: Vec<RegistryChange>) {
        for change in changes {
            self.emit(change.into());
        }
    }

    // ------------------------------------------------------------------------
    // Structural setters (always notify)
    // ------------------------------------------------------------------------

    /// Stores a new caret rectangle.
    pub fn set_caret_rect(&mut self, caret: CaretRect) {
        tracing::debug!(
            "Caret rect: x={} y={} w={} h={}",
            caret.x,
            caret.y,
            caret.w,
            caret.h
        );
        self.model.caret = caret;
        self.emit(PanelEvent::CaretChanged);
    }

    /// Stores a new lookup table snapshot.
    pub fn set_lookup_table(&mut self, table: LookupTable) {
        self.model.lookup = table;
        self.emit(PanelEvent::LookupChanged);
    }

    // ------------------------------------------------------------------------
    // Scalar setters (notify on change only)
    // ------------------------------------------------------------------------

    /// Sets the auxiliary text.
    pub fn set_aux_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.model.aux.text == text {
            return;
        }
        self.model.aux.text = text;
        self.emit(PanelEvent::AuxChanged);
    }

    /// Shows or hides the auxiliary text.
    pub fn set_aux_visible(&mut self, visible: bool) {
        if self.model.aux.visible == visible {
            return;
        }
        self.model.aux.visible = visible;
        self.emit(PanelEvent::AuxChanged);
    }

    /// Shows or hides the lookup table.
    pub fn set_lookup_visible(&mut self, visible: bool) {
        if self.model.lookup_visible == visible {
            return;
        }
        self.model.lookup_visible = visible;
        self.emit(PanelEvent::LookupVisibleChanged);
    }

    /// Sets whether the input method is enabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.model.enabled == enabled {
            return;
        }
        self.model.enabled = enabled;
        self.emit(PanelEvent::EnabledChanged);
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Replaces the registered properties.
    pub fn register_properties<S: AsRef<str>>(&mut self, entries: &[S]) {
        let changes = self.model.properties.register(entries);
        self.emit_registry(changes);
    }

    /// Inserts or updates one property.
    pub fn update_property(&mut self, raw: &str) {
        let changes = self.model.properties.update(raw);
        self.emit_registry(changes);
    }

    /// Removes one property.
    pub fn remove_property(&mut self, key: &str) {
        let changes = self.model.properties.remove(key);
        self.emit_registry(changes);
    }

    /// Looks up a registered property.
    #[must_use]
    pub fn property_for_key(&self, key: &str) -> Option<&Property> {
        self.model.property_for_key(key)
    }

    /// Decodes a menu request from the engine and hands it to listeners.
    pub fn exec_menu<S: AsRef<str>>(&mut self, entries: &[S]) {
        let parsed = decode_many(entries);
        tracing::debug!("ExecMenu with {} entries", parsed.len());
        self.emit(PanelEvent::MenuReceived(parsed));
    }
}

// ============================================================================
// Tests
// ============================================================================
