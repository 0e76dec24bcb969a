// SPDX-License-Identifier: GPL-3.0-only

//! Status icon interaction.
//!
//! The tray icon mirrors one property of the registry (the *tracked key*,
//! normally the current input method) and lets the user switch it:
//!
//! - Left, double or middle click: **auto-cycle**. The controller triggers
//!   the tracked property, the engine answers with an `ExecMenu` listing the
//!   alternatives, and the controller immediately triggers the entry after
//!   the current one. No menu is shown.
//! - Context menu: **primary menu**. Same trigger, but the `ExecMenu`
//!   answer is turned into a selectable menu shown where the user clicked.
//!
//! # State Machine
//!
//! ```text
//!            trigger_primary()                 ExecMenu
//!   Idle ─────────────────────► AwaitingPrimaryMenu ─────► Idle (+ menu)
//!     │      activate_default()                 ExecMenu
//!     └───────────────────────► AwaitingCycleMenu ───────► Idle (+ trigger next)
//! ```
//!
//! Responses are correlated with requests only through this state; there is
//! no request id on the wire. At most one trigger may be outstanding: a new
//! request replaces the pending one.

pub mod item;

use crate::app_settings::DEFAULT_TRAY_ICON;
use crate::dbus::OutboundCall;
use crate::fl;
use crate::geometry::Point;
use crate::property::Property;
use crate::state::{PanelEvent, PanelModel};
use futures::channel::mpsc;
use std::path::Path;

/// Hint entry carrying the short label of a property.
const HINT_LABEL: &str = "label";

// ============================================================================
// Types
// ============================================================================

/// Where the controller is in the trigger/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrayPhase {
    /// No request outstanding.
    #[default]
    Idle,
    /// A menu was requested for display at `position`.
    AwaitingPrimaryMenu { position: Option<Point> },
    /// A menu was requested to find the next entry of the cycle.
    AwaitingCycleMenu,
}

/// User interaction coming from the tray frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayInput {
    /// Primary, double or middle click on the icon.
    Activate,
    /// Context menu requested at this screen position.
    OpenSwitchMenu { position: Point },
    /// A menu entry was chosen.
    Select(String),
    /// The user asked the panel to quit.
    Quit,
}

/// Icon to show for the tracked property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayIcon {
    /// A name from the icon theme.
    Themed(String),
    /// An image file on disk.
    File(String),
    /// The built-in keyboard icon.
    Default,
}

impl TrayIcon {
    /// Name or path suitable for a StatusNotifierItem `IconName`.
    #[must_use]
    pub fn icon_name(&self) -> &str {
        match self {
            TrayIcon::Themed(name) | TrayIcon::File(name) => name,
            TrayIcon::Default => DEFAULT_TRAY_ICON,
        }
    }
}

/// Icon and tooltip derived from the tracked property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayAppearance {
    pub icon: TrayIcon,
    /// Tooltip lines; empty when the tracked property is unknown.
    pub tooltip_lines: Vec<String>,
}

impl TrayAppearance {
    /// The tooltip text, or the generic title when there is nothing to say.
    #[must_use]
    pub fn tooltip(&self) -> String {
        if self.tooltip_lines.is_empty() {
            fl!("tray-tooltip-default")
        } else {
            self.tooltip_lines.join("\n")
        }
    }
}

/// One selectable entry of the switch menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    /// Property key triggered when the entry is chosen.
    pub key: String,
    /// Entry text: label, else tip, else key.
    pub text: String,
    /// Entry icon, if the property names a resolvable one.
    pub icon: Option<TrayIcon>,
    /// Secondary text from the `label=` hint, when it differs from `text`.
    pub status_tip: Option<String>,
}

/// A menu to present to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuRequest {
    pub items: Vec<MenuItem>,
    /// Click position recorded with the request; `None` means the pointer.
    pub position: Option<Point>,
}

/// Work for the tray frontend produced by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayUpdate {
    Appearance(TrayAppearance),
    PresentMenu(MenuRequest),
}

/// Resolves icon names announced by the engine.
pub trait IconLookup {
    /// Whether the icon theme provides `name`.
    fn has_themed(&self, name: &str) -> bool;
    /// Whether `path` is an existing file.
    fn file_exists(&self, path: &str) -> bool;
}

/// Lookup for StatusNotifierItem hosts, which resolve theme names themselves.
///
/// Every bare name is assumed to be themed; names containing a slash are
/// treated as file paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostIconLookup;

impl IconLookup for HostIconLookup {
    fn has_themed(&self, name: &str) -> bool {
        !name.is_empty() && !name.contains('/')
    }

    fn file_exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }
}

/// Picks the icon for a property icon string: theme, then file, then default.
fn resolve_icon(icon: &str, lookup: &dyn IconLookup) -> TrayIcon {
    if icon.is_empty() {
        TrayIcon::Default
    } else if lookup.has_themed(icon) {
        TrayIcon::Themed(icon.to_string())
    } else if lookup.file_exists(icon) {
        TrayIcon::File(icon.to_string())
    } else {
        TrayIcon::Default
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Tray interaction state machine.
pub struct TrayController {
    tracked_key: String,
    phase: TrayPhase,
    outbound: mpsc::UnboundedSender<OutboundCall>,
    icons: Box<dyn IconLookup>,
}

impl std::fmt::Debug for TrayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrayController")
            .field("tracked_key", &self.tracked_key)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl TrayController {
    /// Creates a controller mirroring `tracked_key` and sending triggers to `outbound`.
    pub fn new(tracked_key: impl Into<String>, outbound: mpsc::UnboundedSender<OutboundCall>) -> Self {
        Self {
            tracked_key: tracked_key.into(),
            phase: TrayPhase::Idle,
            outbound,
            icons: Box::new(HostIconLookup),
        }
    }

    /// Replaces the icon lookup.
    #[must_use]
    pub fn with_icon_lookup(mut self, icons: Box<dyn IconLookup>) -> Self {
        self.icons = icons;
        self
    }

    /// The property key the icon mirrors.
    #[must_use]
    pub fn tracked_key(&self) -> &str {
        &self.tracked_key
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TrayPhase {
        self.phase
    }

    fn trigger(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        tracing::debug!("Tray: triggering property {:?}", key);
        if let Err(e) = self
            .outbound
            .unbounded_send(OutboundCall::TriggerProperty(key.to_string()))
        {
            tracing::error!("Failed to queue TriggerProperty({}): {}", key, e);
        }
    }

    fn enter(&mut self, phase: TrayPhase) {
        if self.phase != TrayPhase::Idle {
            tracing::debug!("Tray: replacing pending {:?} with {:?}", self.phase, phase);
        }
        self.phase = phase;
    }

    /// Requests the switch menu, to be shown at `position`.
    pub fn trigger_primary(&mut self, position: Option<Point>) {
        self.enter(TrayPhase::AwaitingPrimaryMenu { position });
        self.trigger(&self.tracked_key);
    }

    /// Requests the next entry of the cycle.
    pub fn activate_default(&mut self) {
        self.enter(TrayPhase::AwaitingCycleMenu);
        self.trigger(&self.tracked_key);
    }

    /// A menu entry was chosen.
    pub fn select(&mut self, key: &str) {
        self.trigger(key);
    }

    /// Dispatches a frontend interaction.
    pub fn handle_input(&mut self, input: TrayInput) {
        match input {
            TrayInput::Activate => self.activate_default(),
            TrayInput::OpenSwitchMenu { position } => self.trigger_primary(Some(position)),
            TrayInput::Select(key) => self.select(&key),
            TrayInput::Quit => tracing::debug!("Tray: quit is handled by the panel"),
        }
    }

    /// Consumes a menu response from the engine.
    ///
    /// Returns the menu to present, if the response answered a primary
    /// request (or arrived unsolicited).
    pub fn on_menu(&mut self, entries: &[Property], model: &PanelModel) -> Option<MenuRequest> {
        match std::mem::take(&mut self.phase) {
            TrayPhase::AwaitingCycleMenu => {
                self.cycle(entries, model);
                None
            }
            TrayPhase::AwaitingPrimaryMenu { position } => self.build_menu(entries, position),
            TrayPhase::Idle => self.build_menu(entries, None),
        }
    }

    fn cycle(&self, entries: &[Property], model: &PanelModel) {
        if entries.is_empty() {
            tracing::warn!("ExecMenu empty during auto cycle");
            return;
        }

        let current = model.property_for_key(&self.tracked_key);
        let by_key = current.and_then(|prop| entries.iter().position(|entry| entry.key == prop.key));
        let found = by_key.or_else(|| {
            let label = current.map(|prop| prop.label.as_str()).filter(|label| !label.is_empty())?;
            let index = entries.iter().position(|entry| entry.label == label)?;
            tracing::debug!("Tray: matched current entry by label {:?} at {}", label, index);
            Some(index)
        });

        let next = found.map_or(0, |index| (index + 1) % entries.len());
        tracing::debug!(
            "Tray: auto cycle from {:?} to index {} ({:?})",
            found,
            next,
            entries[next].key
        );
        self.trigger(&entries[next].key);
    }

    fn build_menu(&self, entries: &[Property], position: Option<Point>) -> Option<MenuRequest> {
        if entries.is_empty() {
            return None;
        }

        let items = entries
            .iter()
            .map(|entry| {
                let text = entry.display_text().to_string();
                let icon = Some(resolve_icon(&entry.icon, self.icons.as_ref()))
                    .filter(|icon| *icon != TrayIcon::Default);
                let status_tip = entry
                    .hint_value(HINT_LABEL)
                    .filter(|hint| !hint.is_empty() && *hint != text)
                    .map(str::to_string);
                MenuItem {
                    key: entry.key.clone(),
                    text,
                    icon,
                    status_tip,
                }
            })
            .collect();

        Some(MenuRequest { items, position })
    }

    /// Projects the tracked property onto an icon and tooltip.
    #[must_use]
    pub fn appearance(&self, model: &PanelModel) -> TrayAppearance {
        let Some(prop) = model.property_for_key(&self.tracked_key) else {
            return TrayAppearance {
                icon: TrayIcon::Default,
                tooltip_lines: Vec::new(),
            };
        };

        let hint_label = prop.hint_value(HINT_LABEL).unwrap_or_default();
        let mut lines = Vec::new();
        if !hint_label.is_empty() {
            lines.push(hint_label.to_string());
        }
        if !prop.label.is_empty() && prop.label != hint_label {
            lines.push(prop.label.clone());
        }
        if !prop.tip.is_empty() && prop.tip != prop.label && prop.tip != hint_label {
            lines.push(prop.tip.clone());
        }
        if !model.enabled {
            lines.push(fl!("input-method-disabled"));
        }

        TrayAppearance {
            icon: resolve_icon(&prop.icon, self.icons.as_ref()),
            tooltip_lines: lines,
        }
    }

    /// Reacts to a state notification.
    pub fn handle_event(&mut self, event: &PanelEvent, model: &PanelModel) -> Option<TrayUpdate> {
        match event {
            PanelEvent::PropertiesChanged | PanelEvent::EnabledChanged => {
                Some(TrayUpdate::Appearance(self.appearance(model)))
            }
            PanelEvent::PropertyChanged(key) if *key == self.tracked_key => {
                Some(TrayUpdate::Appearance(self.appearance(model)))
            }
            PanelEvent::MenuReceived(entries) => {
                self.on_menu(entries, model).map(TrayUpdate::PresentMenu)
            }
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PanelState;

    const TRACKED: &str = "/Fcitx/im";

    /// Icon lookup with a fixed theme and no files.
    struct FakeIcons(&'static [&'static str]);

    impl IconLookup for FakeIcons {
        fn has_themed(&self, name: &str) -> bool {
            self.0.contains(&name)
        }

        fn file_exists(&self, path: &str) -> bool {
            path.starts_with("/usr/share/")
        }
    }

    fn controller() -> (TrayController, mpsc::UnboundedReceiver<OutboundCall>) {
        let (tx, rx) = mpsc::unbounded();
        let controller = TrayController::new(TRACKED, tx)
            .with_icon_lookup(Box::new(FakeIcons(&["fcitx-pinyin", "fcitx-keyboard-us"])));
        (controller, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundCall>) -> Vec<OutboundCall> {
        let mut calls = Vec::new();
        while let Ok(Some(call)) = rx.try_next() {
            calls.push(call);
        }
        calls
    }

    fn trigger(key: &str) -> OutboundCall {
        OutboundCall::TriggerProperty(key.to_string())
    }

    fn entries() -> Vec<Property> {
        vec![
            Property::new("/Fcitx/im/keyboard-us", "A", "fcitx-keyboard-us", "English"),
            Property::new("/Fcitx/im/pinyin", "B", "fcitx-pinyin", "Pinyin"),
            Property::new("/Fcitx/im/rime", "C", "", "Rime"),
        ]
    }

    fn model_with_current(label: &str) -> PanelModel {
        let mut state = PanelState::new();
        state.register_properties(&[format!("{TRACKED}:{label}:icon:tip")]);
        state.model().clone()
    }

    /// Test: Cycling from B triggers C and returns to Idle.
    #[test]
    fn test_cycle_advances_to_next() {
        let (mut tray, mut rx) = controller();

        tray.activate_default();
        assert_eq!(tray.phase(), TrayPhase::AwaitingCycleMenu);
        assert_eq!(drain(&mut rx), vec![trigger(TRACKED)], "Tracked key is triggered first");

        let menu = tray.on_menu(&entries(), &model_with_current("B"));

        assert_eq!(menu, None, "Auto cycle never shows a menu");
        assert_eq!(drain(&mut rx), vec![trigger("/Fcitx/im/rime")]);
        assert_eq!(tray.phase(), TrayPhase::Idle);
    }

    /// Test: Cycling from the last entry wraps to the first.
    #[test]
    fn test_cycle_wraps_around() {
        let (mut tray, mut rx) = controller();
        tray.activate_default();
        drain(&mut rx);

        tray.on_menu(&entries(), &model_with_current("C"));

        assert_eq!(drain(&mut rx), vec![trigger("/Fcitx/im/keyboard-us")]);
    }

    /// Test: A direct key match takes precedence over the label.
    #[test]
    fn test_cycle_matches_by_key_first() {
        let (mut tray, mut rx) = controller();
        let mut menu = entries();
        menu.push(Property::new(TRACKED, "Z", "", ""));
        tray.activate_default();
        drain(&mut rx);

        // The tracked property has label "A" but its key matches entry 3.
        tray.on_menu(&menu, &model_with_current("A"));

        assert_eq!(drain(&mut rx), vec![trigger("/Fcitx/im/keyboard-us")], "3 + 1 wraps to 0");
    }

    /// Test: Unknown current entry defaults to the first one.
    #[test]
    fn test_cycle_defaults_to_first() {
        let (mut tray, mut rx) = controller();
        tray.activate_default();
        drain(&mut rx);

        tray.on_menu(&entries(), &PanelModel::default());

        assert_eq!(drain(&mut rx), vec![trigger("/Fcitx/im/keyboard-us")]);
    }

    /// Test: An empty cycle response aborts without triggering.
    #[test]
    fn test_cycle_empty_menu_aborts() {
        let (mut tray, mut rx) = controller();
        tray.activate_default();
        drain(&mut rx);

        let menu = tray.on_menu(&[], &model_with_current("B"));

        assert_eq!(menu, None);
        assert!(drain(&mut rx).is_empty(), "Nothing is triggered");
        assert_eq!(tray.phase(), TrayPhase::Idle);
    }

    /// Test: A primary request turns the response into a menu at the click position.
    #[test]
    fn test_primary_menu_population() {
        let (mut tray, mut rx) = controller();
        let click = Point::new(1800, 1060);

        tray.trigger_primary(Some(click));
        assert_eq!(tray.phase(), TrayPhase::AwaitingPrimaryMenu { position: Some(click) });
        assert_eq!(drain(&mut rx), vec![trigger(TRACKED)]);

        let response = vec![
            Property::new("a", "Pinyin", "fcitx-pinyin", "tip").with_hint("label=拼"),
            Property::new("b", "", "/usr/share/icons/rime.png", "Rime tip"),
            Property::new("c", "", "missing-icon", ""),
        ];
        let menu = tray
            .on_menu(&response, &PanelModel::default())
            .expect("Should present a menu");

        assert_eq!(menu.position, Some(click));
        assert_eq!(menu.items.len(), 3);
        assert_eq!(menu.items[0].text, "Pinyin");
        assert_eq!(menu.items[0].icon, Some(TrayIcon::Themed("fcitx-pinyin".into())));
        assert_eq!(menu.items[0].status_tip.as_deref(), Some("拼"));
        assert_eq!(menu.items[1].text, "Rime tip", "Tip is the second fallback");
        assert_eq!(
            menu.items[1].icon,
            Some(TrayIcon::File("/usr/share/icons/rime.png".into()))
        );
        assert_eq!(menu.items[2].text, "c", "Key is the last fallback");
        assert_eq!(menu.items[2].icon, None);
        assert!(drain(&mut rx).is_empty(), "Presenting a menu triggers nothing");
        assert_eq!(tray.phase(), TrayPhase::Idle);
    }

    /// Test: An empty primary response shows nothing.
    #[test]
    fn test_primary_empty_menu() {
        let (mut tray, _rx) = controller();
        tray.trigger_primary(None);

        assert_eq!(tray.on_menu(&[], &PanelModel::default()), None);
        assert_eq!(tray.phase(), TrayPhase::Idle);
    }

    /// Test: Unsolicited menus are presented at the pointer.
    #[test]
    fn test_unsolicited_menu_uses_pointer() {
        let (mut tray, _rx) = controller();

        let menu = tray.on_menu(&entries(), &PanelModel::default()).expect("Should present");

        assert_eq!(menu.position, None);
    }

    /// Test: Selecting an entry triggers its key; empty keys are ignored.
    #[test]
    fn test_select_triggers_key() {
        let (mut tray, mut rx) = controller();

        tray.handle_input(TrayInput::Select("/Fcitx/im/rime".into()));
        tray.select("");

        assert_eq!(drain(&mut rx), vec![trigger("/Fcitx/im/rime")]);
    }

    /// Test: A new request replaces the pending one.
    #[test]
    fn test_latest_request_wins() {
        let (mut tray, mut rx) = controller();

        tray.trigger_primary(None);
        tray.handle_input(TrayInput::Activate);

        assert_eq!(tray.phase(), TrayPhase::AwaitingCycleMenu);
        assert_eq!(drain(&mut rx).len(), 2, "Both requests are sent");
        assert_eq!(tray.on_menu(&entries(), &model_with_current("A")), None);
        assert_eq!(drain(&mut rx), vec![trigger("/Fcitx/im/pinyin")]);
    }

    /// Test: Tooltip lines skip duplicates and add the disabled line.
    #[test]
    fn test_appearance_tooltip_lines() {
        let (tray, _rx) = controller();
        let mut state = PanelState::new();
        state.register_properties(&["/Fcitx/im:Pinyin:fcitx-pinyin:Pinyin:label=拼"]);
        state.set_enabled(true);

        let appearance = tray.appearance(state.model());
        assert_eq!(appearance.icon, TrayIcon::Themed("fcitx-pinyin".into()));
        assert_eq!(appearance.tooltip_lines, vec!["拼".to_string(), "Pinyin".to_string()]);
        assert_eq!(appearance.tooltip(), "拼\nPinyin");

        state.set_enabled(false);
        let appearance = tray.appearance(state.model());
        assert_eq!(appearance.tooltip_lines.len(), 3);
        assert_eq!(appearance.tooltip_lines[2], fl!("input-method-disabled"));
    }

    /// Test: Without the tracked property the default icon and title are used.
    #[test]
    fn test_appearance_without_property() {
        let (tray, _rx) = controller();

        let appearance = tray.appearance(&PanelModel::default());

        assert_eq!(appearance.icon, TrayIcon::Default);
        assert_eq!(appearance.icon.icon_name(), DEFAULT_TRAY_ICON);
        assert_eq!(appearance.tooltip(), fl!("tray-tooltip-default"));
    }

    /// Test: Unresolvable icons fall back to the default icon.
    #[test]
    fn test_appearance_icon_fallback() {
        let (tray, _rx) = controller();
        let mut state = PanelState::new();
        state.register_properties(&["/Fcitx/im:X:not-in-theme:tip"]);

        assert_eq!(tray.appearance(state.model()).icon, TrayIcon::Default);
    }

    /// Test: Only relevant events refresh the appearance.
    #[test]
    fn test_handle_event_filters() {
        let (mut tray, _rx) = controller();
        let model = PanelModel::default();

        assert!(tray.handle_event(&PanelEvent::PropertiesChanged, &model).is_some());
        assert!(tray.handle_event(&PanelEvent::EnabledChanged, &model).is_some());
        assert!(
            tray.handle_event(&PanelEvent::PropertyChanged(TRACKED.into()), &model)
                .is_some()
        );
        assert!(
            tray.handle_event(&PanelEvent::PropertyChanged("/Fcitx/punc".into()), &model)
                .is_none()
        );
        assert!(tray.handle_event(&PanelEvent::CaretChanged, &model).is_none());
        assert!(matches!(
            tray.handle_event(&PanelEvent::MenuReceived(entries()), &model),
            Some(TrayUpdate::PresentMenu(_))
        ));
    }

    /// Test: HostIconLookup treats bare names as themed.
    #[test]
    fn test_host_icon_lookup() {
        let lookup = HostIconLookup;

        assert!(lookup.has_themed("fcitx-pinyin"));
        assert!(!lookup.has_themed("/tmp/icon.png"));
        assert!(!lookup.has_themed(""));
        assert!(!lookup.file_exists("/definitely/not/here.png"));
    }
}
