// SPDX-License-Identifier: GPL-3.0-only

//! Centralized application settings and constants.

/// Application ID in RDNN (reverse domain name notation) format.
pub const APP_ID: &str = "io.github.caretpanel.CaretPanel";

/// Configuration directory name under the user config directory.
pub const CONFIG_DIR_NAME: &str = "caretpanel";

/// Configuration file name inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

// ============================================================================
// kimpanel protocol names
// ============================================================================

/// Well-known bus name owned by the panel.
pub const PANEL_SERVICE: &str = "org.kde.impanel";

/// Object path the panel interfaces are served at.
pub const PANEL_PATH: &str = "/org/kde/impanel";

/// Panel interface carrying outbound signals such as `TriggerProperty`.
pub const PANEL_INTERFACE: &str = "org.kde.impanel";

/// Panel interface carrying inbound method calls such as `SetSpotRect`.
pub const PANEL2_INTERFACE: &str = "org.kde.impanel2";

/// Control interface served next to the panel interfaces (paging, quit).
pub const CONTROL_INTERFACE: &str = "io.github.caretpanel.Panel";

/// Bus name of the input method engine side of the protocol.
pub const INPUT_METHOD_SERVICE: &str = "org.kde.kimpanel.inputmethod";

/// Object path of the input method engine side of the protocol.
pub const INPUT_METHOD_PATH: &str = "/org/kde/kimpanel/inputmethod";

/// Interface the input method engine emits its signals on.
pub const INPUT_METHOD_INTERFACE: &str = "org.kde.kimpanel.inputmethod";

// ============================================================================
// StatusNotifierItem names
// ============================================================================

/// Bus name of the StatusNotifierWatcher service.
pub const SNI_WATCHER_SERVICE: &str = "org.kde.StatusNotifierWatcher";

/// Object path of the StatusNotifierWatcher service.
pub const SNI_WATCHER_PATH: &str = "/StatusNotifierWatcher";

/// Object path our StatusNotifierItem is served at.
pub const SNI_ITEM_PATH: &str = "/StatusNotifierItem";

// ============================================================================
// Panel behaviour
// ============================================================================

/// Property key the tray icon mirrors (the current input method).
pub const DEFAULT_TRACKED_KEY: &str = "/Fcitx/im";

/// Gap between the caret bottom edge and the panel top edge, in logical pixels.
pub const CARET_GAP: i32 = 6;

/// Caret height used when the engine reports a zero-height caret.
pub const DEFAULT_LINE_HEIGHT: i32 = 18;

/// Panel size assumed when the view cannot measure itself.
pub const DEFAULT_PANEL_WIDTH: i32 = 320;

/// Panel size assumed when the view cannot measure itself.
pub const DEFAULT_PANEL_HEIGHT: i32 = 48;

/// Themed icon shown when the tracked property has no usable icon.
pub const DEFAULT_TRAY_ICON: &str = "input-keyboard";

/// Capacity of the inbound protocol call channel.
pub const CALL_CHANNEL_CAPACITY: usize = 64;
