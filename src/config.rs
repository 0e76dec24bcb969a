// SPDX-License-Identifier: GPL-3.0-only

//! Startup configuration.
//!
//! Read once from `caretpanel/config.json` under the user config directory
//! (`$XDG_CONFIG_HOME`, usually `~/.config`). Every field is optional:
//!
//! ```json
//! {
//!     "disable_input_method_watch": false,
//!     "disable_tray": false,
//!     "tracked_key": "/Fcitx/im",
//!     "fallback_line_height": 18,
//!     "default_scale": 1.0,
//!     "panel_size": { "width": 320, "height": 48 },
//!     "displays": [
//!         { "name": "eDP-1", "x": 0, "y": 0, "width": 1920, "height": 1080, "scale": 1.0 }
//!     ]
//! }
//! ```
//!
//! The environment variables `KIMPANEL_DISABLE_INPUTMETHOD` and
//! `KIMPANEL_DISABLE_SNI` switch the two features off when set to anything.

use crate::app_settings::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_LINE_HEIGHT, DEFAULT_PANEL_HEIGHT,
    DEFAULT_PANEL_WIDTH, DEFAULT_TRACKED_KEY,
};
use crate::geometry::{Display, Point, Rect, Scale, Size};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Disables the input method signal subscription when set.
pub const ENV_DISABLE_INPUT_METHOD: &str = "KIMPANEL_DISABLE_INPUTMETHOD";

/// Disables the StatusNotifierItem tray when set.
pub const ENV_DISABLE_TRAY: &str = "KIMPANEL_DISABLE_SNI";

/// Panel configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Skip subscribing to `org.kde.kimpanel.inputmethod` signals.
    pub disable_input_method_watch: bool,
    /// Skip the tray icon.
    pub disable_tray: bool,
    /// Property key mirrored by the tray icon.
    pub tracked_key: String,
    /// Caret height used for zero-height carets, in logical pixels.
    pub fallback_line_height: i32,
    /// Scale assumed for displays reporting none.
    pub default_scale: f64,
    /// Panel size used when the view cannot measure itself.
    pub panel_size: SizeConfig,
    /// Displays to use when the platform cannot enumerate outputs.
    pub displays: Vec<DisplayConfig>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            disable_input_method_watch: false,
            disable_tray: false,
            tracked_key: DEFAULT_TRACKED_KEY.to_string(),
            fallback_line_height: DEFAULT_LINE_HEIGHT,
            default_scale: 1.0,
            panel_size: SizeConfig::default(),
            displays: Vec::new(),
        }
    }
}

/// A width and height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SizeConfig {
    pub width: i32,
    pub height: i32,
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_PANEL_WIDTH,
            height: DEFAULT_PANEL_HEIGHT,
        }
    }
}

impl From<SizeConfig> for Size {
    fn from(size: SizeConfig) -> Self {
        Size::new(size.width, size.height)
    }
}

/// A rectangle in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RectConfig {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// One statically configured display, in logical pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default = "default_display_scale")]
    pub scale: f64,
    /// Usable area excluding docks and bars; the full geometry when absent.
    #[serde(default)]
    pub work_area: Option<RectConfig>,
    #[serde(default)]
    pub primary: bool,
}

fn default_display_scale() -> f64 {
    1.0
}

impl From<&DisplayConfig> for Display {
    fn from(config: &DisplayConfig) -> Self {
        let display = Display::new(
            config.name.clone(),
            Point::new(config.x, config.y),
            Size::new(config.width, config.height),
            Scale::uniform(config.scale),
        )
        .with_primary(config.primary);
        match config.work_area {
            Some(area) => display.with_work_area(Rect::new(area.x, area.y, area.width, area.height)),
            None => display,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while reading the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    /// The file is not valid configuration JSON.
    Json {
        source: serde_json::Error,
        path: PathBuf,
        line: usize,
    },
}

impl ConfigError {
    /// Whether the error just means there is no configuration file.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { source, path } => {
                write!(f, "I/O error reading config '{}': {}", path.display(), source)
            }
            ConfigError::Json { source, path, line } => write!(
                f,
                "Invalid config '{}' at line {}: {}",
                path.display(),
                line,
                source
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl PanelConfig {
    /// Loads the configuration from the user config file and environment.
    ///
    /// A missing file yields defaults; an unreadable or malformed file is
    /// logged and also yields defaults.
    pub fn load() -> Self {
        let mut config = match config_path() {
            Some(path) => match Self::load_from_path(&path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!("No configuration at {}, using defaults", path.display());
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!("{}; using defaults", e);
                    Self::default()
                }
            },
            None => {
                tracing::debug!("No configuration directory, using defaults");
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var_os(name).is_some());
        config
    }

    /// Reads and parses a configuration file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        serde_json::from_str(&json).map_err(|source| {
            let line = source.line();
            ConfigError::Json {
                source,
                path: path.to_path_buf(),
                line,
            }
        })
    }

    /// Applies the environment toggles; `is_set` reports variable presence.
    pub fn apply_env(&mut self, is_set: impl Fn(&str) -> bool) {
        if is_set(ENV_DISABLE_INPUT_METHOD) {
            tracing::info!("Input method watch disabled by {}", ENV_DISABLE_INPUT_METHOD);
            self.disable_input_method_watch = true;
        }
        if is_set(ENV_DISABLE_TRAY) {
            tracing::info!("Tray disabled by {}", ENV_DISABLE_TRAY);
            self.disable_tray = true;
        }
    }

    /// The configured static displays.
    #[must_use]
    pub fn static_displays(&self) -> Vec<Display> {
        self.displays.iter().map(Display::from).collect()
    }

    /// The fallback scale, with nonsensical values replaced by 1.
    #[must_use]
    pub fn fallback_scale(&self) -> Scale {
        Scale::uniform(self.default_scale).or(Scale::default())
    }
}

/// The config file inside the user config directory, if there is one.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| config_file_in(&dir))
}

/// The config file inside `config_dir`.
#[must_use]
pub fn config_file_in(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

// ============================================================================
// Tests
// ============================================================================
