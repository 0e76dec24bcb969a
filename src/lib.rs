// SPDX-License-Identifier: GPL-3.0-only

//! caretpanel - A kimpanel candidate panel and status icon
//!
//! This crate implements the panel side of the kimpanel D-Bus protocol: an
//! input method engine (such as Fcitx) reports candidates, auxiliary text,
//! the caret rectangle and its status properties, and the panel shows the
//! candidates next to the caret and mirrors the current input method in a
//! tray icon.
//!
//! # Architecture
//!
//! - A single [`state::PanelState`] holds everything the engine reported
//!   and notifies listeners synchronously.
//! - The [`presenter`] places the panel with the [`geometry`] resolver.
//! - The [`tray`] controller turns clicks into `TriggerProperty` requests
//!   and the engine's menu answers into menus or an automatic cycle.
//! - The [`dbus`] adapter forwards bus traffic to the main task through
//!   channels and sends outbound calls.
//!
//! # Modules
//!
//! - `app`: Wiring and main loop
//! - `app_settings`: Centralized application constants
//! - `config`: JSON configuration and environment toggles
//! - `dbus`: kimpanel D-Bus interfaces and signal watch
//! - `geometry`: Caret to screen placement
//! - `i18n`: Localization support using fluent translations
//! - `outputs`: Display enumeration (Wayland or configured)
//! - `presenter`: Candidate panel presentation
//! - `property`: Status property codec and registry
//! - `state`: Panel state and change notifications
//! - `tray`: Tray interaction state machine and StatusNotifierItem

pub mod app;
pub mod app_settings;
pub mod config;
pub mod dbus;
pub mod geometry;
pub mod i18n;
pub mod outputs;
pub mod presenter;
pub mod property;
pub mod state;
pub mod tray;

// Re-export the fl! macro for localization
pub use crate::i18n::LANGUAGE_LOADER;

// ============================================================================
// Integration Tests
// ============================================================================
