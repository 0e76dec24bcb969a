// SPDX-License-Identifier: GPL-3.0-only

//! StatusNotifierItem frontend for the tray controller.
//!
//! The item is served at `/StatusNotifierItem` under the name
//! `org.kde.StatusNotifierItem-<pid>-1` and registered with the
//! `org.kde.StatusNotifierWatcher`. Clicks become [`TrayInput`]s on a
//! channel; [`TrayUpdate`]s from the controller update the icon, the
//! tooltip and the switch menu.
//!
//! No dbusmenu is exported. The switch menu is published on the companion
//! `io.github.caretpanel.SwitchMenu` interface (`Entries`, `Select`, `Quit`)
//! at the same path, and logged when presented.

use super::{MenuRequest, TrayAppearance, TrayInput, TrayUpdate};
use crate::app_settings::{APP_ID, SNI_ITEM_PATH, SNI_WATCHER_PATH, SNI_WATCHER_SERVICE};
use crate::dbus::{DbusError, DbusResult};
use crate::fl;
use crate::geometry::Point;
use futures::StreamExt;
use futures::channel::mpsc;
use zbus::interface;
use zbus::object_server::SignalEmitter;

/// SNI pixmap list: `(width, height, ARGB32 bytes)`.
pub type IconPixmaps = Vec<(i32, i32, Vec<u8>)>;

/// SNI tooltip: `(icon name, pixmaps, title, text)`.
pub type ToolTip = (String, IconPixmaps, String, String);

/// Bus name an item of process `pid` registers under.
#[must_use]
pub fn item_bus_name(pid: u32) -> String {
    format!("org.kde.StatusNotifierItem-{}-1", pid)
}

// ============================================================================
// Interfaces
// ============================================================================

/// The `org.kde.StatusNotifierItem` object.
pub struct StatusNotifierItem {
    appearance: TrayAppearance,
    input_tx: mpsc::UnboundedSender<TrayInput>,
}

impl StatusNotifierItem {
    pub fn new(appearance: TrayAppearance, input_tx: mpsc::UnboundedSender<TrayInput>) -> Self {
        Self {
            appearance,
            input_tx,
        }
    }

    fn send(&self, input: TrayInput) {
        if let Err(e) = self.input_tx.unbounded_send(input) {
            tracing::error!("Failed to forward tray input: {}", e);
        }
    }
}

#[interface(name = "org.kde.StatusNotifierItem")]
impl StatusNotifierItem {
    #[zbus(property)]
    fn category(&self) -> String {
        "SystemServices".to_string()
    }

    #[zbus(property)]
    fn id(&self) -> String {
        APP_ID.to_string()
    }

    #[zbus(property)]
    fn title(&self) -> String {
        fl!("tray-title")
    }

    #[zbus(property)]
    fn status(&self) -> String {
        "Active".to_string()
    }

    #[zbus(property)]
    fn icon_name(&self) -> String {
        self.appearance.icon.icon_name().to_string()
    }

    #[zbus(property)]
    fn tool_tip(&self) -> ToolTip {
        (
            self.appearance.icon.icon_name().to_string(),
            Vec::new(),
            fl!("tray-title"),
            self.appearance.tooltip(),
        )
    }

    #[zbus(property)]
    fn item_is_menu(&self) -> bool {
        false
    }

    /// Primary click.
    fn activate(&self, x: i32, y: i32) {
        tracing::debug!("SNI: Activate({}, {})", x, y);
        self.send(TrayInput::Activate);
    }

    /// Middle click.
    fn secondary_activate(&self, x: i32, y: i32) {
        tracing::debug!("SNI: SecondaryActivate({}, {})", x, y);
        self.send(TrayInput::Activate);
    }

    /// Right click; the item is expected to show its own menu.
    fn context_menu(&self, x: i32, y: i32) {
        tracing::debug!("SNI: ContextMenu({}, {})", x, y);
        self.send(TrayInput::OpenSwitchMenu {
            position: Point::new(x, y),
        });
    }

    fn scroll(&self, delta: i32, orientation: String) {
        tracing::trace!("SNI: Scroll({}, {}) ignored", delta, orientation);
    }

    #[zbus(signal)]
    async fn new_icon(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn new_tool_tip(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;
}

/// The `io.github.caretpanel.SwitchMenu` companion object.
pub struct SwitchMenuInterface {
    menu: Option<MenuRequest>,
    input_tx: mpsc::UnboundedSender<TrayInput>,
}

impl SwitchMenuInterface {
    pub fn new(input_tx: mpsc::UnboundedSender<TrayInput>) -> Self {
        Self {
            menu: None,
            input_tx,
        }
    }
}

#[interface(name = "io.github.caretpanel.SwitchMenu")]
impl SwitchMenuInterface {
    /// `(key, text)` of every entry of the last presented menu.
    fn entries(&self) -> Vec<(String, String)> {
        self.menu
            .iter()
            .flat_map(|menu| menu.items.iter())
            .map(|item| (item.key.clone(), item.text.clone()))
            .collect()
    }

    /// Chooses the entry with `key`.
    fn select(&self, key: String) {
        tracing::debug!("SwitchMenu: Select({})", key);
        if let Err(e) = self.input_tx.unbounded_send(TrayInput::Select(key)) {
            tracing::error!("Failed to forward menu selection: {}", e);
        }
    }

    /// Quits the panel.
    fn quit(&self) {
        tracing::debug!("SwitchMenu: Quit()");
        if let Err(e) = self.input_tx.unbounded_send(TrayInput::Quit) {
            tracing::error!("Failed to forward quit request: {}", e);
        }
    }
}

// ============================================================================
// Service
// ============================================================================

#[zbus::proxy(interface = "org.kde.StatusNotifierWatcher", gen_blocking = false)]
trait StatusNotifierWatcher {
    fn register_status_notifier_item(&self, service: &str) -> zbus::Result<()>;
}

/// A registered tray item.
pub struct TrayService {
    connection: zbus::Connection,
    bus_name: String,
}

impl std::fmt::Debug for TrayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrayService")
            .field("bus_name", &self.bus_name)
            .finish_non_exhaustive()
    }
}

impl TrayService {
    /// Serves the item on its own connection and registers it with the watcher.
    ///
    /// Returns [`DbusError::ServiceUnavailable`] when no watcher is running.
    pub async fn start(
        appearance: TrayAppearance,
        input_tx: mpsc::UnboundedSender<TrayInput>,
    ) -> DbusResult<Self> {
        let bus_name = item_bus_name(std::process::id());

        let connection = zbus::connection::Builder::session()
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?
            .name(bus_name.as_str())
            .map_err(|e| DbusError::RegistrationFailed(e.to_string()))?
            .serve_at(
                SNI_ITEM_PATH,
                StatusNotifierItem::new(appearance, input_tx.clone()),
            )
            .map_err(|e| DbusError::RegistrationFailed(e.to_string()))?
            .serve_at(SNI_ITEM_PATH, SwitchMenuInterface::new(input_tx))
            .map_err(|e| DbusError::RegistrationFailed(e.to_string()))?
            .build()
            .await
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?;

        let watcher = StatusNotifierWatcherProxy::builder(&connection)
            .destination(SNI_WATCHER_SERVICE)
            .and_then(|builder| builder.path(SNI_WATCHER_PATH))
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?
            .build()
            .await
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?;
        watcher
            .register_status_notifier_item(&bus_name)
            .await
            .map_err(|e| {
                tracing::debug!("{} rejected registration: {}", SNI_WATCHER_SERVICE, e);
                DbusError::ServiceUnavailable
            })?;

        tracing::info!("Tray item registered as {}", bus_name);
        Ok(Self {
            connection,
            bus_name,
        })
    }

    /// Applies one controller update.
    pub async fn apply(&self, update: TrayUpdate) -> DbusResult<()> {
        match update {
            TrayUpdate::Appearance(appearance) => self.set_appearance(appearance).await,
            TrayUpdate::PresentMenu(menu) => self.present_menu(menu).await,
        }
    }

    async fn set_appearance(&self, appearance: TrayAppearance) -> DbusResult<()> {
        let iface_ref = self
            .connection
            .object_server()
            .interface::<_, StatusNotifierItem>(SNI_ITEM_PATH)
            .await
            .map_err(|e| DbusError::MethodCallFailed(e.to_string()))?;

        let (icon_changed, tooltip_changed) = {
            let mut item = iface_ref.get_mut().await;
            let icon_changed = item.appearance.icon != appearance.icon;
            let tooltip_changed = icon_changed || item.appearance.tooltip_lines != appearance.tooltip_lines;
            item.appearance = appearance;
            (icon_changed, tooltip_changed)
        };

        if icon_changed {
            StatusNotifierItem::new_icon(iface_ref.signal_emitter())
                .await
                .map_err(|e| DbusError::MethodCallFailed(e.to_string()))?;
        }
        if tooltip_changed {
            StatusNotifierItem::new_tool_tip(iface_ref.signal_emitter())
                .await
                .map_err(|e| DbusError::MethodCallFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn present_menu(&self, menu: MenuRequest) -> DbusResult<()> {
        match menu.position {
            Some(position) => tracing::info!(
                "Switch menu at ({}, {}) with {} entries",
                position.x,
                position.y,
                menu.items.len()
            ),
            None => tracing::info!("Switch menu at pointer with {} entries", menu.items.len()),
        }
        for item in &menu.items {
            match &item.status_tip {
                Some(tip) => tracing::info!("  {} [{}] -> {}", item.text, tip, item.key),
                None => tracing::info!("  {} -> {}", item.text, item.key),
            }
        }

        let iface_ref = self
            .connection
            .object_server()
            .interface::<_, SwitchMenuInterface>(SNI_ITEM_PATH)
            .await
            .map_err(|e| DbusError::MethodCallFailed(e.to_string()))?;
        iface_ref.get_mut().await.menu = Some(menu);
        Ok(())
    }
}

/// Applies controller updates until the sender side is dropped.
pub async fn run_tray(service: TrayService, mut updates: mpsc::UnboundedReceiver<TrayUpdate>) {
    while let Some(update) = updates.next().await {
        if let Err(e) = service.apply(update).await {
            tracing::warn!("Tray update failed: {}", e);
        }
    }
    tracing::debug!("Tray update channel closed");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tray::{MenuItem, TrayIcon};

    fn appearance() -> TrayAppearance {
        TrayAppearance {
            icon: TrayIcon::Themed("fcitx-pinyin".into()),
            tooltip_lines: vec!["拼".into(), "Pinyin".into()],
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TrayInput>) -> Vec<TrayInput> {
        let mut inputs = Vec::new();
        while let Ok(Some(input)) = rx.try_next() {
            inputs.push(input);
        }
        inputs
    }

    /// Test: Clicks are forwarded as tray inputs.
    #[test]
    fn test_item_methods_forward_input() {
        let (tx, mut rx) = mpsc::unbounded();
        let item = StatusNotifierItem::new(appearance(), tx);

        item.activate(10, 20);
        item.secondary_activate(10, 20);
        item.context_menu(1800, 1060);
        item.scroll(1, "vertical".into());

        assert_eq!(
            drain(&mut rx),
            vec![
                TrayInput::Activate,
                TrayInput::Activate,
                TrayInput::OpenSwitchMenu {
                    position: Point::new(1800, 1060)
                },
            ]
        );
    }

    /// Test: Icon and tooltip properties follow the appearance.
    #[test]
    fn test_item_properties() {
        let (tx, _rx) = mpsc::unbounded();
        let item = StatusNotifierItem::new(appearance(), tx);

        assert_eq!(item.icon_name(), "fcitx-pinyin");
        assert_eq!(item.id(), APP_ID);
        assert_eq!(item.status(), "Active");
        assert!(!item.item_is_menu());

        let (icon, pixmaps, title, text) = item.tool_tip();
        assert_eq!(icon, "fcitx-pinyin");
        assert!(pixmaps.is_empty());
        assert_eq!(title, fl!("tray-title"));
        assert_eq!(text, "拼\nPinyin");
    }

    /// Test: The switch menu lists entries and forwards selections.
    #[test]
    fn test_switch_menu_interface() {
        let (tx, mut rx) = mpsc::unbounded();
        let mut menu = SwitchMenuInterface::new(tx);
        assert!(menu.entries().is_empty());

        menu.menu = Some(MenuRequest {
            items: vec![MenuItem {
                key: "/Fcitx/im/pinyin".into(),
                text: "Pinyin".into(),
                icon: None,
                status_tip: None,
            }],
            position: None,
        });
        menu.select("/Fcitx/im/pinyin".into());
        menu.quit();

        assert_eq!(
            menu.entries(),
            vec![("/Fcitx/im/pinyin".to_string(), "Pinyin".to_string())]
        );
        assert_eq!(
            drain(&mut rx),
            vec![TrayInput::Select("/Fcitx/im/pinyin".into()), TrayInput::Quit]
        );
    }

    /// Test: The item bus name embeds the process id.
    #[test]
    fn test_item_bus_name() {
        assert_eq!(item_bus_name(4242), "org.kde.StatusNotifierItem-4242-1");
    }

    /// Test: SNI constants match app_settings.
    #[test]
    fn test_sni_constants() {
        use crate::app_settings;

        assert_eq!(app_settings::SNI_WATCHER_SERVICE, "org.kde.StatusNotifierWatcher");
        assert_eq!(app_settings::SNI_WATCHER_PATH, "/StatusNotifierWatcher");
        assert_eq!(app_settings::SNI_ITEM_PATH, "/StatusNotifierItem");
    }

    /// Test: Tray registration either succeeds or reports why (requires D-Bus session).
    #[tokio::test]
    async fn test_tray_registration() {
        let (tx, _rx) = mpsc::unbounded();

        match TrayService::start(appearance(), tx).await {
            Ok(service) => tracing::info!("Tray registered: {:?}", service),
            Err(DbusError::ConnectionFailed(msg)) => {
                tracing::warn!("D-Bus session not available: {}", msg);
            }
            Err(DbusError::ServiceUnavailable) => {
                tracing::warn!("No StatusNotifierWatcher running");
            }
            Err(DbusError::RegistrationFailed(msg)) => {
                tracing::warn!("Tray registration issue: {}", msg);
            }
            Err(e) => panic!("Unexpected error during tray registration: {}", e),
        }
    }
}
