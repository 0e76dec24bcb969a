// SPDX-License-Identifier: GPL-3.0-only

//! Application wiring.
//!
//! [`Panel`] owns the [`PanelState`] and connects its listeners (presenter
//! and tray controller). [`run`] builds everything from a [`PanelConfig`],
//! starts the bus tasks and drives the main loop:
//!
//! ```text
//!  impanel2 / inputmethod signals ──PanelCall──► Panel ──► listeners
//!  StatusNotifierItem clicks ──────TrayInput───► Panel ──► TrayController
//!  TrayController / paging ────────OutboundCall──────────► deliver_outbound
//!  TrayController ─────────────────TrayUpdate────────────► run_tray
//! ```
//!
//! Panel state is only ever touched from the main task.

use crate::app_settings::CALL_CHANNEL_CAPACITY;
use crate::config::PanelConfig;
use crate::dbus::{self, DbusServer, OutboundCall, PageDirection, PanelCall};
use crate::geometry::GeometryResolver;
use crate::outputs::{DisplaySource, StaticDisplays, WaylandOutputs};
use crate::presenter::{PanelPresenter, TracingView};
use crate::state::{ListenerId, PanelState};
use crate::tray::item::{TrayService, run_tray};
use crate::tray::{TrayController, TrayInput, TrayUpdate};
use futures::StreamExt;
use futures::channel::mpsc;
use std::cell::RefCell;
use std::rc::Rc;

/// The panel core and its listeners.
pub struct Panel {
    state: PanelState,
    tray: Option<Rc<RefCell<TrayController>>>,
    outbound: mpsc::UnboundedSender<OutboundCall>,
    running: bool,
}

impl std::fmt::Debug for Panel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panel")
            .field("state", &self.state)
            .field("tray", &self.tray.is_some())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Panel {
    /// Creates a panel sending its outbound calls to `outbound`.
    pub fn new(outbound: mpsc::UnboundedSender<OutboundCall>) -> Self {
        Self {
            state: PanelState::new(),
            tray: None,
            outbound,
            running: true,
        }
    }

    /// Whether the main loop should keep going.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stops the main loop after the current message.
    pub fn quit(&mut self) {
        tracing::info!("Quit requested");
        self.running = false;
    }

    /// The panel state.
    pub fn state(&self) -> &PanelState {
        &self.state
    }

    /// Subscribes a presenter to state changes.
    pub fn attach_presenter(&mut self, mut presenter: PanelPresenter) -> ListenerId {
        self.state
            .subscribe(Box::new(move |event, model| presenter.handle_event(event, model)))
    }

    /// Subscribes a tray controller; its updates go to `updates`.
    ///
    /// The current appearance is sent right away.
    pub fn attach_tray(
        &mut self,
        controller: TrayController,
        updates: mpsc::UnboundedSender<TrayUpdate>,
    ) -> ListenerId {
        let initial = controller.appearance(self.state.model());
        if let Err(e) = updates.unbounded_send(TrayUpdate::Appearance(initial)) {
            tracing::warn!("Tray update channel closed: {}", e);
        }

        let controller = Rc::new(RefCell::new(controller));
        let listener = Rc::clone(&controller);
        self.tray = Some(controller);
        self.state.subscribe(Box::new(move |event, model| {
            let update = listener.borrow_mut().handle_event(event, model);
            if let Some(update) = update
                && let Err(e) = updates.unbounded_send(update)
            {
                tracing::warn!("Tray update channel closed: {}", e);
            }
        }))
    }

    /// Applies one call from the bus.
    pub fn handle_call(&mut self, call: PanelCall) {
        match call {
            PanelCall::SetSpotRect(caret) => self.state.set_caret_rect(caret),
            PanelCall::SetLookupTable(table) => self.state.set_lookup_table(table),
            PanelCall::UpdateAux(text) => self.state.set_aux_text(text),
            PanelCall::ShowAux(visible) => self.state.set_aux_visible(visible),
            PanelCall::ShowLookupTable(visible) => self.state.set_lookup_visible(visible),
            PanelCall::Enable(enabled) => self.state.set_enabled(enabled),
            PanelCall::RegisterProperties(entries) => self.state.register_properties(&entries),
            PanelCall::UpdateProperty(raw) => self.state.update_property(&raw),
            PanelCall::RemoveProperty(key) => self.state.remove_property(&key),
            PanelCall::ExecMenu(entries) => self.state.exec_menu(&entries),
            PanelCall::PageLookup(direction) => self.page_lookup(direction),
            PanelCall::Quit => self.quit(),
        }
    }

    /// Applies one interaction from the tray frontend.
    pub fn handle_tray_input(&mut self, input: TrayInput) {
        if input == TrayInput::Quit {
            self.quit();
            return;
        }
        match &self.tray {
            Some(tray) => tray.borrow_mut().handle_input(input),
            None => tracing::debug!("Tray input without a tray controller: {:?}", input),
        }
    }

    /// Asks the engine for another candidate page.
    ///
    /// Reached through `PageUp`/`PageDown` on the control interface.
    pub fn page_lookup(&self, direction: PageDirection) {
        let call = match direction {
            PageDirection::Up => OutboundCall::LookupTablePageUp,
            PageDirection::Down => OutboundCall::LookupTablePageDown,
        };
        if let Err(e) = self.outbound.unbounded_send(call) {
            tracing::error!("Failed to queue page request: {}", e);
        }
    }
}

/// Picks the display source: configured displays, else Wayland outputs.
fn display_source(config: &PanelConfig) -> Box<dyn DisplaySource> {
    if !config.displays.is_empty() {
        tracing::info!("Using {} configured display(s)", config.displays.len());
        return Box::new(StaticDisplays::new(config.static_displays()));
    }
    match WaylandOutputs::connect() {
        Ok(outputs) => Box::new(outputs),
        Err(e) => {
            tracing::warn!("{}; the panel will not follow the caret", e);
            Box::new(StaticDisplays::default())
        }
    }
}

/// Runs the panel until interrupted.
pub async fn run(config: PanelConfig) {
    let (call_tx, mut call_rx) = mpsc::channel::<PanelCall>(CALL_CHANNEL_CAPACITY);
    let (out_tx, out_rx) = mpsc::unbounded::<OutboundCall>();
    let (tray_tx, mut tray_rx) = mpsc::unbounded::<TrayInput>();

    let server = match DbusServer::start(call_tx.clone()).await {
        Ok(server) => Some(server),
        Err(e) => {
            tracing::error!("{}; running without the bus", e);
            None
        }
    };

    match &server {
        Some(server) => {
            if config.disable_input_method_watch {
                tracing::info!("Input method signal watch disabled");
            } else {
                let connection = server.connection().clone();
                let watch_tx = call_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = dbus::watch_input_method(connection, watch_tx).await {
                        tracing::error!("Input method watch stopped: {}", e);
                    }
                });
            }
            tokio::spawn(dbus::deliver_outbound(server.clone(), out_rx));
        }
        None => {
            tokio::spawn(out_rx.for_each(|call| async move {
                tracing::debug!("No bus, dropped {:?}", call);
            }));
        }
    }
    drop(call_tx);

    let mut panel = Panel::new(out_tx);

    let presenter = PanelPresenter::new(
        Box::new(TracingView::new(config.panel_size.into())),
        display_source(&config),
        GeometryResolver::new(config.fallback_scale(), config.fallback_line_height),
    );
    panel.attach_presenter(presenter);

    if config.disable_tray {
        tracing::info!("Tray disabled");
    } else {
        let controller = TrayController::new(config.tracked_key.clone(), panel.outbound.clone());
        let appearance = controller.appearance(panel.state().model());
        match TrayService::start(appearance, tray_tx.clone()).await {
            Ok(service) => {
                let (update_tx, update_rx) = mpsc::unbounded::<TrayUpdate>();
                tokio::spawn(run_tray(service, update_rx));
                panel.attach_tray(controller, update_tx);
            }
            Err(e) => tracing::warn!("Tray disabled: {}", e),
        }
    }
    drop(tray_tx);

    if let Some(server) = &server
        && let Err(e) = server.announce().await
    {
        tracing::warn!("Could not announce the panel: {}", e);
    }

    tracing::info!("Panel running");
    while panel.is_running() {
        tokio::select! {
            Some(call) = call_rx.next() => panel.handle_call(call),
            Some(input) = tray_rx.next() => panel.handle_tray_input(input),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }
    tracing::info!("Panel stopped");
}

// ============================================================================
// Tests
// ============================================================================
