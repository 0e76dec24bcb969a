// SPDX-License-Identifier: GPL-3.0-only

//! Display enumeration.
//!
//! [`DisplaySource`] is the seam between placement and the platform. Two
//! sources exist:
//!
//! - [`WaylandOutputs`] binds every `wl_output` global and converts the
//!   reported position, current mode, integer scale and transform into a
//!   logical [`Display`]. Events are dispatched on a background thread and
//!   the latest list is published through a watch channel.
//! - [`StaticDisplays`] serves the displays from the configuration file.
//!
//! `wl_output` carries no work area, so Wayland displays use their full
//! geometry.

use crate::geometry::{Display, Point, Scale, Size};
use std::fmt;
use tokio::sync::watch;
use wayland_client::globals::{GlobalListContents, registry_queue_init};
use wayland_client::protocol::{wl_output, wl_registry};
use wayland_client::{Connection, Dispatch, EventQueue, QueueHandle, WEnum};

/// Highest `wl_output` version we understand (adds the `name` event).
const WL_OUTPUT_VERSION: u32 = 4;

/// Something that knows the current displays.
pub trait DisplaySource {
    /// The current displays in enumeration order.
    fn displays(&mut self) -> Vec<Display>;
}

/// A fixed display list.
#[derive(Debug, Clone, Default)]
pub struct StaticDisplays {
    displays: Vec<Display>,
}

impl StaticDisplays {
    pub fn new(displays: Vec<Display>) -> Self {
        Self { displays }
    }
}

impl DisplaySource for StaticDisplays {
    fn displays(&mut self) -> Vec<Display> {
        self.displays.clone()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from the Wayland display source.
#[derive(Debug, Clone)]
pub enum OutputError {
    /// No compositor to connect to.
    ConnectFailed(String),
    /// The connection broke while reading events.
    DispatchFailed(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::ConnectFailed(msg) => write!(f, "Wayland connection failed: {}", msg),
            OutputError::DispatchFailed(msg) => write!(f, "Wayland dispatch failed: {}", msg),
        }
    }
}

impl std::error::Error for OutputError {}

// ============================================================================
// Wayland
// ============================================================================

/// What one `wl_output` has told us so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    /// Registry name of the global.
    pub global: u32,
    pub name: String,
    /// Position in the compositor space.
    pub x: i32,
    pub y: i32,
    /// Current mode in hardware pixels, before transform.
    pub mode: Option<(i32, i32)>,
    pub scale: i32,
    pub transform: wl_output::Transform,
}

impl OutputInfo {
    fn new(global: u32) -> Self {
        Self {
            global,
            name: String::new(),
            x: 0,
            y: 0,
            mode: None,
            scale: 1,
            transform: wl_output::Transform::Normal,
        }
    }

    /// Converts to a logical display; `None` until a current mode is known.
    #[must_use]
    pub fn to_display(&self) -> Option<Display> {
        let (mode_w, mode_h) = self.mode?;
        let (width, height) = match self.transform {
            wl_output::Transform::_90
            | wl_output::Transform::_270
            | wl_output::Transform::Flipped90
            | wl_output::Transform::Flipped270 => (mode_h, mode_w),
            _ => (mode_w, mode_h),
        };
        let scale = self.scale.max(1);
        let name = if self.name.is_empty() {
            format!("wl_output-{}", self.global)
        } else {
            self.name.clone()
        };
        Some(Display::new(
            name,
            Point::new(self.x, self.y),
            Size::new(width / scale, height / scale),
            Scale::uniform(f64::from(scale)),
        ))
    }
}

/// Dispatch state collecting output information.
#[derive(Debug, Default)]
struct OutputState {
    outputs: Vec<OutputInfo>,
}

impl OutputState {
    fn entry(&mut self, global: u32) -> &mut OutputInfo {
        let index = match self.outputs.iter().position(|info| info.global == global) {
            Some(index) => index,
            None => {
                self.outputs.push(OutputInfo::new(global));
                self.outputs.len() - 1
            }
        };
        &mut self.outputs[index]
    }

    fn displays(&self) -> Vec<Display> {
        self.outputs.iter().filter_map(OutputInfo::to_display).collect()
    }

    fn bind(registry: &wl_registry::WlRegistry, global: u32, version: u32, qh: &QueueHandle<Self>) {
        tracing::debug!("Binding wl_output global {}", global);
        registry.bind::<wl_output::WlOutput, _, _>(global, version.min(WL_OUTPUT_VERSION), qh, global);
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for OutputState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } if interface == "wl_output" => {
                Self::bind(registry, name, version, qh);
            }
            wl_registry::Event::GlobalRemove { name } => {
                state.outputs.retain(|info| info.global != name);
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, u32> for OutputState {
    fn event(
        state: &mut Self,
        _output: &wl_output::WlOutput,
        event: wl_output::Event,
        global: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let info = state.entry(*global);
        match event {
            wl_output::Event::Geometry { x, y, transform, .. } => {
                info.x = x;
                info.y = y;
                if let WEnum::Value(transform) = transform {
                    info.transform = transform;
                }
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                ..
            } => {
                if let WEnum::Value(flags) = flags
                    && flags.contains(wl_output::Mode::Current)
                {
                    info.mode = Some((width, height));
                }
            }
            wl_output::Event::Scale { factor } => info.scale = factor,
            wl_output::Event::Name { name } => info.name = name,
            _ => {}
        }
    }
}

/// Displays read from the Wayland compositor.
///
/// A background thread dispatches output events and publishes the display
/// list, so reading it never waits on the compositor.
#[derive(Debug)]
pub struct WaylandOutputs {
    displays: watch::Receiver<Vec<Display>>,
}

impl WaylandOutputs {
    /// Connects to the compositor from `WAYLAND_DISPLAY` and binds all outputs.
    ///
    /// The initial output list is read before returning.
    pub fn connect() -> Result<Self, OutputError> {
        let connection =
            Connection::connect_to_env().map_err(|e| OutputError::ConnectFailed(e.to_string()))?;
        let (globals, mut queue) = registry_queue_init::<OutputState>(&connection)
            .map_err(|e| OutputError::ConnectFailed(e.to_string()))?;
        let qh = queue.handle();

        globals.contents().with_list(|list| {
            for global in list.iter().filter(|global| global.interface == "wl_output") {
                OutputState::bind(globals.registry(), global.name, global.version, &qh);
            }
        });

        let mut state = OutputState::default();
        queue
            .roundtrip(&mut state)
            .map_err(|e| OutputError::DispatchFailed(e.to_string()))?;
        let initial = state.displays();
        tracing::info!("Found {} Wayland output(s)", initial.len());

        let (tx, rx) = watch::channel(initial);
        std::thread::Builder::new()
            .name("wayland-outputs".into())
            .spawn(move || watch_outputs(queue, state, tx))
            .map_err(|e| OutputError::ConnectFailed(e.to_string()))?;

        Ok(Self::from_receiver(rx))
    }

    fn from_receiver(displays: watch::Receiver<Vec<Display>>) -> Self {
        Self { displays }
    }
}

impl DisplaySource for WaylandOutputs {
    fn displays(&mut self) -> Vec<Display> {
        self.displays.borrow_and_update().clone()
    }
}

/// Dispatches output events until the connection breaks or nobody listens.
fn watch_outputs(
    mut queue: EventQueue<OutputState>,
    mut state: OutputState,
    tx: watch::Sender<Vec<Display>>,
) {
    loop {
        if let Err(e) = queue.blocking_dispatch(&mut state) {
            tracing::warn!("Wayland output watch stopped, keeping the last display list: {}", e);
            return;
        }
        if tx.is_closed() {
            return;
        }
        if publish(&tx, state.displays()) {
            tracing::info!("Wayland outputs changed: {} display(s)", tx.borrow().len());
        }
    }
}

/// Replaces the published list; returns whether it changed.
fn publish(tx: &watch::Sender<Vec<Display>>, displays: Vec<Display>) -> bool {
    tx.send_if_modified(|current| {
        if *current == displays {
            return false;
        }
        *current = displays;
        true
    })
}

// ============================================================================
// Tests
// ============================================================================
