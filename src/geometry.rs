// SPDX-License-Identifier: GPL-3.0-only

//! Caret-to-screen placement.
//!
//! Engines report the caret rectangle in whatever space their client lives
//! in. Some report physical pixels, some report logical pixels, and on a
//! mixed-DPI desktop the two differ per display. [`GeometryResolver`] maps
//! the raw caret onto one display and returns the logical top-left point at
//! which the panel should be placed.
//!
//! # Resolution Order
//!
//! 1. Physical pass: the first display whose physical rectangle
//!    (`origin * scale`, `size * scale`) contains the raw point. The caret's
//!    offset from that rectangle is divided by the display's scale and added
//!    to its logical origin.
//! 2. Logical pass: the display whose logical rectangle contains the raw
//!    point, else the primary display. The raw point is divided by the scale
//!    and added to the display's logical origin.
//!
//! Both passes are needed: collapsing them into a single interpretation
//! misplaces the panel for one class of engines.
//!
//! # Placement
//!
//! The panel goes [`CARET_GAP`] logical pixels below the caret and is then
//! clamped into the chosen display's work area. An axis on which the panel
//! does not fit is pinned to the work area origin.

use crate::app_settings::{CARET_GAP, DEFAULT_LINE_HEIGHT};
use crate::state::CaretRect;

// ============================================================================
// Types
// ============================================================================

/// An integer point in logical coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An integer size in logical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// An integer rectangle in logical coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open containment: the right and bottom edges are outside.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= f64::from(self.x)
            && x < f64::from(self.x) + f64::from(self.width)
            && y >= f64::from(self.y)
            && y < f64::from(self.y) + f64::from(self.height)
    }
}

/// Per-axis device pixel ratio of a display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Default for Scale {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl Scale {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn uniform(factor: f64) -> Self {
        Self { x: factor, y: factor }
    }

    /// Replaces non-positive or non-finite factors with `fallback`'s.
    #[must_use]
    pub fn or(self, fallback: Scale) -> Scale {
        let pick = |value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else if fallback.is_finite() && fallback > 0.0 {
                fallback
            } else {
                1.0
            }
        };
        Scale {
            x: pick(self.x, fallback.x),
            y: pick(self.y, fallback.y),
        }
    }
}

/// One physical output as seen by the compositor.
#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    /// Output name for diagnostics (e.g. `DP-1`).
    pub name: String,
    /// Top-left corner in the logical desktop space.
    pub origin: Point,
    /// Logical size.
    pub size: Size,
    /// Device pixel ratio.
    pub scale: Scale,
    /// Area available for windows, in logical coordinates.
    pub work_area: Rect,
    /// Whether this is the primary output.
    pub primary: bool,
}

impl Display {
    /// Creates a display whose work area is its whole geometry.
    pub fn new(name: impl Into<String>, origin: Point, size: Size, scale: Scale) -> Self {
        Self {
            name: name.into(),
            origin,
            size,
            scale,
            work_area: Rect::new(origin.x, origin.y, size.width, size.height),
            primary: false,
        }
    }

    /// Restricts the work area (panels, docks).
    #[must_use]
    pub fn with_work_area(mut self, work_area: Rect) -> Self {
        self.work_area = work_area;
        self
    }

    /// Marks the display as primary.
    #[must_use]
    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// Logical geometry.
    #[must_use]
    pub fn geometry(&self) -> Rect {
        Rect::new(self.origin.x, self.origin.y, self.size.width, self.size.height)
    }

    /// Whether the physical rectangle of this display contains the point.
    ///
    /// Edges are inclusive so a caret on a shared border belongs to the
    /// first display enumerated.
    fn physical_contains(&self, scale: Scale, x: f64, y: f64) -> bool {
        let left = f64::from(self.origin.x) * scale.x;
        let top = f64::from(self.origin.y) * scale.y;
        let right = left + f64::from(self.size.width) * scale.x;
        let bottom = top + f64::from(self.size.height) * scale.y;
        x >= left && x <= right && y >= top && y <= bottom
    }
}

/// The outcome of a placement computation.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Where the panel's top-left corner goes.
    pub point: Point,
    /// Index of the chosen display.
    pub display: usize,
    /// Whether the display was found by the physical pass.
    pub physical_match: bool,
    /// Scale used for the conversion.
    pub scale: Scale,
    /// Caret position in logical coordinates, before the gap and clamping.
    pub caret_logical: (f64, f64),
    /// Caret height in logical pixels.
    pub caret_height: i32,
}

// ============================================================================
// Resolver
// ============================================================================

/// Maps caret rectangles to panel placements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryResolver {
    /// Scale used when a display reports an unusable one.
    pub fallback_scale: Scale,
    /// Caret height used when the engine reports zero.
    pub fallback_line_height: i32,
}

impl Default for GeometryResolver {
    fn default() -> Self {
        Self {
            fallback_scale: Scale::default(),
            fallback_line_height: DEFAULT_LINE_HEIGHT,
        }
    }
}

impl GeometryResolver {
    /// Creates a resolver with explicit fallbacks.
    #[must_use]
    pub fn new(fallback_scale: Scale, fallback_line_height: i32) -> Self {
        Self {
            fallback_scale,
            fallback_line_height,
        }
    }

    /// Computes where a panel of `panel` size should be placed for `caret`.
    ///
    /// Returns `None` for the "no caret yet" sentinel or when there is no
    /// display at all.
    #[must_use]
    pub fn resolve(&self, caret: &CaretRect, displays: &[Display], panel: Size) -> Option<Placement> {
        if caret.is_unset() || displays.is_empty() {
            return None;
        }

        let raw_x = f64::from(caret.x);
        let raw_y = f64::from(caret.y);

        let (index, scale, logical, physical_match) = self
            .physical_match(displays, raw_x, raw_y)
            .map(|(index, scale, logical)| (index, scale, logical, true))
            .unwrap_or_else(|| {
                let (index, scale, logical) = self.logical_match(displays, raw_x, raw_y);
                (index, scale, logical, false)
            });
        let chosen = &displays[index];

        let caret_height = if caret.h > 0 {
            (f64::from(caret.h) / scale.y).round() as i32
        } else {
            self.fallback_line_height
        };

        let below = i64::from(logical.1.round() as i32)
            + i64::from(caret_height)
            + i64::from(CARET_GAP);
        let target = Point::new(logical.0.round() as i32, saturate(below));
        let point = clamp_to_area(target, panel, chosen.work_area);

        tracing::debug!(
            "Placement on {:?}: raw=({}, {}) scale=({}, {}) logical=({:.1}, {:.1}) \
             caret_height={} target={:?} clamped={:?} panel={:?}",
            chosen.name,
            caret.x,
            caret.y,
            scale.x,
            scale.y,
            logical.0,
            logical.1,
            caret_height,
            target,
            point,
            panel
        );

        Some(Placement {
            point,
            display: index,
            physical_match,
            scale,
            caret_logical: logical,
            caret_height,
        })
    }

    /// First display whose physical rectangle contains the raw point.
    fn physical_match(
        &self,
        displays: &[Display],
        raw_x: f64,
        raw_y: f64,
    ) -> Option<(usize, Scale, (f64, f64))> {
        displays.iter().enumerate().find_map(|(index, display)| {
            let scale = display.scale.or(self.fallback_scale);
            if !display.physical_contains(scale, raw_x, raw_y) {
                return None;
            }
            let offset_x = raw_x - f64::from(display.origin.x) * scale.x;
            let offset_y = raw_y - f64::from(display.origin.y) * scale.y;
            let logical = (
                f64::from(display.origin.x) + offset_x / scale.x,
                f64::from(display.origin.y) + offset_y / scale.y,
            );
            Some((index, scale, logical))
        })
    }

    /// Display logically containing the raw point, else the primary display.
    fn logical_match(&self, displays: &[Display], raw_x: f64, raw_y: f64) -> (usize, Scale, (f64, f64)) {
        let index = displays
            .iter()
            .position(|display| display.geometry().contains(raw_x, raw_y))
            .unwrap_or_else(|| primary_index(displays));
        let display = &displays[index];
        let scale = display.scale.or(self.fallback_scale);
        let logical = (
            f64::from(display.origin.x) + raw_x / scale.x,
            f64::from(display.origin.y) + raw_y / scale.y,
        );
        (index, scale, logical)
    }
}

/// Index of the primary display: the first flagged one, else the first.
#[must_use]
pub fn primary_index(displays: &[Display]) -> usize {
    displays.iter().position(|display| display.primary).unwrap_or(0)
}

/// Clamps `target` so a panel of `panel` size stays inside `area`.
#[must_use]
pub fn clamp_to_area(target: Point, panel: Size, area: Rect) -> Point {
    let clamp_axis = |value: i32, start: i32, extent: i32, size: i32| {
        if extent <= size {
            return start;
        }
        let end = i64::from(start) + i64::from(extent) - i64::from(size);
        saturate(i64::from(value).clamp(i64::from(start), end))
    };
    Point::new(
        clamp_axis(target.x, area.x, area.width, panel.width),
        clamp_axis(target.y, area.y, area.height, panel.height),
    )
}

/// Narrows to `i32`, pinning out-of-range values to the nearest bound.
fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

// ============================================================================
// Tests
// ============================================================================
