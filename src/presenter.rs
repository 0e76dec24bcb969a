// SPDX-License-Identifier: GPL-3.0-only

//! Candidate panel presentation.
//!
//! [`PanelPresenter`] is a [`PanelState`](crate::state::PanelState) listener
//! that drives a [`PanelView`]: it refreshes the content when the lookup
//! table or aux text change, shows or hides the view when the derived
//! visibility flips, and moves it under the caret whenever a caret
//! rectangle arrives.

use crate::geometry::{GeometryResolver, Point, Size};
use crate::outputs::DisplaySource;
use crate::state::{PanelEvent, PanelModel};

/// Something that can display the candidate panel.
pub trait PanelView {
    /// Current size of the panel in logical pixels.
    fn size_hint(&self) -> Size;

    /// Redraws the candidates and aux text.
    fn render(&mut self, model: &PanelModel);

    /// Shows or hides the panel.
    fn set_visible(&mut self, visible: bool);

    /// Moves the panel's top-left corner.
    fn move_to(&mut self, point: Point);
}

/// A view that writes what it would show to the log.
#[derive(Debug, Clone)]
pub struct TracingView {
    size: Size,
}

impl TracingView {
    pub fn new(size: Size) -> Self {
        Self { size }
    }
}

impl PanelView for TracingView {
    fn size_hint(&self) -> Size {
        self.size
    }

    fn render(&mut self, model: &PanelModel) {
        if model.aux_has_content() {
            tracing::info!("Aux: {}", model.aux.text);
        }
        if !model.lookup_has_content() {
            return;
        }
        let row: Vec<String> = model
            .lookup
            .candidates()
            .map(|candidate| {
                let marker = if candidate.selected { "*" } else { "" };
                if candidate.comment.is_empty() {
                    format!("{marker}{}{}", candidate.label, candidate.text)
                } else {
                    format!("{marker}{}{} ({})", candidate.label, candidate.text, candidate.comment)
                }
            })
            .collect();
        tracing::info!(
            "Candidates{}{}: {}",
            if model.lookup.has_prev { " <" } else { "" },
            if model.lookup.has_next { " >" } else { "" },
            row.join("  ")
        );
    }

    fn set_visible(&mut self, visible: bool) {
        tracing::info!("Panel {}", if visible { "shown" } else { "hidden" });
    }

    fn move_to(&mut self, point: Point) {
        tracing::info!("Panel moved to ({}, {})", point.x, point.y);
    }
}

/// Keeps a [`PanelView`] in sync with the panel state.
pub struct PanelPresenter {
    view: Box<dyn PanelView>,
    displays: Box<dyn DisplaySource>,
    resolver: GeometryResolver,
    visible: bool,
    warned_no_displays: bool,
}

impl std::fmt::Debug for PanelPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelPresenter")
            .field("resolver", &self.resolver)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

impl PanelPresenter {
    pub fn new(
        view: Box<dyn PanelView>,
        displays: Box<dyn DisplaySource>,
        resolver: GeometryResolver,
    ) -> Self {
        Self {
            view,
            displays,
            resolver,
            visible: false,
            warned_no_displays: false,
        }
    }

    /// Whether the view is currently shown.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Reacts to a state notification.
    pub fn handle_event(&mut self, event: &PanelEvent, model: &PanelModel) {
        match event {
            PanelEvent::LookupChanged | PanelEvent::AuxChanged => {
                self.view.render(model);
                self.update_visibility(model);
            }
            PanelEvent::LookupVisibleChanged | PanelEvent::EnabledChanged => {
                self.update_visibility(model);
            }
            PanelEvent::CaretChanged => self.reposition(model),
            _ => {}
        }
    }

    fn update_visibility(&mut self, model: &PanelModel) {
        let show = model.should_show();
        if show == self.visible {
            return;
        }
        self.visible = show;
        if show {
            self.view.render(model);
            self.reposition(model);
        }
        self.view.set_visible(show);
    }

    fn reposition(&mut self, model: &PanelModel) {
        if model.caret.is_unset() {
            return;
        }
        let displays = self.displays.displays();
        if displays.is_empty() {
            if !self.warned_no_displays {
                tracing::warn!("No displays known, the panel will not follow the caret");
                self.warned_no_displays = true;
            }
            return;
        }
        if let Some(placement) = self
            .resolver
            .resolve(&model.caret, &displays, self.view.size_hint())
        {
            self.view.move_to(placement.point);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
