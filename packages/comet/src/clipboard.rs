//! Direct-call interceptors for cut, copy and paste.
//!
//! The notebook's cell clipboard methods are called directly by menus and
//! keyboard handlers, not through the action dispatcher, so they get their
//! own decorator. These operations are synchronous: every call is captured
//! right after it returns.
//!
//! # Duplicate Records
//!
//! A cut is a copy followed by a delete. [`TrackedClipboard`] runs the copy
//! through its own tracked `copy_cell`, so one cut produces two records,
//! `copy-cell` then `cut-cell`. The [`ClipboardListener`] reports system
//! clipboard events in command mode on top of that. Neither source is
//! deduplicated, and neither is gated by the tracking toggle. Both stop
//! capturing once the session is closed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::CaptureContext;
use crate::document::EditMode;
use crate::tracker::Tracker;

pub const CUT_CELL: &str = "cut-cell";
pub const COPY_CELL: &str = "copy-cell";
pub const PASTE_CELL_ABOVE: &str = "paste-cell-above";
pub const PASTE_CELL_BELOW: &str = "paste-cell-below";
pub const PASTE_CELL_REPLACE: &str = "paste-cell-replace";

/// The host's cell clipboard methods.
pub trait CellClipboard: Send + Sync {
    /// Copy the selected cells to the cell clipboard.
    fn copy_cell(&self);

    /// Delete the selected cells (the removal half of a cut).
    fn delete_cells(&self);

    fn paste_cell_above(&self);

    fn paste_cell_below(&self);

    /// Replace the selected cells with the clipboard contents.
    fn paste_cell_replace(&self);

    /// Copy, then delete.
    fn cut_cell(&self) {
        cut_via(self);
    }
}

/// Cut expressed through `copy_cell` and `delete_cells` of `clipboard`.
pub fn cut_via<C: CellClipboard + ?Sized>(clipboard: &C) {
    clipboard.copy_cell();
    clipboard.delete_cells();
}

/// A cell clipboard with tracking wrapped around it.
pub struct TrackedClipboard<C> {
    inner: C,
    tracker: Tracker,
}

impl<C: CellClipboard> TrackedClipboard<C> {
    pub fn new(inner: C, tracker: Tracker) -> Self {
        Self { inner, tracker }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn around(&self, name: &str, call: impl FnOnce()) {
        if self.tracker.is_closed() {
            call();
            return;
        }
        let ctx = CaptureContext::before(name, &**self.tracker.document());
        call();
        self.tracker.events().capture(ctx);
    }
}

impl<C: CellClipboard> CellClipboard for TrackedClipboard<C> {
    fn copy_cell(&self) {
        self.around(COPY_CELL, || self.inner.copy_cell());
    }

    fn delete_cells(&self) {
        self.inner.delete_cells();
    }

    fn paste_cell_above(&self) {
        self.around(PASTE_CELL_ABOVE, || self.inner.paste_cell_above());
    }

    fn paste_cell_below(&self) {
        self.around(PASTE_CELL_BELOW, || self.inner.paste_cell_below());
    }

    fn paste_cell_replace(&self) {
        self.around(PASTE_CELL_REPLACE, || self.inner.paste_cell_replace());
    }

    fn cut_cell(&self) {
        // copy goes through the tracked copy_cell on purpose
        self.around(CUT_CELL, || cut_via(self));
    }
}

impl<C> std::fmt::Debug for TrackedClipboard<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedClipboard")
            .field("clipboard", &std::any::type_name::<C>())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// System Clipboard Listener
// =============================================================================

/// A system clipboard event observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardEvent {
    Cut,
    Copy,
    Paste,
}

impl ClipboardEvent {
    /// Action name reported for this event.
    pub fn action_name(&self) -> &'static str {
        match self {
            ClipboardEvent::Cut => CUT_CELL,
            ClipboardEvent::Copy => COPY_CELL,
            ClipboardEvent::Paste => PASTE_CELL_BELOW,
        }
    }
}

/// Reports system clipboard events that act on whole cells.
#[derive(Debug, Clone)]
pub struct ClipboardListener {
    tracker: Tracker,
}

impl ClipboardListener {
    pub fn new(tracker: Tracker) -> Self {
        Self { tracker }
    }

    /// Handle a clipboard event. Returns true if a record was sent.
    ///
    /// Events in edit mode act on cell text, not cells, and are ignored.
    pub fn on_clipboard_event(&self, event: ClipboardEvent) -> bool {
        if self.tracker.is_closed() {
            return false;
        }
        let document = self.tracker.document();
        if document.mode() != EditMode::Command {
            debug!(event = ?event, "clipboard event in edit mode ignored");
            return false;
        }

        let ctx = CaptureContext::before(event.action_name(), &**document);
        self.tracker.events().capture(ctx);
        true
    }
}
