//! Tracking toggle and session lifecycle.
//!
//! The toggle lives in the document's own metadata so it travels with the
//! file. It gates the dispatch interceptor only: clipboard interceptors and
//! session events are sent regardless of its value.
//!
//! ```text
//! open ──► notebook-opened ──► (toggle ──► tracking-on / tracking-off)* ──► close ──► notebook-closed
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::builder::EventBuilder;
use crate::correlator::{CancelReason, Correlator};
use crate::document::DocumentFacade;

/// Metadata key holding the tracking flag.
pub const TRACKING_METADATA_KEY: &str = "comet_tracking";

pub const NOTEBOOK_OPENED: &str = "notebook-opened";
pub const NOTEBOOK_CLOSED: &str = "notebook-closed";
pub const TRACKING_ON: &str = "tracking-on";
pub const TRACKING_OFF: &str = "tracking-off";

/// Reads and writes the persisted tracking flag.
#[derive(Clone)]
pub struct TrackingToggle {
    document: Arc<dyn DocumentFacade>,
}

impl TrackingToggle {
    pub fn new(document: Arc<dyn DocumentFacade>) -> Self {
        Self { document }
    }

    /// Write the default (enabled) if the flag is absent. Returns the flag.
    pub fn ensure_initialized(&self) -> bool {
        match self.document.metadata_flag(TRACKING_METADATA_KEY) {
            Some(enabled) => enabled,
            None => {
                self.document.set_metadata_flag(TRACKING_METADATA_KEY, true);
                true
            }
        }
    }

    /// Whether dispatched actions are tracked. Absent means enabled.
    pub fn is_enabled(&self) -> bool {
        self.document
            .metadata_flag(TRACKING_METADATA_KEY)
            .unwrap_or(true)
    }

    pub fn set(&self, enabled: bool) {
        self.document.set_metadata_flag(TRACKING_METADATA_KEY, enabled);
    }
}

impl std::fmt::Debug for TrackingToggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingToggle")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// One open document's tracking session.
pub struct Session {
    toggle: TrackingToggle,
    builder: EventBuilder,
    correlator: Arc<Correlator>,
    closed: Arc<AtomicBool>,
}

impl Session {
    /// Initialise the toggle and send `notebook-opened`.
    ///
    /// `closed` is shared with the interceptors, which stop capturing once
    /// it is set.
    pub fn open(
        builder: EventBuilder,
        correlator: Arc<Correlator>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        let toggle = TrackingToggle::new(builder.document().clone());
        let enabled = toggle.ensure_initialized();

        info!(
            document = %builder.document().location(),
            tracking = enabled,
            "tracking session opened"
        );
        builder.emit(NOTEBOOK_OPENED);

        Self {
            toggle,
            builder,
            correlator,
            closed,
        }
    }

    pub fn toggle_state(&self) -> &TrackingToggle {
        &self.toggle
    }

    pub fn is_tracking(&self) -> bool {
        self.toggle.is_enabled()
    }

    /// Flip the tracking flag and report the new state. Returns the new state.
    ///
    /// After close the flag still flips but nothing is sent.
    pub fn toggle(&self) -> bool {
        let enabled = !self.toggle.is_enabled();
        self.toggle.set(enabled);

        info!(tracking = enabled, "tracking toggled");
        if !self.is_closed() {
            self.builder
                .emit(if enabled { TRACKING_ON } else { TRACKING_OFF });
        }
        enabled
    }

    /// Callback for the toolbar button.
    pub fn toggle_callback(self: &Arc<Self>) -> impl Fn() + Send + Sync + 'static {
        let session = Arc::clone(self);
        move || {
            session.toggle();
        }
    }

    /// Send `notebook-closed` and abandon armed captures.
    ///
    /// Only the first call does anything. The send is best-effort: the
    /// process may exit before it completes.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let cancelled = self.correlator.cancel_all(CancelReason::DocumentClosed);
        info!(cancelled, "tracking session closed");
        self.builder.emit(NOTEBOOK_CLOSED);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hook for the host's unload signal.
    pub fn unload_hook(self: &Arc<Self>) -> Box<dyn FnOnce() + Send + 'static> {
        let session = Arc::clone(self);
        Box::new(move || session.close())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("toggle", &self.toggle)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CaptureContext;
    use crate::memory::MemoryNotebook;
    use crate::signal::SettleSignal;
    use crate::testing::RecordingTransport;

    fn open(notebook: &Arc<MemoryNotebook>) -> (Arc<RecordingTransport>, Arc<Correlator>, Arc<Session>) {
        let transport = Arc::new(RecordingTransport::new());
        let builder = EventBuilder::new(notebook.clone(), transport.clone());
        let correlator = Arc::new(Correlator::new(builder.clone(), None));
        let session = Arc::new(Session::open(
            builder,
            correlator.clone(),
            Arc::new(AtomicBool::new(false)),
        ));
        (transport, correlator, session)
    }

    #[test]
    fn test_open_initializes_flag_and_emits_once() {
        let notebook = Arc::new(MemoryNotebook::sample());
        notebook.select(2);
        assert_eq!(notebook.metadata_flag(TRACKING_METADATA_KEY), None);

        let (transport, _, session) = open(&notebook);

        assert_eq!(notebook.metadata_flag(TRACKING_METADATA_KEY), Some(true));
        assert!(session.is_tracking());
        let records = transport.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, NOTEBOOK_OPENED);
        assert_eq!(records[0].index, 0);
        assert_eq!(records[0].indices, vec![0]);
    }

    #[test]
    fn test_open_keeps_persisted_disabled_flag() {
        let notebook = Arc::new(MemoryNotebook::sample());
        notebook.set_metadata_flag(TRACKING_METADATA_KEY, false);

        let (_, _, session) = open(&notebook);
        assert!(!session.is_tracking());
    }

    #[test]
    fn test_toggle_emits_new_state() {
        let notebook = Arc::new(MemoryNotebook::sample());
        let (transport, _, session) = open(&notebook);

        assert!(!session.toggle());
        assert_eq!(notebook.metadata_flag(TRACKING_METADATA_KEY), Some(false));
        assert!(session.toggle());

        assert_eq!(
            transport.names(),
            vec![NOTEBOOK_OPENED, TRACKING_OFF, TRACKING_ON]
        );
    }

    #[test]
    fn test_toggle_callback_flips_flag() {
        let notebook = Arc::new(MemoryNotebook::sample());
        let (_, _, session) = open(&notebook);

        let on_click = session.toggle_callback();
        on_click();
        assert!(!session.is_tracking());
        on_click();
        assert!(session.is_tracking());
    }

    #[test]
    fn test_close_cancels_armed_and_emits_once() {
        let notebook = Arc::new(MemoryNotebook::sample());
        let (transport, correlator, session) = open(&notebook);

        correlator.arm(CaptureContext::before("run-cell", &*notebook));
        let unload = session.unload_hook();
        unload();
        session.close();

        assert!(session.is_closed());
        assert_eq!(correlator.armed_count(), 0);
        assert!(correlator.settle(&SettleSignal::settled()).is_empty());
        assert_eq!(transport.names(), vec![NOTEBOOK_OPENED, NOTEBOOK_CLOSED]);
    }

    #[test]
    fn test_toggle_after_close_sends_nothing() {
        let notebook = Arc::new(MemoryNotebook::sample());
        let (transport, _, session) = open(&notebook);

        session.close();
        assert!(!session.toggle());

        assert_eq!(transport.names(), vec![NOTEBOOK_OPENED, NOTEBOOK_CLOSED]);
    }
}
