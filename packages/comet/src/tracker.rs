//! Tracker - the shared wiring behind every interceptor.
//!
//! A `Tracker` is built once per open document and handed to the host's
//! extension points:
//!
//! ```ignore
//! let tracker = Tracker::builder(document, transport)
//!     .with_config(&config)
//!     .build();
//!
//! let session = tracker.open_session();            // notebook-opened
//! let actions = tracker.intercept(host_actions);   // dispatch interceptor
//! let clipboard = tracker.track_clipboard(host_clipboard);
//! let _listener = tracker.spawn_listener(&kernel_signals);
//!
//! host.on_unload(session.unload_hook());
//! ```
//!
//! Cloning is cheap; all clones share the same correlator, toggle and
//! closed flag. Once the session is closed every interceptor forwards calls
//! without capturing, so `notebook-closed` is the last record sent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::action::ActionCatalog;
use crate::builder::EventBuilder;
use crate::clipboard::{CellClipboard, ClipboardListener, TrackedClipboard};
use crate::config::CometConfig;
use crate::core::CaptureToken;
use crate::correlator::Correlator;
use crate::document::DocumentFacade;
use crate::interceptor::{ActionHandler, Intercepted};
use crate::session::{Session, TrackingToggle};
use crate::signal::{SettleSignal, SignalBus};
use crate::transport::Transport;

#[derive(Clone)]
pub struct Tracker {
    document: Arc<dyn DocumentFacade>,
    catalog: Arc<ActionCatalog>,
    events: EventBuilder,
    correlator: Arc<Correlator>,
    toggle: TrackingToggle,
    closed: Arc<AtomicBool>,
}

impl Tracker {
    /// Start building a tracker for `document` sending through `transport`.
    pub fn builder(
        document: Arc<dyn DocumentFacade>,
        transport: Arc<dyn Transport>,
    ) -> TrackerBuilder {
        TrackerBuilder::new(document, transport)
    }

    pub fn document(&self) -> &Arc<dyn DocumentFacade> {
        &self.document
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    /// The event builder records are sent through.
    pub fn events(&self) -> &EventBuilder {
        &self.events
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn toggle(&self) -> &TrackingToggle {
        &self.toggle
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wrap the host's action handler.
    pub fn intercept<H: ActionHandler>(&self, handler: H) -> Intercepted<H> {
        Intercepted::new(handler, self.clone())
    }

    /// Wrap the host's cell clipboard.
    pub fn track_clipboard<C: CellClipboard>(&self, clipboard: C) -> TrackedClipboard<C> {
        TrackedClipboard::new(clipboard, self.clone())
    }

    /// Listener for system clipboard events.
    pub fn clipboard_listener(&self) -> ClipboardListener {
        ClipboardListener::new(self.clone())
    }

    /// Open the tracking session, sending `notebook-opened`.
    pub fn open_session(&self) -> Arc<Session> {
        Arc::new(Session::open(
            self.events.clone(),
            self.correlator.clone(),
            self.closed.clone(),
        ))
    }

    /// Feed a settle signal to the correlator. Returns the tokens that fired.
    pub fn settle(&self, signal: &SettleSignal) -> Vec<CaptureToken> {
        self.correlator.settle(signal)
    }

    /// Settle captures from `bus` on a background task.
    ///
    /// Subscribes before spawning, so signals emitted right after this call
    /// are not lost. Must be called within a tokio runtime.
    pub fn spawn_listener(&self, bus: &SignalBus) -> JoinHandle<()> {
        let receiver = bus.subscribe();
        tokio::spawn(self.correlator.clone().listen(receiver))
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("document", &self.document.location())
            .field("namespace", &self.catalog.namespace())
            .field("actions", &self.catalog.len())
            .field("correlator", &self.correlator)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for [`Tracker`].
pub struct TrackerBuilder {
    document: Arc<dyn DocumentFacade>,
    transport: Arc<dyn Transport>,
    catalog: Option<ActionCatalog>,
    deferred_timeout: Option<Duration>,
}

impl TrackerBuilder {
    pub fn new(document: Arc<dyn DocumentFacade>, transport: Arc<dyn Transport>) -> Self {
        Self {
            document,
            transport,
            catalog: None,
            deferred_timeout: None,
        }
    }

    /// Use a custom action catalog instead of the notebook default.
    pub fn with_catalog(mut self, catalog: ActionCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Cancel deferred captures that wait longer than `timeout`.
    pub fn with_deferred_timeout(mut self, timeout: Duration) -> Self {
        self.deferred_timeout = Some(timeout);
        self
    }

    /// Apply namespace and deferred timeout from configuration.
    pub fn with_config(mut self, config: &CometConfig) -> Self {
        self.catalog = Some(ActionCatalog::notebook_in(config.namespace.clone()));
        self.deferred_timeout = config.deferred_timeout;
        self
    }

    pub fn build(self) -> Tracker {
        let events = EventBuilder::new(self.document.clone(), self.transport);
        let correlator = Arc::new(Correlator::new(events.clone(), self.deferred_timeout));

        Tracker {
            toggle: TrackingToggle::new(self.document.clone()),
            document: self.document,
            catalog: Arc::new(self.catalog.unwrap_or_default()),
            events,
            correlator,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}
