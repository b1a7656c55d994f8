//! # Comet
//!
//! Records how a notebook document is edited and executed, one event per
//! user-level action, and ships each event to a collector endpoint on the
//! notebook server.
//!
//! ## Core Concepts
//!
//! Comet never changes what an action does. It wraps the host's extension
//! points with decorators that observe each call:
//! - [`Intercepted`] wraps the action dispatcher
//! - [`TrackedClipboard`] wraps the direct cut, copy and paste methods
//! - [`ClipboardListener`] reports system clipboard events
//!
//! Most actions are captured as soon as they return. Actions that start
//! kernel execution finish later, so their capture is armed on the
//! [`Correlator`] and fired when a [`SettleSignal`] arrives.
//!
//! ## Architecture
//!
//! ```text
//! Host action ──► Intercepted::call
//!                     │
//!                     ├─ untracked ──────────────► host handler only
//!                     │
//!                     ├─ edit ────► EventBuilder ─► Transport ─► POST /api/{service}/{path}
//!                     │                 ▲
//!                     └─ execute ─► Correlator (armed)
//!                                       ▲
//! Kernel idle ──► SignalBus ──► listen ─┘
//! ```
//!
//! ## Guarantees
//!
//! - **Transparent**: the host handler's output and errors pass through unchanged
//! - **Fire-and-forget**: sends never block or fail the caller
//! - **At-most-once**: no retry, no persistence, no deduplication
//! - **Start-time records**: deferred records carry the time the action was invoked
//!
//! ## Example
//!
//! ```ignore
//! use comet::{CometConfig, HttpTransport, SignalBus, Tracker};
//!
//! let config = CometConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let tracker = Tracker::builder(document, transport)
//!     .with_config(&config)
//!     .build();
//!
//! let session = tracker.open_session();
//! let actions = tracker.intercept(host_actions);
//! let _listener = tracker.spawn_listener(&kernel_signals);
//!
//! actions.call("jupyter-notebook:run-cell", args)?;
//! ```

pub mod action;
pub mod builder;
pub mod clipboard;
pub mod config;
pub mod core;
pub mod correlator;
pub mod document;
pub mod error;
pub mod interceptor;
pub mod memory;
pub mod session;
pub mod signal;
pub mod tracker;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{ActionCatalog, ActionClass, CapturePath, DEFAULT_NAMESPACE};
pub use builder::EventBuilder;
pub use clipboard::{cut_via, CellClipboard, ClipboardEvent, ClipboardListener, TrackedClipboard};
pub use config::CometConfig;
pub use crate::core::{now_millis, CaptureContext, CaptureToken, Destination, EpochMillis, EventRecord};
pub use correlator::{CancelReason, Correlator};
pub use document::{CellKind, DocumentFacade, EditMode};
pub use crate::error::{CometError, Result};
pub use interceptor::{ActionHandler, Capture, Intercepted};
pub use memory::{MemoryActionError, MemoryActions, MemoryCell, MemoryClipboard, MemoryNotebook};
pub use session::{Session, TrackingToggle, TRACKING_METADATA_KEY};
pub use signal::{SettleSignal, SignalBus};
pub use tracker::{Tracker, TrackerBuilder};
pub use transport::{collector_url, HttpTransport, Transport};
