//! Dispatch interceptor - wrap the host's action handler.
//!
//! Every named action in the notebook front end goes through one handler.
//! [`Intercepted`] is a decorator over that handler: it has the same
//! argument, output and error types, forwards every call unchanged, and
//! additionally captures tracked actions.
//!
//! # Call Flow
//!
//! ```text
//! dispatch(action, args)
//!   │
//!   ├─ session closed ─────────────► inner.call(action, args)     Capture::Skipped
//!   ├─ tracking off ───────────────► inner.call(action, args)     Capture::Skipped
//!   ├─ action not catalogued ──────► inner.call(action, args)     Capture::Skipped
//!   │
//!   └─ tracked:
//!        ctx = selection + time (before)
//!        inner.call(action, args)?        ◄── error: propagated, nothing captured
//!        ├─ Immediate ─► EventBuilder::capture(ctx)                Capture::Sent(token)
//!        └─ Deferred ──► Correlator::arm(ctx)                      Capture::Armed(token)
//! ```
//!
//! `ActionHandler::call` is `dispatch` without the [`Capture`]. Hosts that
//! know when a particular execution finishes keep the armed token and settle
//! it with [`SettleSignal::for_token`](crate::signal::SettleSignal::for_token).

use tracing::debug;

use crate::action::CapturePath;
use crate::core::{CaptureContext, CaptureToken};
use crate::tracker::Tracker;

/// The host's action dispatch surface.
pub trait ActionHandler: Send + Sync {
    /// Trailing arguments of a call, passed through untouched.
    type Args;
    type Output;
    type Error;

    /// Execute the action named `action` (qualified with its namespace).
    fn call(&self, action: &str, args: Self::Args) -> Result<Self::Output, Self::Error>;
}

/// What the interceptor did with one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Forwarded without capturing.
    Skipped,
    /// Record sent as soon as the call returned.
    Sent(CaptureToken),
    /// Capture armed, waiting for a settle signal.
    Armed(CaptureToken),
}

impl Capture {
    /// Token to tag the settle signal with, for deferred captures.
    pub fn armed_token(&self) -> Option<CaptureToken> {
        match self {
            Capture::Armed(token) => Some(*token),
            _ => None,
        }
    }
}

/// An action handler with tracking wrapped around it.
pub struct Intercepted<H> {
    inner: H,
    tracker: Tracker,
}

impl<H: ActionHandler> Intercepted<H> {
    pub fn new(inner: H, tracker: Tracker) -> Self {
        Self { inner, tracker }
    }

    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn into_inner(self) -> H {
        self.inner
    }

    /// Execute the action and report what was captured.
    pub fn dispatch(
        &self,
        action: &str,
        args: H::Args,
    ) -> Result<(H::Output, Capture), H::Error> {
        if self.tracker.is_closed() || !self.tracker.toggle().is_enabled() {
            return Ok((self.inner.call(action, args)?, Capture::Skipped));
        }

        let Some((name, class)) = self.tracker.catalog().resolve(action) else {
            return Ok((self.inner.call(action, args)?, Capture::Skipped));
        };

        let document = self.tracker.document();
        let ctx = CaptureContext::before(name, &**document);
        let target = document.cell_kind(ctx.index);
        let token = ctx.token;

        let output = match self.inner.call(action, args) {
            Ok(output) => output,
            Err(e) => {
                debug!(action = %name, token = %token, "action failed, nothing captured");
                return Err(e);
            }
        };

        let capture = match class.capture_path(target) {
            CapturePath::Immediate => {
                self.tracker.events().capture(ctx);
                Capture::Sent(token)
            }
            CapturePath::Deferred => Capture::Armed(self.tracker.correlator().arm(ctx)),
        };

        Ok((output, capture))
    }
}

impl<H: ActionHandler> ActionHandler for Intercepted<H> {
    type Args = H::Args;
    type Output = H::Output;
    type Error = H::Error;

    fn call(&self, action: &str, args: H::Args) -> Result<H::Output, H::Error> {
        self.dispatch(action, args).map(|(output, _)| output)
    }
}

impl<H> std::fmt::Debug for Intercepted<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intercepted")
            .field("handler", &std::any::type_name::<H>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::document::{CellKind, DocumentFacade};
    use crate::memory::{MemoryActionError, MemoryActions, MemoryNotebook};
    use crate::signal::SettleSignal;
    use crate::testing::RecordingTransport;

    struct Fixture {
        notebook: Arc<MemoryNotebook>,
        transport: Arc<RecordingTransport>,
        tracker: Tracker,
        actions: Intercepted<MemoryActions>,
    }

    fn fixture() -> Fixture {
        let notebook = Arc::new(MemoryNotebook::sample());
        let transport = Arc::new(RecordingTransport::new());
        let tracker = Tracker::builder(notebook.clone(), transport.clone()).build();
        let actions = tracker.intercept(MemoryActions::new(notebook.clone()));
        Fixture {
            notebook,
            transport,
            tracker,
            actions,
        }
    }

    #[test]
    fn test_edit_action_captured_immediately() {
        let f = fixture();
        f.notebook.select(1);

        f.actions.call("jupyter-notebook:move-cell-down", ()).unwrap();

        let records = f.transport.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "move-cell-down");
        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].indices, vec![1]);
        assert_eq!(records[0].model, f.notebook.serialize());
        assert_eq!(f.notebook.selected_index(), 2);
    }

    #[test]
    fn test_run_on_code_cell_is_deferred_with_start_time() {
        let f = fixture();
        f.notebook.select(2);
        assert_eq!(f.notebook.cell_kind(2), Some(CellKind::Code));

        f.actions.call("jupyter-notebook:run-cell", ()).unwrap();
        assert!(f.transport.is_empty());
        assert_eq!(f.tracker.correlator().armed_count(), 1);

        f.notebook.finish_executions();
        f.tracker.settle(&SettleSignal::settled());

        let records = f.transport.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "run-cell");
        assert_eq!(record.index, 2);
        assert_eq!(record.indices, vec![2]);
        assert!(record.time <= crate::core::now_millis());
        assert_eq!(record.model["cells"][2]["execution_count"], 1);
    }

    #[test]
    fn test_run_on_markdown_cell_is_immediate() {
        let f = fixture();
        f.notebook.select(0);

        f.actions.call("jupyter-notebook:run-cell", ()).unwrap();

        assert_eq!(f.transport.names(), vec!["run-cell"]);
        assert_eq!(f.tracker.correlator().armed_count(), 0);
    }

    #[test]
    fn test_run_all_is_deferred_even_from_markdown() {
        let f = fixture();
        f.notebook.select(0);

        f.actions.call("jupyter-notebook:run-all-cells", ()).unwrap();

        assert!(f.transport.is_empty());
        assert_eq!(f.tracker.correlator().armed_count(), 1);
    }

    #[test]
    fn test_untracked_action_forwarded_without_capture() {
        let f = fixture();

        f.actions.call("jupyter-notebook:select-next-cell", ()).unwrap();

        assert!(f.transport.is_empty());
        assert_eq!(f.notebook.selected_index(), 1);
    }

    #[test]
    fn test_tracking_disabled_forwards_without_capture() {
        let f = fixture();
        f.tracker.toggle().set(false);

        f.actions.call("jupyter-notebook:insert-cell-below", ()).unwrap();
        f.actions.call("jupyter-notebook:run-cell", ()).unwrap();

        assert!(f.transport.is_empty());
        assert_eq!(f.tracker.correlator().armed_count(), 0);
        assert_eq!(f.notebook.len(), 5);
    }

    #[test]
    fn test_failing_action_propagates_error_without_capture() {
        let f = fixture();

        let err = f
            .actions
            .call("jupyter-notebook:merge-cell-with-previous-cell", ())
            .unwrap_err();

        assert!(matches!(err, MemoryActionError::NoNeighbour { .. }));
        assert!(f.transport.is_empty());
    }

    #[test]
    fn test_run_all_with_nothing_queued_does_not_shift_later_runs() {
        let f = fixture();
        f.notebook.select(0);
        f.actions.call("jupyter-notebook:run-all-cells-above", ()).unwrap();
        assert_eq!(f.notebook.pending_executions(), 0);

        f.notebook.select(2);
        f.actions.call("jupyter-notebook:run-cell", ()).unwrap();
        f.notebook.finish_executions();
        f.tracker.settle(&SettleSignal::settled());

        assert_eq!(f.transport.names(), vec!["run-all-cells-above", "run-cell"]);
        assert_eq!(f.tracker.correlator().armed_count(), 0);
        let run = f.transport.last().unwrap();
        assert_eq!(run.index, 2);
        assert_eq!(run.model["cells"][2]["execution_count"], 1);
    }

    #[test]
    fn test_dispatch_reports_capture() {
        let f = fixture();

        let (_, capture) = f.actions.dispatch("jupyter-notebook:select-next-cell", ()).unwrap();
        assert_eq!(capture, Capture::Skipped);

        let (_, capture) = f.actions.dispatch("jupyter-notebook:insert-cell-above", ()).unwrap();
        assert!(matches!(capture, Capture::Sent(_)));
        assert_eq!(capture.armed_token(), None);
    }

    #[test]
    fn test_dispatch_token_settles_its_own_run() {
        let f = fixture();

        f.notebook.select(1);
        let (_, first) = f.actions.dispatch("jupyter-notebook:run-cell", ()).unwrap();
        f.notebook.select(2);
        let (_, second) = f.actions.dispatch("jupyter-notebook:run-cell", ()).unwrap();
        let second = second.armed_token().unwrap();

        f.notebook.finish_executions();
        assert_eq!(
            f.tracker.settle(&SettleSignal::for_token(second)),
            vec![second]
        );

        assert_eq!(f.transport.records()[0].index, 2);
        assert!(f.tracker.correlator().is_armed(first.armed_token().unwrap()));
    }

    #[test]
    fn test_nothing_captured_after_session_close() {
        let f = fixture();
        let session = f.tracker.open_session();
        session.close();
        f.transport.clear();

        f.notebook.select(1);
        let (_, capture) = f.actions.dispatch("jupyter-notebook:run-cell", ()).unwrap();
        f.actions.call("jupyter-notebook:insert-cell-below", ()).unwrap();

        assert_eq!(capture, Capture::Skipped);
        assert!(f.transport.is_empty());
        assert_eq!(f.tracker.correlator().armed_count(), 0);
        assert_eq!(f.notebook.len(), 5);
    }
}
