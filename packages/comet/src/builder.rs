//! Event builder - turn a capture context into a record and hand it off.
//!
//! The snapshot is taken when the record is built, not when the action
//! started: for deferred captures the model reflects the settled document
//! while `time`, `index` and `indices` still describe the moment of dispatch.

use std::sync::Arc;

use tracing::debug;

use crate::core::{CaptureContext, Destination, EventRecord};
use crate::document::DocumentFacade;
use crate::transport::Transport;

/// Builds event records from the live document and forwards them to a transport.
#[derive(Clone)]
pub struct EventBuilder {
    document: Arc<dyn DocumentFacade>,
    transport: Arc<dyn Transport>,
}

impl EventBuilder {
    pub fn new(document: Arc<dyn DocumentFacade>, transport: Arc<dyn Transport>) -> Self {
        Self {
            document,
            transport,
        }
    }

    /// The document records are built from.
    pub fn document(&self) -> &Arc<dyn DocumentFacade> {
        &self.document
    }

    /// Snapshot the document and build the record for `ctx`.
    pub fn build(&self, ctx: CaptureContext) -> (Destination, EventRecord) {
        let destination = Destination {
            base_address: self.document.base_address(),
            document_path: self.document.location(),
        };
        let record = EventRecord::from_context(ctx, self.document.serialize());
        (destination, record)
    }

    /// Build the record for `ctx` and send it.
    pub fn capture(&self, ctx: CaptureContext) {
        debug!(
            action = %ctx.action,
            token = %ctx.token,
            index = ctx.index,
            "capturing event"
        );
        let (destination, record) = self.build(ctx);
        self.transport.send(destination, record);
    }

    /// Send a session-level event anchored at the first cell.
    pub fn emit(&self, name: &str) {
        self.capture(CaptureContext::at_origin(name));
    }
}

impl std::fmt::Debug for EventBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuilder")
            .field("document", &self.document.location())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CaptureToken;
    use crate::memory::MemoryNotebook;
    use crate::testing::RecordingTransport;

    #[test]
    fn test_build_uses_current_snapshot_and_context_selection() {
        let notebook = Arc::new(MemoryNotebook::sample());
        let transport = Arc::new(RecordingTransport::new());
        let builder = EventBuilder::new(notebook.clone(), transport.clone());

        let ctx = CaptureContext {
            action: "move-cell-down".into(),
            time: 42,
            index: 1,
            indices: vec![1],
            token: CaptureToken::next(),
        };
        notebook.select(2);
        builder.capture(ctx);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let (destination, record) = &sent[0];
        assert_eq!(destination.document_path, notebook.location());
        assert_eq!(destination.base_address, notebook.base_address());
        assert_eq!(record.time, 42);
        assert_eq!(record.index, 1);
        assert_eq!(record.indices, vec![1]);
        assert_eq!(record.model, notebook.serialize());
    }

    #[test]
    fn test_emit_anchors_at_first_cell() {
        let notebook = Arc::new(MemoryNotebook::sample());
        let transport = Arc::new(RecordingTransport::new());
        let builder = EventBuilder::new(notebook.clone(), transport.clone());

        notebook.select(2);
        builder.emit("notebook-opened");

        let record = transport.last().unwrap();
        assert_eq!(record.name, "notebook-opened");
        assert_eq!(record.index, 0);
        assert_eq!(record.indices, vec![0]);
    }
}
