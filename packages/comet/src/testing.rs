//! Testing utilities for comet interceptors.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! comet = { path = "../comet", features = ["testing"] }
//! ```
//!
//! # Recording Transport
//!
//! ```ignore
//! use comet::testing::RecordingTransport;
//!
//! let transport = Arc::new(RecordingTransport::new());
//! let tracker = Tracker::builder(notebook, transport.clone()).build();
//!
//! bus.emit(SettleSignal::settled());
//! transport.wait_for(1).await;      // listener runs on another task
//! assert_eq!(transport.names(), vec!["run-cell"]);
//! ```

use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::core::{Destination, EventRecord};
use crate::transport::Transport;

/// Transport that keeps every record in memory instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Destination, EventRecord)>>,
    notify: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Destination, EventRecord)>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Everything sent so far, with destinations.
    pub fn sent(&self) -> Vec<(Destination, EventRecord)> {
        self.lock().clone()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.lock().iter().map(|(_, record)| record.clone()).collect()
    }

    /// Action names in send order.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|(_, record)| record.name.clone()).collect()
    }

    pub fn last(&self) -> Option<EventRecord> {
        self.lock().last().map(|(_, record)| record.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Wait until at least `count` records have been sent.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl Transport for RecordingTransport {
    fn send(&self, destination: Destination, record: EventRecord) {
        self.lock().push((destination, record));
        self.notify.notify_waiters();
    }
}
