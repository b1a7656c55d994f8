//! Shared fixtures for comet integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use comet::{
    Destination, EventRecord, MemoryActions, MemoryClipboard, MemoryNotebook, Intercepted,
    TrackedClipboard, Tracker, Transport,
};
use tokio::sync::Notify;

/// Collects records in memory.
#[derive(Default)]
pub struct Collector {
    sent: Mutex<Vec<(Destination, EventRecord)>>,
    notify: Notify,
}

impl Collector {
    pub fn records(&self) -> Vec<EventRecord> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.sent.lock().unwrap().iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.name.clone()).collect()
    }

    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.sent.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl Transport for Collector {
    fn send(&self, destination: Destination, record: EventRecord) {
        self.sent.lock().unwrap().push((destination, record));
        self.notify.notify_waiters();
    }
}

pub struct Harness {
    pub notebook: Arc<MemoryNotebook>,
    pub collector: Arc<Collector>,
    pub tracker: Tracker,
    pub actions: Intercepted<MemoryActions>,
    pub clipboard: TrackedClipboard<MemoryClipboard>,
}

pub fn harness() -> Harness {
    let notebook = Arc::new(MemoryNotebook::sample());
    let collector = Arc::new(Collector::default());
    let tracker = Tracker::builder(notebook.clone(), collector.clone()).build();
    let actions = tracker.intercept(MemoryActions::new(notebook.clone()));
    let clipboard = tracker.track_clipboard(MemoryClipboard::new(notebook.clone()));
    Harness {
        notebook,
        collector,
        tracker,
        actions,
        clipboard,
    }
}
