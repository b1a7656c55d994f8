//! Core types for comet: capture tokens, capture contexts and event records.
//!
//! # Capture Lifecycle
//!
//! ```text
//! intercept ─► CaptureContext { time, index, indices, token }
//!                  │
//!                  ├─ immediate ─► EventBuilder ─► EventRecord ─► Transport
//!                  │
//!                  └─ deferred ──► Correlator (armed) ─► settle ─► EventBuilder ─► ...
//! ```
//!
//! A context is consumed exactly once. The record it produces keeps the
//! context's start time even when built after a completion signal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::document::DocumentFacade;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Correlation token for one intercepted invocation.
///
/// Tokens increase monotonically for the lifetime of the process, so
/// ordering tokens orders invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureToken(u64);

impl CaptureToken {
    /// Allocate the next token.
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw token value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CaptureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cap-{}", self.0)
    }
}

/// Pre-action state captured when an invocation is intercepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContext {
    /// Canonical action name (namespace prefix already stripped).
    pub action: String,
    /// Start time of the invocation.
    pub time: EpochMillis,
    /// Selected index before the action ran.
    pub index: usize,
    /// Selected indices before the action ran.
    pub indices: Vec<usize>,
    pub token: CaptureToken,
}

impl CaptureContext {
    /// Capture the document's selection right now, before the action runs.
    pub fn before(action: impl Into<String>, document: &dyn DocumentFacade) -> Self {
        Self {
            action: action.into(),
            time: now_millis(),
            index: document.selected_index(),
            indices: document.selected_indices(),
            token: CaptureToken::next(),
        }
    }

    /// Context for session-level events, anchored at the first cell.
    pub fn at_origin(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            time: now_millis(),
            index: 0,
            indices: vec![0],
            token: CaptureToken::next(),
        }
    }
}

/// Where a record is delivered: the collector route for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub base_address: String,
    pub document_path: String,
}

/// The body posted to the collector.
///
/// Field names are the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub time: EpochMillis,
    pub name: String,
    pub index: usize,
    pub indices: Vec<usize>,
    pub model: serde_json::Value,
}

impl EventRecord {
    /// Combine a capture context with a document snapshot.
    pub fn from_context(ctx: CaptureContext, model: serde_json::Value) -> Self {
        Self {
            time: ctx.time,
            name: ctx.action,
            index: ctx.index,
            indices: ctx.indices,
            model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokens_increase() {
        let a = CaptureToken::next();
        let b = CaptureToken::next();
        assert!(b > a);
        assert_eq!(a.to_string(), format!("cap-{}", a.get()));
    }

    #[test]
    fn test_origin_context_points_at_first_cell() {
        let ctx = CaptureContext::at_origin("notebook-opened");
        assert_eq!(ctx.index, 0);
        assert_eq!(ctx.indices, vec![0]);
        assert!(ctx.time > 0);
    }

    #[test]
    fn test_record_keeps_context_time() {
        let ctx = CaptureContext {
            action: "run-cell".into(),
            time: 1_490_000_000_000,
            index: 2,
            indices: vec![2],
            token: CaptureToken::next(),
        };
        let record = EventRecord::from_context(ctx, json!({"cells": []}));

        assert_eq!(record.time, 1_490_000_000_000);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "time": 1_490_000_000_000i64,
                "name": "run-cell",
                "index": 2,
                "indices": [2],
                "model": {"cells": []}
            })
        );
    }
}
