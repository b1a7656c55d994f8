//! Completion correlator - the deferred-capture state machine.
//!
//! Execution-class actions change the document only after the kernel
//! settles, so their capture is deferred:
//!
//! ```text
//!            arm(ctx)                settle(signal)
//!   ──────────────────► ARMED ─────────────────────► FIRED   (record sent)
//!                         │
//!                         │ close / timeout
//!                         └────────────────────────► CANCELLED (nothing sent)
//! ```
//!
//! Both terminal states remove the context, so a context produces at most
//! one record.
//!
//! # Matching
//!
//! - A signal tagged with a token fires exactly that context. A tagged signal
//!   for a token that is not armed (already fired, cancelled, never armed) is
//!   discarded.
//! - An untagged signal fires every context armed before it, oldest first.
//!   A context whose action queued no work (`run-all-cells-above` on the
//!   first cell) is flushed by the next signal instead of waiting at the
//!   head of the queue and shifting every later record by one.
//! - A lagged listener fires the oldest contexts, one per missed signal.
//!
//! The record always carries the context's start time, even though the
//! document snapshot is taken at settle time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::builder::EventBuilder;
use crate::core::{CaptureContext, CaptureToken};
use crate::signal::SettleSignal;

/// Why an armed capture was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The document was closed before the work settled.
    DocumentClosed,
    /// No settle signal arrived within the configured timeout.
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::DocumentClosed => write!(f, "document_closed"),
            CancelReason::TimedOut => write!(f, "timed_out"),
        }
    }
}

struct Armed {
    ctx: CaptureContext,
    armed_at: Instant,
}

/// Holds armed captures and fires them on settle signals.
pub struct Correlator {
    builder: EventBuilder,
    armed: Mutex<BTreeMap<CaptureToken, Armed>>,
    timeout: Option<Duration>,
}

impl Correlator {
    /// Create a correlator; `timeout` of `None` keeps captures armed until
    /// they settle or are cancelled.
    pub fn new(builder: EventBuilder, timeout: Option<Duration>) -> Self {
        Self {
            builder,
            armed: Mutex::new(BTreeMap::new()),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<CaptureToken, Armed>> {
        // Entries are plain data, a poisoned map is still consistent
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arm a deferred capture. Returns the token a tagged signal must carry.
    pub fn arm(&self, ctx: CaptureContext) -> CaptureToken {
        let token = ctx.token;
        let now = Instant::now();

        let mut armed = self.lock();
        self.sweep_locked(&mut armed, now);
        debug!(
            action = %ctx.action,
            token = %token,
            pending = armed.len(),
            "capture armed"
        );
        armed.insert(token, Armed { ctx, armed_at: now });
        token
    }

    /// Process a settle signal. Returns the tokens of the captures that
    /// fired, oldest first.
    pub fn settle(&self, signal: &SettleSignal) -> Vec<CaptureToken> {
        let fired: Vec<Armed> = {
            let mut armed = self.lock();
            self.sweep_locked(&mut armed, Instant::now());
            match signal.token {
                Some(token) => armed.remove(&token).into_iter().collect(),
                None => std::mem::take(&mut *armed).into_values().collect(),
            }
        };

        if fired.is_empty() {
            debug!(token = ?signal.token, "settle signal matched no armed capture");
        }
        self.fire(fired)
    }

    /// Fire the `count` oldest armed captures.
    ///
    /// Used when settle signals were lost and it is unknown which ones.
    pub fn settle_oldest(&self, count: usize) -> Vec<CaptureToken> {
        let fired: Vec<Armed> = {
            let mut armed = self.lock();
            self.sweep_locked(&mut armed, Instant::now());
            std::iter::from_fn(|| armed.pop_first().map(|(_, entry)| entry))
                .take(count)
                .collect()
        };
        self.fire(fired)
    }

    fn fire(&self, fired: Vec<Armed>) -> Vec<CaptureToken> {
        fired
            .into_iter()
            .map(|entry| {
                let token = entry.ctx.token;
                debug!(
                    action = %entry.ctx.action,
                    token = %token,
                    waited_ms = entry.armed_at.elapsed().as_millis() as u64,
                    "capture fired"
                );
                self.builder.capture(entry.ctx);
                token
            })
            .collect()
    }

    /// Cancel every armed capture without sending anything.
    ///
    /// Returns the number of captures cancelled.
    pub fn cancel_all(&self, reason: CancelReason) -> usize {
        let cancelled = std::mem::take(&mut *self.lock());
        for entry in cancelled.values() {
            warn!(
                action = %entry.ctx.action,
                token = %entry.ctx.token,
                reason = %reason,
                "armed capture cancelled"
            );
        }
        cancelled.len()
    }

    /// Cancel captures that have waited longer than the timeout.
    pub fn sweep_expired(&self) -> usize {
        let mut armed = self.lock();
        self.sweep_locked(&mut armed, Instant::now())
    }

    fn sweep_locked(&self, armed: &mut BTreeMap<CaptureToken, Armed>, now: Instant) -> usize {
        let Some(timeout) = self.timeout else {
            return 0;
        };

        let before = armed.len();
        armed.retain(|_, entry| {
            let keep = now.duration_since(entry.armed_at) < timeout;
            if !keep {
                warn!(
                    action = %entry.ctx.action,
                    token = %entry.ctx.token,
                    reason = %CancelReason::TimedOut,
                    "armed capture cancelled"
                );
            }
            keep
        });
        before - armed.len()
    }

    /// Number of captures currently armed.
    pub fn armed_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_armed(&self, token: CaptureToken) -> bool {
        self.lock().contains_key(&token)
    }

    /// Tokens of armed captures, oldest first.
    pub fn armed_tokens(&self) -> Vec<CaptureToken> {
        self.lock().keys().copied().collect()
    }

    /// Settle captures from a signal receiver until the bus closes.
    ///
    /// Subscribe before spawning this so no signal emitted in between is lost.
    pub async fn listen(self: Arc<Self>, mut receiver: broadcast::Receiver<SettleSignal>) {
        info!("settle listener starting");
        loop {
            match receiver.recv().await {
                Ok(signal) => {
                    self.settle(&signal);
                }
                Err(RecvError::Lagged(missed)) => {
                    let missed_count = usize::try_from(missed).unwrap_or(usize::MAX);
                    let fired = self.settle_oldest(missed_count);
                    warn!(
                        missed,
                        fired = fired.len(),
                        "settle listener lagged, fired oldest captures in place of missed signals"
                    );
                }
                Err(RecvError::Closed) => {
                    info!(pending = self.armed_count(), "signal bus closed, settle listener stopping");
                    return;
                }
            }
        }
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("armed", &self.armed_count())
            .field("timeout", &self.timeout)
            .finish()
    }
}
