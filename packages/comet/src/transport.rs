//! Transport - deliver event records to the collector, fire-and-forget.
//!
//! # Guarantees
//!
//! - **Non-blocking**: `send` returns immediately; the POST runs on the tokio runtime
//! - **At-most-once**: no retry, no local queue, failures are logged and dropped
//! - **No feedback**: the response is never interpreted and errors never reach the caller
//!
//! # Endpoint
//!
//! ```text
//! POST {base_address}/api/{service}/{document_path}
//! Content-Type: application/json
//!
//! {"time": 1490000000000, "name": "run-cell", "index": 2, "indices": [2], "model": {...}}
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::CometConfig;
use crate::core::{Destination, EventRecord};
use crate::error::{CometError, Result};

/// Sink for finished event records.
///
/// Implementations must not block and must not fail the caller.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, destination: Destination, record: EventRecord);
}

/// Build the collector URL for a document.
///
/// Path segments are percent-encoded; a trailing slash on the base address
/// is ignored.
pub fn collector_url(base_address: &str, service: &str, document_path: &str) -> Result<Url> {
    let mut url = Url::parse(base_address).map_err(|e| CometError::address(base_address, e))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| CometError::address(base_address, "address cannot be a base"))?;
        segments.pop_if_empty().push("api").push(service);
        for segment in document_path.split('/').filter(|s| !s.is_empty()) {
            segments.push(segment);
        }
    }
    Ok(url)
}

// =============================================================================
// Inflight Sends
// =============================================================================

/// Counts sends that have been spawned but not finished.
#[derive(Debug, Default)]
struct InflightSends {
    count: AtomicUsize,
    notify: Notify,
}

impl InflightSends {
    fn begin(self: &Arc<Self>) -> SendGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        SendGuard {
            inflight: self.clone(),
        }
    }

    fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    async fn wait_zero(&self) {
        loop {
            // Register before checking so a wake-up between the two is not lost
            let notified = self.notify.notified();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII guard that marks one send as finished when dropped.
struct SendGuard {
    inflight: Arc<InflightSends>,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        if self.inflight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inflight.notify.notify_waiters();
        }
    }
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// Posts records to the collector service with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    service: String,
    inflight: Arc<InflightSends>,
}

impl HttpTransport {
    /// Create a transport using the configured service name and send timeout.
    pub fn new(config: &CometConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.send_timeout).build()?;
        Ok(Self::with_client(client, config.service.clone()))
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: Client, service: impl Into<String>) -> Self {
        Self {
            client,
            service: service.into(),
            inflight: Arc::new(InflightSends::default()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Number of sends still in flight.
    pub fn inflight(&self) -> usize {
        self.inflight.current()
    }

    /// Wait for in-flight sends to finish, up to `timeout`.
    ///
    /// Returns false if sends were still pending when the timeout elapsed.
    /// Only meant for orderly shutdown; the tracking path never awaits sends.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.inflight.wait_zero())
            .await
            .is_ok()
    }
}

impl Transport for HttpTransport {
    fn send(&self, destination: Destination, record: EventRecord) {
        let url = match collector_url(
            &destination.base_address,
            &self.service,
            &destination.document_path,
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, event = %record.name, "dropping event with unusable address");
                return;
            }
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(event = %record.name, "no async runtime available, dropping event");
            return;
        };

        let client = self.client.clone();
        let guard = self.inflight.begin();

        runtime.spawn(async move {
            let _guard = guard;
            match client.post(url.clone()).json(&record).send().await {
                Ok(response) => {
                    debug!(
                        event = %record.name,
                        status = %response.status(),
                        "event delivered"
                    );
                }
                Err(e) => {
                    warn!(
                        event = %record.name,
                        url = %url,
                        error = %e,
                        "event send failed"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn record(name: &str) -> EventRecord {
        EventRecord {
            time: 1_490_000_000_000,
            name: name.into(),
            index: 0,
            indices: vec![0],
            model: json!({"cells": []}),
        }
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    /// Accept one HTTP request and return it as text.
    async fn accept_one(listener: TcpListener) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        socket
            .write_all(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    #[test]
    fn test_collector_url_joins_segments() {
        let url = collector_url("http://localhost:8888/", "comet", "work/Untitled.ipynb").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8888/api/comet/work/Untitled.ipynb"
        );

        let url = collector_url("http://hub/user/ada", "comet", "/a b.ipynb").unwrap();
        assert_eq!(url.as_str(), "http://hub/user/ada/api/comet/a%20b.ipynb");
    }

    #[test]
    fn test_collector_url_rejects_relative_base() {
        let err = collector_url("/", "comet", "x.ipynb").unwrap_err();
        assert!(matches!(err, CometError::Address { .. }));

        let err = collector_url("mailto:someone@example.com", "comet", "x.ipynb").unwrap_err();
        assert!(matches!(err, CometError::Address { .. }));
    }

    #[test]
    fn test_send_without_runtime_is_dropped() {
        let transport = HttpTransport::with_client(local_client(), "comet");
        transport.send(
            Destination {
                base_address: "http://127.0.0.1:9/".into(),
                document_path: "x.ipynb".into(),
            },
            record("notebook-opened"),
        );
        assert_eq!(transport.inflight(), 0);
    }

    #[tokio::test]
    async fn test_send_posts_json_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(accept_one(listener));

        let transport = HttpTransport::with_client(local_client(), "comet");
        transport.send(
            Destination {
                base_address: format!("http://{}/", addr),
                document_path: "work/Untitled.ipynb".into(),
            },
            record("delete-cell"),
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/comet/work/Untitled.ipynb HTTP/1.1"));
        assert!(request.contains("\"name\":\"delete-cell\""));
        assert!(request.contains("\"indices\":[0]"));

        assert!(transport.drain(Duration::from_secs(5)).await);
        assert_eq!(transport.inflight(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_collector_does_not_fail_caller() {
        // Bind then drop to get a port nothing listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let transport = HttpTransport::with_client(local_client(), "comet");
        transport.send(
            Destination {
                base_address: format!("http://{}/", addr),
                document_path: "x.ipynb".into(),
            },
            record("notebook-closed"),
        );

        assert!(transport.drain(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_drain_with_nothing_inflight_returns_immediately() {
        let transport = HttpTransport::with_client(local_client(), "comet");
        assert!(transport.drain(Duration::from_millis(10)).await);
    }
}
