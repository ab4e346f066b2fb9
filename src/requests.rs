//! In-flight request/response correlation
//!
//! Query-style wire requests carry a generated id; the matching `response`
//! or `error` frame settles a oneshot the caller awaits. Each request arms
//! its own caller-specified timeout task so a silent server cannot strand
//! callers. Settlement is remove-once: whichever of response, error,
//! timeout, or disconnect gets there first wins, the rest are no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::errors::FeedError;

struct PendingRequest {
    tx: oneshot::Sender<Result<Value, FeedError>>,
    timer: AbortHandle,
}

/// Pending request table plus the id counter
pub struct RequestTracker {
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    counter: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            counter: AtomicU64::new(0),
        }
    }

    /// Register a new request and arm its timeout; returns the wire id and
    /// the receiver the caller awaits
    pub fn create(
        &self,
        timeout: Duration,
    ) -> (String, oneshot::Receiver<Result<Value, FeedError>>) {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("req_{}_{}", seq, Utc::now().timestamp_millis());
        let (tx, rx) = oneshot::channel();

        let pending = Arc::clone(&self.pending);
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            settle(&pending, &timer_id, Err(FeedError::Timeout));
        })
        .abort_handle();

        self.pending
            .lock()
            .unwrap()
            .insert(id.clone(), PendingRequest { tx, timer });
        (id, rx)
    }

    /// Deliver a success payload; false if the id is unknown or already
    /// settled
    pub fn resolve(&self, id: &str, value: Value) -> bool {
        settle(&self.pending, id, Ok(value))
    }

    /// Deliver a failure; false if the id is unknown or already settled
    pub fn reject(&self, id: &str, error: FeedError) -> bool {
        settle(&self.pending, id, Err(error))
    }

    /// Fail everything in flight, e.g. when the transport drops
    pub fn clear_all(&self, reason: &str) -> usize {
        let drained: Vec<(String, PendingRequest)> =
            self.pending.lock().unwrap().drain().collect();
        let count = drained.len();
        for (_, request) in drained {
            request.timer.abort();
            let _ = request
                .tx
                .send(Err(FeedError::ConnectionClosed(reason.to_string())));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

fn settle(
    pending: &Mutex<HashMap<String, PendingRequest>>,
    id: &str,
    result: Result<Value, FeedError>,
) -> bool {
    let Some(request) = pending.lock().unwrap().remove(id) else {
        return false;
    };
    request.timer.abort();
    // receiver may already be gone; settling is still complete
    let _ = request.tx.send(result);
    true
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        for request in self.pending.lock().unwrap().values() {
            request.timer.abort();
        }
    }
}
