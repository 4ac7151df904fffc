use cardrender_common::protocol::RequestId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedSemaphorePermit;

/// Request ids currently in flight on one client.
pub(crate) type InFlight = Arc<Mutex<HashSet<RequestId>>>;

/// Holds a concurrency slot for the duration of one request.
///
/// Dropping the guard returns the slot to the semaphore and removes the
/// request from the in-flight set. This happens on every exit path,
/// including when the request future is dropped mid-await.
pub(crate) struct SlotGuard {
    _permit: OwnedSemaphorePermit,
    in_flight: InFlight,
    request_id: RequestId,
}

impl SlotGuard {
    pub(crate) fn new(permit: OwnedSemaphorePermit, in_flight: InFlight, request_id: RequestId) -> Self {
        lock(&in_flight).insert(request_id.clone());
        Self {
            _permit: permit,
            in_flight,
            request_id,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.request_id);
    }
}

/// Locks the in-flight set, recovering it if another thread panicked while
/// holding the lock.
pub(crate) fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashSet<RequestId>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
