use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use qr_capture_common::payload::DecodedPayload;

/// Decoded payloads awaiting hand-off to the transaction processor.
///
/// Append order is capture order. `drain_all` moves the whole backlog out
/// under the lock, so a drain is atomic with respect to concurrent appends:
/// a payload lands either in this drain or in the next one, never in both
/// and never lost. Payloads stay queued until drained — a downstream
/// processing failure loses no captured work.
#[derive(Debug, Default)]
pub struct PendingPayloadQueue {
    inner: Mutex<VecDeque<DecodedPayload>>,
}

impl PendingPayloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, payload: DecodedPayload) {
        self.lock().push_back(payload);
    }

    /// Returns and empties the queue in one atomic step.
    pub fn drain_all(&self) -> Vec<DecodedPayload> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DecodedPayload>> {
        // Payloads are plain data; a poisoned lock loses nothing.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload(byte: u8) -> DecodedPayload {
        DecodedPayload::new(vec![byte], 1)
    }

    #[test]
    fn drain_returns_capture_order_and_empties() {
        let queue = PendingPayloadQueue::new();
        queue.append(payload(1));
        queue.append(payload(2));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].data(), &[1]);
        assert_eq!(drained[1].data(), &[2]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn concurrent_append_and_drain_loses_nothing() {
        let queue = Arc::new(PendingPayloadQueue::new());
        let writer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    queue.append(payload(7));
                }
            })
        };

        let mut collected = Vec::new();
        while collected.len() < 100 {
            collected.extend(queue.drain_all());
            std::thread::yield_now();
        }
        writer.join().unwrap();
        assert_eq!(collected.len(), 100);
        assert!(queue.is_empty());
    }
}
