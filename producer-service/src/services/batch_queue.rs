//! In-memory batching intake.
//!
//! Submitters push onto a lock-free FIFO and return immediately; a mutex
//! guards only the drain window so exactly one flusher claims an atomic
//! batch of up to `max_drain` requests. The submit path never contends with
//! the flush path beyond the queue's own lock-free operations.

use crossbeam::queue::SegQueue;
use tokio::sync::Mutex;

/// A submit waiting to be expanded into outbox records.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSend {
    pub topic: String,
    pub payload: String,
    /// Restrict fan-out to one group instead of every active group
    pub consumer_group: Option<String>,
}

pub struct BatchQueue {
    queue: SegQueue<QueuedSend>,
    drain_lock: Mutex<()>,
    max_drain: usize,
}

impl BatchQueue {
    pub fn new(max_drain: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            drain_lock: Mutex::new(()),
            max_drain,
        }
    }

    /// Enqueue a submit; returns the queue depth after the push so the
    /// caller can decide whether to trigger an early flush.
    pub fn push(&self, request: QueuedSend) -> usize {
        self.queue.push(request);
        self.queue.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the size trigger has fired.
    pub fn over_threshold(&self) -> bool {
        self.queue.len() >= self.max_drain
    }

    /// Claim up to `max_drain` requests. Serialized by the drain lock so two
    /// concurrent flushes cannot interleave their claims.
    pub async fn drain(&self) -> Vec<QueuedSend> {
        let _guard = self.drain_lock.lock().await;
        let mut batch = Vec::new();
        while batch.len() < self.max_drain {
            match self.queue.pop() {
                Some(request) => batch.push(request),
                None => break,
            }
        }
        batch
    }

    /// Put a failed batch back for the next flush. Order within the batch is
    /// preserved; interleaving with concurrent submits is acceptable (the
    /// pipeline only orders by `created_at` at insert time).
    pub fn requeue(&self, batch: Vec<QueuedSend>) {
        for request in batch {
            self.queue.push(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(topic: &str) -> QueuedSend {
        QueuedSend {
            topic: topic.to_string(),
            payload: "{}".to_string(),
            consumer_group: None,
        }
    }

    #[tokio::test]
    async fn test_drain_claims_at_most_max() {
        let queue = BatchQueue::new(3);
        for i in 0..5 {
            queue.push(send(&format!("t{}", i)));
        }

        let first = queue.drain().await;
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].topic, "t0");

        let second = queue.drain().await;
        assert_eq!(second.len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_requeue_restores_batch() {
        let queue = BatchQueue::new(10);
        queue.push(send("a"));
        queue.push(send("b"));

        let batch = queue.drain().await;
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());

        queue.requeue(batch);
        assert_eq!(queue.len(), 2);
        let again = queue.drain().await;
        assert_eq!(again[0].topic, "a");
    }

    #[test]
    fn test_over_threshold() {
        let queue = BatchQueue::new(2);
        assert!(!queue.over_threshold());
        queue.push(send("a"));
        assert!(!queue.over_threshold());
        queue.push(send("b"));
        assert!(queue.over_threshold());
    }

    #[tokio::test]
    async fn test_concurrent_pushes_all_arrive() {
        use std::sync::Arc;

        let queue = Arc::new(BatchQueue::new(1000));
        let mut handles = Vec::new();
        for i in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    queue.push(QueuedSend {
                        topic: format!("t{}-{}", i, j),
                        payload: "{}".to_string(),
                        consumer_group: None,
                    });
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.len(), 400);
        let batch = queue.drain().await;
        assert_eq!(batch.len(), 400);
    }
}
