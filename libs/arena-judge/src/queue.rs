//! Bounded FIFO of submission ids waiting for a worker.
//!
//! `enqueue` waits while the queue is full, so a burst of submissions
//! stalls the caller instead of dropping work. Every id is handed to
//! exactly one worker.

use crate::metrics;
use arena_common::types::SubmissionId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("submission queue is closed")]
pub struct QueueClosed;

/// Cloneable handle; all clones share one channel
#[derive(Clone)]
pub struct SubmissionQueue {
    tx: async_channel::Sender<SubmissionId>,
    rx: async_channel::Receiver<SubmissionId>,
}

impl SubmissionQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Append an id, waiting for a free slot when the queue is full
    pub async fn enqueue(&self, id: SubmissionId) -> Result<(), QueueClosed> {
        self.tx.send(id).await.map_err(|_| QueueClosed)?;
        metrics::QUEUE_DEPTH.set(self.len() as i64);
        Ok(())
    }

    /// Next id in FIFO order. `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<SubmissionId> {
        let id = self.rx.recv().await.ok()?;
        metrics::QUEUE_DEPTH.set(self.len() as i64);
        Some(id)
    }

    /// Stop accepting ids; already queued ids can still be dequeued
    pub fn close(&self) {
        self.tx.close();
    }

    /// Take every id still queued without waiting. Used at shutdown.
    pub fn drain(&self) -> Vec<SubmissionId> {
        let mut ids = Vec::new();
        while let Ok(id) = self.rx.try_recv() {
            ids.push(id);
        }
        metrics::QUEUE_DEPTH.set(self.len() as i64);
        ids
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = SubmissionQueue::bounded(10);
        for id in 1..=5 {
            queue.enqueue(id).await.unwrap();
        }
        assert_eq!(queue.len(), 5);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(queue.dequeue().await.unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_blocks_when_full() {
        let queue = SubmissionQueue::bounded(2);
        assert_eq!(queue.capacity(), 2);
        queue.enqueue(1).await.unwrap();
        queue.enqueue(2).await.unwrap();

        // Full: the third enqueue must not complete on its own
        let blocked = timeout(Duration::from_millis(50), queue.enqueue(3)).await;
        assert!(blocked.is_err());
        assert_eq!(queue.len(), 2);

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(3).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.dequeue().await, Some(1));
        timeout(Duration::from_secs(1), producer)
            .await
            .expect("enqueue resumes once a slot frees")
            .unwrap()
            .unwrap();

        assert_eq!(queue.dequeue().await, Some(2));
        assert_eq!(queue.dequeue().await, Some(3));
    }

    #[tokio::test]
    async fn test_each_id_goes_to_one_consumer() {
        let queue = SubmissionQueue::bounded(100);
        for id in 0..50 {
            queue.enqueue(id).await.unwrap();
        }
        queue.close();

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(id) = queue.dequeue().await {
                    got.push(id);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_closed_queue_drains_then_ends() {
        let queue = SubmissionQueue::bounded(4);
        queue.enqueue(7).await.unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(8).await, Err(QueueClosed));
        assert_eq!(queue.dequeue().await, Some(7));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn test_drain_takes_remaining() {
        let queue = SubmissionQueue::bounded(4);
        for id in [3, 1, 2] {
            queue.enqueue(id).await.unwrap();
        }
        queue.close();
        assert_eq!(queue.drain(), vec![3, 1, 2]);
        assert_eq!(queue.dequeue().await, None);
    }
}
