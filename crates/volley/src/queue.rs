//! Bounded inbound message queue
//!
//! The socket reader task is the only producer and the session is the only
//! consumer. Falling `capacity` messages behind the server is fatal: the
//! producer reports [`VolleyError::ProtocolDesync`] instead of blocking or
//! dropping. Transport failures are parked in a shared [`FailureSlot`] and a
//! sentinel wakes a consumer blocked in [`QueueConsumer::take`].

use crate::result::{VolleyError, VolleyResult};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Default number of unread messages a session may fall behind
pub const DEFAULT_CAPACITY: usize = 5;

#[derive(Debug)]
enum Inbound {
    Message(String),
    Failed,
}

/// First failure reported by the transport, if any
#[derive(Debug, Clone, Default)]
pub struct FailureSlot(Arc<Mutex<Option<VolleyError>>>);

impl FailureSlot {
    /// Record a failure; the first one wins
    pub fn set(&self, err: VolleyError) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Take the recorded failure
    pub fn take(&self) -> Option<VolleyError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Whether a failure is pending
    pub fn is_set(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

/// Create a connected producer/consumer pair
///
/// `warn_interval` controls how often a consumer blocked in `take` logs that
/// it is still waiting.
#[must_use]
pub fn receive_queue(capacity: usize, warn_interval: Duration) -> (QueueProducer, QueueConsumer) {
    let capacity = capacity.max(1);
    // One extra slot so the failure sentinel fits behind a full queue
    let (tx, rx) = mpsc::channel(capacity + 1);
    let failure = FailureSlot::default();
    (
        QueueProducer {
            tx,
            capacity,
            failure: failure.clone(),
        },
        QueueConsumer {
            rx,
            failure,
            warn_interval,
        },
    )
}

/// Writing end, owned by the socket reader
#[derive(Debug)]
pub struct QueueProducer {
    tx: mpsc::Sender<Inbound>,
    capacity: usize,
    failure: FailureSlot,
}

impl QueueProducer {
    /// Enqueue a message without blocking
    pub fn offer(&self, message: String) -> VolleyResult<()> {
        let queued = self.tx.max_capacity() - self.tx.capacity();
        if queued >= self.capacity {
            return Err(self.overflow());
        }
        match self.tx.try_send(Inbound::Message(message)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(self.overflow()),
            Err(TrySendError::Closed(_)) => Err(VolleyError::websocket("receive queue consumer is gone")),
        }
    }

    /// Report a transport failure and wake the consumer
    pub fn fail(&self, err: VolleyError) {
        self.failure.set(err);
        let _ = self.tx.try_send(Inbound::Failed);
    }

    fn overflow(&self) -> VolleyError {
        VolleyError::desync(format!("receive queue is full (max = {})", self.capacity))
    }
}

/// Reading end, owned by the session
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<Inbound>,
    failure: FailureSlot,
    warn_interval: Duration,
}

impl QueueConsumer {
    /// Wait for the next message
    ///
    /// There is no overall timeout; a stuck session is surfaced by a warning
    /// every `warn_interval` and ends only when the transport fails.
    pub async fn take(&mut self, event: &str, line_number: usize) -> VolleyResult<String> {
        let mut waited = Duration::ZERO;
        loop {
            match tokio::time::timeout(self.warn_interval, self.rx.recv()).await {
                Ok(Some(Inbound::Message(message))) => return Ok(message),
                Ok(Some(Inbound::Failed) | None) => {
                    return Err(self
                        .failure
                        .take()
                        .unwrap_or_else(|| VolleyError::websocket("connection closed")));
                }
                Err(_) => {
                    waited += self.warn_interval;
                    warn!(
                        "{event} line {line_number}: Haven't received message after {} seconds",
                        waited.as_secs()
                    );
                }
            }
        }
    }

    /// Failure slot shared with the producer
    #[must_use]
    pub const fn failure(&self) -> &FailureSlot {
        &self.failure
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const WARN: Duration = Duration::from_secs(30);

    #[test]
    fn test_sixth_offer_overflows() {
        let (producer, _consumer) = receive_queue(DEFAULT_CAPACITY, WARN);
        for i in 0..5 {
            producer.offer(format!("m{i}")).unwrap();
        }
        let err = producer.offer("m5".to_string()).unwrap_err();
        assert!(matches!(err, VolleyError::ProtocolDesync { .. }));
        assert!(err.to_string().contains("max = 5"));
    }

    #[tokio::test]
    async fn test_take_in_order() {
        let (producer, mut consumer) = receive_queue(DEFAULT_CAPACITY, WARN);
        producer.offer("one".to_string()).unwrap();
        producer.offer("two".to_string()).unwrap();
        assert_eq!(consumer.take("WS_RECV", 1).await.unwrap(), "one");
        assert_eq!(consumer.take("WS_RECV", 2).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_fail_wakes_blocked_consumer() {
        let (producer, mut consumer) = receive_queue(DEFAULT_CAPACITY, WARN);
        let waiter = tokio::spawn(async move { consumer.take("WS_RECV", 7).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.fail(VolleyError::websocket("Server closed websocket connection"));
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Server closed"));
    }

    #[tokio::test]
    async fn test_fail_behind_full_queue_still_delivered() {
        let (producer, mut consumer) = receive_queue(2, WARN);
        producer.offer("a".to_string()).unwrap();
        producer.offer("b".to_string()).unwrap();
        producer.fail(VolleyError::desync("overflow"));
        assert_eq!(consumer.take("WS_RECV", 1).await.unwrap(), "a");
        assert_eq!(consumer.take("WS_RECV", 1).await.unwrap(), "b");
        assert!(consumer.take("WS_RECV", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_producer_ends_take() {
        let (producer, mut consumer) = receive_queue(DEFAULT_CAPACITY, WARN);
        drop(producer);
        let err = consumer.take("WS_RECV", 1).await.unwrap_err();
        assert!(matches!(err, VolleyError::WebSocket { .. }));
    }

    #[test]
    fn test_failure_slot_first_wins() {
        let slot = FailureSlot::default();
        slot.set(VolleyError::websocket("first"));
        slot.set(VolleyError::websocket("second"));
        assert!(slot.is_set());
        assert!(slot.take().unwrap().to_string().contains("first"));
        assert!(!slot.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_keeps_waiting_past_warn_interval() {
        let (producer, mut consumer) = receive_queue(DEFAULT_CAPACITY, Duration::from_millis(10));
        let waiter = tokio::spawn(async move { consumer.take("WS_RECV", 1).await });
        tokio::time::sleep(Duration::from_millis(55)).await;
        producer.offer("late".to_string()).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "late");
    }
}
