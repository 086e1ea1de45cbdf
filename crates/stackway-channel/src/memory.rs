use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, Notify};
use tracing::trace;

use crate::error::Result;
use crate::traits::MessageChannel;
use crate::types::MessageEnvelope;

/// In-memory message channel: one FIFO queue per topic.
///
/// Used by the test suites and single-node deployments. Waiting receivers are
/// woken through a shared `Notify`; with a single consumer per topic (the
/// model the dispatcher assumes) this is strictly FIFO.
#[derive(Debug, Default)]
pub struct InMemoryChannel {
    queues: Mutex<HashMap<String, VecDeque<MessageEnvelope>>>,
    notify: Notify,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued envelopes on a topic. Test helper.
    pub async fn depth(&self, topic: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(topic)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<()> {
        let mut queues = self.queues.lock().await;
        trace!(topic = %envelope.channel, subtype = ?envelope.subtype, "queueing envelope");
        queues
            .entry(envelope.channel.clone())
            .or_default()
            .push_back(envelope);
        drop(queues);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn try_poll(&self, topic: &str) -> Result<Option<MessageEnvelope>> {
        let mut queues = self.queues.lock().await;
        Ok(queues.get_mut(topic).and_then(VecDeque::pop_front))
    }

    async fn recv(&self, topic: &str) -> Result<MessageEnvelope> {
        loop {
            // Register with the notifier before checking the queue, so a
            // publish landing in between cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(envelope) = self.try_poll(topic).await? {
                return Ok(envelope);
            }
            notified.await;
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageSubtype;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn envelope(topic: &str, n: u64) -> MessageEnvelope {
        MessageEnvelope {
            channel: topic.to_string(),
            subtype: MessageSubtype::AgentStatus,
            payload: json!({"n": n}),
            return_channel: None,
        }
    }

    #[tokio::test]
    async fn test_publish_poll_fifo_order() {
        let channel = InMemoryChannel::new();
        for n in 0..3 {
            channel.publish(envelope("worker", n)).await.unwrap();
        }
        assert_eq!(channel.depth("worker").await, 3);
        for n in 0..3 {
            let received = channel.try_poll("worker").await.unwrap().unwrap();
            assert_eq!(received.payload["n"], n);
        }
        assert!(channel.try_poll("worker").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let channel = InMemoryChannel::new();
        channel.publish(envelope("worker", 1)).await.unwrap();
        channel.publish(envelope("status", 2)).await.unwrap();

        assert!(channel.try_poll("status").await.unwrap().is_some());
        assert_eq!(channel.depth("worker").await, 1);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let channel = Arc::new(InMemoryChannel::new());
        let receiver = Arc::clone(&channel);
        let handle = tokio::spawn(async move { receiver.recv("status").await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.publish(envelope("status", 42)).await.unwrap();

        let received = handle.await.unwrap().unwrap();
        assert_eq!(received.payload["n"], 42);
    }

    #[tokio::test]
    async fn test_recv_returns_already_queued() {
        let channel = InMemoryChannel::new();
        channel.publish(envelope("status", 7)).await.unwrap();
        let received = channel.recv("status").await.unwrap();
        assert_eq!(received.payload["n"], 7);
    }
}
