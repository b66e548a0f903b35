//! Event bus contract (C11): at-least-once, advisory pub/sub for workflow
//! and task lifecycle events.
//!
//! A `publish`/`subscribe` trait so the scheduler's poll-based correctness
//! path does not depend on which event transport backs a deployment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::WorkflowResult;

/// Event bus contract. Delivery is at-least-once with no ordering
/// guarantee across channels; consumers must treat events as hints and
/// fall back to polling the state store for correctness (see the
/// scheduler's reconciliation pass).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> WorkflowResult<()>;
    async fn subscribe(&self, channel: &str) -> WorkflowResult<broadcast::Receiver<serde_json::Value>>;
}

/// Well-known event channel names.
pub mod channels {
    pub const WORKFLOW_STARTED: &str = "workflow_started";
    pub const WORKFLOW_COMPLETED: &str = "workflow_completed";
    pub const WORKFLOW_FAILED: &str = "workflow_failed";
    pub const TASK_COMPLETED: &str = "task_completed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletedEvent {
    pub task_id: String,
    pub node_id: String,
    pub run_id: String,
    pub success: bool,
}

/// In-memory event bus backed by a per-channel broadcast sender. New
/// subscribers only see events published after they subscribe, consistent
/// with the contract's "advisory only" status: correctness never depends
/// on a subscriber having been attached before a given event fired.
pub struct InMemoryEventBus {
    channels: dashmap::DashMap<String, broadcast::Sender<serde_json::Value>>,
    capacity: usize,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        Self { channels: dashmap::DashMap::new(), capacity }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<serde_json::Value> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> WorkflowResult<()> {
        // No subscribers is not an error: at-least-once delivery only
        // applies to subscribers that exist at publish time.
        let _ = self.sender_for(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> WorkflowResult<broadcast::Receiver<serde_json::Value>> {
        Ok(self.sender_for(channel).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = InMemoryEventBus::default();
        let mut rx = bus.subscribe(channels::TASK_COMPLETED).await.unwrap();
        bus.publish(channels::TASK_COMPLETED, serde_json::json!({"task_id": "t1"})).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received["task_id"], "t1");
    }
}
