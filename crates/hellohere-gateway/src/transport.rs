//! Outbound push to a single connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The connection no longer exists. Callers prune it from the registry.
    #[error("connection gone")]
    Gone,

    #[error("push failed: {0}")]
    Failed(String),
}

/// Delivers a serialized event to one connection id.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn push(&self, connection_id: &str, payload: &str) -> Result<(), PushError>;
}

/// In-process transport for the built-in WebSocket server.
///
/// Each socket task attaches a channel under its connection id and drains it
/// into the socket. A connection with no channel, or whose socket task has
/// exited, is reported as [`PushError::Gone`].
#[derive(Clone, Default)]
pub struct LocalTransport {
    channels: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<String>>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, connection_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .write()
            .await
            .insert(connection_id.to_string(), tx);
        rx
    }

    pub async fn detach(&self, connection_id: &str) {
        self.channels.write().await.remove(connection_id);
    }

    pub async fn is_attached(&self, connection_id: &str) -> bool {
        self.channels.read().await.contains_key(connection_id)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn push(&self, connection_id: &str, payload: &str) -> Result<(), PushError> {
        let channels = self.channels.read().await;
        let tx = channels.get(connection_id).ok_or(PushError::Gone)?;
        tx.send(payload.to_string()).map_err(|_| PushError::Gone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_reaches_attached_channel() {
        let transport = LocalTransport::new();
        let mut rx = transport.attach("c1").await;

        transport.push("c1", "hello").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_unknown_or_closed_connection_is_gone() {
        let transport = LocalTransport::new();
        assert_eq!(transport.push("nobody", "x").await, Err(PushError::Gone));

        let rx = transport.attach("c1").await;
        drop(rx);
        assert_eq!(transport.push("c1", "x").await, Err(PushError::Gone));

        transport.detach("c1").await;
        assert!(!transport.is_attached("c1").await);
    }
}
