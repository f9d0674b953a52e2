//! Fan-out of server events to every live connection of a set of users.
//!
//! Delivery is best effort and never fails the action that triggered it.
//! A connection the transport reports as gone is pruned from the registry
//! so later fan-outs skip it.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, error, warn};

use hellohere_types::events::ServerEvent;

use crate::registry::ConnectionRegistry;
use crate::transport::{PushError, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The connection was gone and has been removed.
    Pruned,
    Failed,
}

/// Per-connection outcomes of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub pruned: usize,
    pub failed: usize,
}

impl DeliveryReport {
    fn record(&mut self, outcome: Delivery) {
        match outcome {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Pruned => self.pruned += 1,
            Delivery::Failed => self.failed += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.pruned + self.failed
    }
}

pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    transport: Arc<dyn Transport>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self { registry, transport }
    }

    pub async fn send_to_connection(&self, connection_id: &str, event: &ServerEvent) -> Delivery {
        match encode(event) {
            Some(payload) => self.push(connection_id, &payload).await,
            None => Delivery::Failed,
        }
    }

    /// Push `event` to every connection of every listed user, concurrently.
    /// Users without connections are skipped.
    pub async fn broadcast_to_users(&self, user_ids: &[&str], event: &ServerEvent) -> DeliveryReport {
        let Some(payload) = encode(event) else {
            return DeliveryReport {
                failed: user_ids.len(),
                ..Default::default()
            };
        };

        let lookups = join_all(user_ids.iter().map(|user| self.registry.connections_for(user))).await;
        let mut targets = Vec::new();
        for (user, found) in user_ids.iter().zip(lookups) {
            match found {
                Ok(conns) => targets.extend(conns.into_iter().map(|c| c.connection_id)),
                Err(e) => warn!("Connection lookup for {} failed: {}", user, e),
            }
        }

        let report = self.push_all(&targets, &payload).await;
        debug!(
            "{} to {:?}: {} delivered, {} pruned, {} failed",
            event.name(),
            user_ids,
            report.delivered,
            report.pruned,
            report.failed
        );
        report
    }

    /// Push `event` to every registered connection.
    pub async fn broadcast_all(&self, event: &ServerEvent) -> DeliveryReport {
        let Some(payload) = encode(event) else {
            return DeliveryReport::default();
        };

        let targets: Vec<String> = match self.registry.all().await {
            Ok(conns) => conns.into_iter().map(|c| c.connection_id).collect(),
            Err(e) => {
                warn!("Listing connections for {} failed: {}", event.name(), e);
                return DeliveryReport::default();
            }
        };

        self.push_all(&targets, &payload).await
    }

    async fn push_all(&self, connection_ids: &[String], payload: &str) -> DeliveryReport {
        let outcomes = join_all(connection_ids.iter().map(|id| self.push(id, payload))).await;
        let mut report = DeliveryReport::default();
        for outcome in outcomes {
            report.record(outcome);
        }
        report
    }

    async fn push(&self, connection_id: &str, payload: &str) -> Delivery {
        match self.transport.push(connection_id, payload).await {
            Ok(()) => Delivery::Delivered,
            Err(PushError::Gone) => {
                debug!("Connection {} is gone, pruning", connection_id);
                if let Err(e) = self.registry.unregister(connection_id).await {
                    warn!("Failed to prune {}: {}", connection_id, e);
                }
                Delivery::Pruned
            }
            Err(PushError::Failed(e)) => {
                warn!("Push to {} failed: {}", connection_id, e);
                Delivery::Failed
            }
        }
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(payload) => Some(payload),
        Err(e) => {
            error!("Failed to serialize {}: {}", event.name(), e);
            None
        }
    }
}
