//! Live connection bookkeeping: which connection belongs to which user,
//! and which room each connection has open.

use std::sync::Arc;

use tracing::{debug, info, warn};

use hellohere_db::{ConnectionStore, PresenceStore, Store};
use hellohere_types::models::ConnectionInfo;

use crate::clock::Clock;
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    /// The connection id was already known; the row was refreshed in place.
    Refreshed,
}

pub struct ConnectionRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a connection for `user_id`. Registering the same id twice is a
    /// no-op beyond refreshing the user and nickname columns.
    pub async fn register(
        &self,
        connection_id: &str,
        user_id: &str,
        nickname: Option<&str>,
    ) -> Result<Registration, ChatError> {
        let row = ConnectionInfo {
            connection_id: connection_id.to_string(),
            user_id: user_id.to_string(),
            nickname: nickname.map(str::to_string),
            active_room_id: None,
            connected_at: self.clock.now_ms(),
        };

        let created = self.store.put_connection(&row).await?;
        if !created {
            debug!("Connection {} re-registered for {}", connection_id, user_id);
            return Ok(Registration::Refreshed);
        }

        self.store.set_online(user_id, nickname, true).await?;
        info!("Connection {} registered for {}", connection_id, user_id);
        Ok(Registration::New)
    }

    /// Look up a connection. A missing row is `Ok(None)`.
    pub async fn resolve(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, ChatError> {
        Ok(self.store.get_connection(connection_id).await?)
    }

    /// Resolve a connection that must exist for the action to proceed.
    pub async fn authenticate(&self, connection_id: &str) -> Result<ConnectionInfo, ChatError> {
        self.resolve(connection_id)
            .await?
            .ok_or_else(|| ChatError::Unauthorized("invalid connection".into()))
    }

    /// Drop a connection row. The user goes offline once their last
    /// connection is gone.
    pub async fn unregister(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, ChatError> {
        let Some(removed) = self.store.delete_connection(connection_id).await? else {
            return Ok(None);
        };

        let remaining = self.store.connections_for_user(&removed.user_id).await?;
        if remaining.is_empty() {
            self.store.set_online(&removed.user_id, None, false).await?;
        }

        info!(
            "Connection {} unregistered for {} ({} remaining)",
            connection_id,
            removed.user_id,
            remaining.len()
        );
        Ok(Some(removed))
    }

    pub async fn connections_for(&self, user_id: &str) -> Result<Vec<ConnectionInfo>, ChatError> {
        Ok(self.store.connections_for_user(user_id).await?)
    }

    pub async fn all(&self) -> Result<Vec<ConnectionInfo>, ChatError> {
        Ok(self.store.all_connections().await?)
    }

    /// Best effort. Failures are logged and never fail the calling action.
    pub async fn set_active_room(&self, connection_id: &str, room_id: Option<&str>) {
        if let Err(e) = self.store.set_active_room(connection_id, room_id).await {
            warn!(
                "Failed to set active room {:?} on {}: {}",
                room_id, connection_id, e
            );
        }
    }
}
