//! Periodic `updateUserLocation` ping to every live connection.
//!
//! Clients answer with `updateUserLocationSuccess`, which keeps their
//! presence fresh. Connections found gone during the sweep are pruned by the
//! broadcaster.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use hellohere_types::events::ServerEvent;

use crate::chat::ChatService;
use crate::delivery::DeliveryReport;

/// One sweep over all registered connections.
pub async fn ping_all(chat: &ChatService) -> DeliveryReport {
    let report = chat
        .broadcaster()
        .broadcast_all(&ServerEvent::UpdateUserLocation {})
        .await;
    debug!(
        "Location ping: {} delivered, {} pruned, {} failed",
        report.delivered, report.pruned, report.failed
    );
    report
}

pub fn spawn_location_pings(chat: Arc<ChatService>, period: Duration) -> JoinHandle<()> {
    info!("Location pings every {:?}", period);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            ping_all(&chat).await;
        }
    })
}
