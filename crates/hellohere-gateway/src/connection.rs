use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::dispatcher::Dispatcher;
use crate::transport::LocalTransport;

/// Server sends a Ping every 15 seconds. If 2 consecutive Pongs are missed
/// (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket whose token was already checked at the upgrade.
///
/// The socket gets a fresh connection id, is attached to the local transport
/// so fan-outs can reach it, and is registered for `identity`. Each text frame
/// goes through the dispatcher. On exit the connection is detached and
/// unregistered.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    transport: LocalTransport,
    identity: Identity,
) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();

    let mut outbound = transport.attach(&connection_id).await;
    if let Err(e) = dispatcher.connect(&connection_id, &identity).await {
        warn!(
            "Failed to register {} for {}: {}",
            connection_id, identity.user_id, e
        );
        transport.detach(&connection_id).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    info!("{} connected as {}", identity.user_id, connection_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward pushed events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = outbound.recv() => {
                    let Some(text) = result else { break };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read actions from client
    let dispatcher_recv = dispatcher.clone();
    let conn_recv = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let response = dispatcher_recv.handle_message(&conn_recv, text.as_str()).await;
                    if response.status != 200 {
                        debug!("{} -> {} {}", conn_recv, response.status, response.message);
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    transport.detach(&connection_id).await;
    dispatcher.disconnect(&connection_id).await;
    info!("{} ({}) disconnected", identity.user_id, connection_id);
}
