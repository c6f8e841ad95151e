use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use pulse_sync::{Actor, Feed, RealtimeStore, StreamHub};
use pulse_types::events::{GatewayCommand, GatewayEvent};

use crate::subscriptions::Subscriptions;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one WebSocket for an already validated actor. The token was checked
/// at the HTTP upgrade, so the loop starts with `Ready`.
pub async fn handle_connection<S: RealtimeStore>(socket: WebSocket, actor: Actor, hub: StreamHub<S>, feed: Feed<S>) {
    let (sender, receiver) = socket.split();
    run_connection(sender, receiver, actor, hub, feed, HEARTBEAT_INTERVAL).await;
}

pub(crate) async fn run_connection<W, R, S>(
    sender: W,
    mut receiver: R,
    actor: Actor,
    hub: StreamHub<S>,
    feed: Feed<S>,
    heartbeat: Duration,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    S: RealtimeStore,
{
    info!("{} ({}) connected to gateway", actor.username, actor.id);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let ready = GatewayEvent::Ready {
        user_id: actor.id.clone(),
        username: actor.username.clone(),
    };
    if events_tx.send(ready).is_err() {
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let mut send_task = tokio::spawn(forward_events(sender, events_rx, pong_received.clone(), heartbeat));

    let mut subscriptions = Subscriptions::new(actor.clone(), hub, feed, events_tx);

    loop {
        let msg = tokio::select! {
            _ = &mut send_task => break,
            msg = receiver.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<GatewayCommand>(&text) {
                Ok(cmd) => subscriptions.handle(cmd).await,
                Err(e) => {
                    warn!(
                        "{} ({}) bad command: {} -- raw: {}",
                        actor.username,
                        actor.id,
                        e,
                        text.chars().take(200).collect::<String>()
                    );
                }
            },
            Some(Ok(Message::Pong(_))) => pong_received.store(true, Ordering::Release),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                warn!("{} ({}) socket error: {}", actor.username, actor.id, e);
                break;
            }
            Some(Ok(_)) => {}
        }
    }

    send_task.abort();
    subscriptions.release_all().await;
    info!("{} ({}) disconnected from gateway", actor.username, actor.id);
}

/// Write queued events to the client and keep the heartbeat going.
async fn forward_events<W>(
    mut sender: W,
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
    pong_received: Arc<AtomicBool>,
    interval: Duration,
) where
    W: Sink<Message> + Unpin,
{
    let mut heartbeat = tokio::time::interval(interval);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode gateway event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
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
}
