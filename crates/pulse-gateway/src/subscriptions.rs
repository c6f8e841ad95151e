use std::collections::HashMap;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pulse_sync::{
    Actor, ConversationView, Feed, FeedSnapshot, FeedStream, LiveView, RealtimeStore, RoomId, RoomLease, StreamHub,
    pending_acknowledgements,
};
use pulse_types::events::{GatewayCommand, GatewayEvent};

/// What one connection has open. Everything here is released when the
/// connection goes away.
pub struct Subscriptions<S> {
    actor: Actor,
    hub: StreamHub<S>,
    feed: Feed<S>,
    events: mpsc::UnboundedSender<GatewayEvent>,
    /// peer id -> (lease, forwarder)
    rooms: HashMap<String, (RoomLease, JoinHandle<()>)>,
    feed_stream: Option<(FeedStream, JoinHandle<()>)>,
}

impl<S: RealtimeStore> Subscriptions<S> {
    pub fn new(actor: Actor, hub: StreamHub<S>, feed: Feed<S>, events: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self {
            actor,
            hub,
            feed,
            events,
            rooms: HashMap::new(),
            feed_stream: None,
        }
    }

    pub async fn handle(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::OpenRoom { peer_id } => self.open_room(peer_id).await,
            GatewayCommand::CloseRoom { peer_id } => self.close_room(&peer_id).await,
            GatewayCommand::OpenFeed => self.open_feed(),
            GatewayCommand::CloseFeed => self.close_feed(),
        }
    }

    async fn open_room(&mut self, peer_id: String) {
        if self.rooms.contains_key(&peer_id) {
            debug!("{} already streams the room with {}", self.actor.username, peer_id);
            return;
        }

        let room = match RoomId::derive(&self.actor.id, &peer_id) {
            Ok(room) => room,
            Err(e) => return self.reject(e.to_string()),
        };
        let lease = match self.hub.attach(&room).await {
            Ok(lease) => lease,
            Err(e) => return self.reject(e.to_string()),
        };

        info!("{} opened room {}", self.actor.username, room);
        let room_id = room.as_str().to_string();
        let viewer_id = self.actor.id.clone();
        let forwarder = spawn_forwarder(lease.receiver(), self.events.clone(), move |view: ConversationView| {
            let unseen = pending_acknowledgements(&view.data, &viewer_id)
                .into_iter()
                .map(|message| message.id.clone())
                .collect();
            GatewayEvent::RoomSnapshot {
                room_id: room_id.clone(),
                state: view.state,
                messages: view.data,
                unseen,
            }
        });
        self.rooms.insert(peer_id, (lease, forwarder));
    }

    async fn close_room(&mut self, peer_id: &str) {
        let Some((lease, forwarder)) = self.rooms.remove(peer_id) else {
            debug!("{} closed a room that was not open", self.actor.username);
            return;
        };
        forwarder.abort();
        self.hub.release(&lease).await;
        info!("{} closed room {}", self.actor.username, lease.room());
    }

    fn open_feed(&mut self) {
        if self.feed_stream.is_some() {
            return;
        }
        let stream = self.feed.watch();
        let forwarder = spawn_forwarder(stream.watch(), self.events.clone(), |view: LiveView<FeedSnapshot>| {
            GatewayEvent::FeedSnapshot {
                state: view.state,
                posts: view.data.newest_first().cloned().collect(),
            }
        });
        self.feed_stream = Some((stream, forwarder));
        info!("{} opened the feed", self.actor.username);
    }

    fn close_feed(&mut self) {
        if let Some((mut stream, forwarder)) = self.feed_stream.take() {
            forwarder.abort();
            stream.close();
        }
    }

    fn reject(&self, reason: String) {
        warn!("Rejected command from {}: {}", self.actor.username, reason);
        let _ = self.events.send(GatewayEvent::Rejected { reason });
    }

    pub fn open_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Release every lease and stream this connection holds.
    pub async fn release_all(&mut self) {
        let peers: Vec<String> = self.rooms.keys().cloned().collect();
        for peer_id in peers {
            self.close_room(&peer_id).await;
        }
        self.close_feed();
    }
}

/// Push the current view and every later one until the source closes.
fn spawn_forwarder<T, F>(
    mut view: watch::Receiver<LiveView<T>>,
    events: mpsc::UnboundedSender<GatewayEvent>,
    to_event: F,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(LiveView<T>) -> GatewayEvent + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let current = view.borrow_and_update().clone();
            if events.send(to_event(current)).is_err() {
                break;
            }
            if view.changed().await.is_err() {
                break;
            }
        }
    })
}
