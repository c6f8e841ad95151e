use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pulse_db::RealtimeStore;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::room::RoomId;
use crate::stream::{ConversationView, MessageStream};

/// One live conversation subscription per room, shared by every holder of a
/// lease on that room.
pub struct StreamHub<S> {
    inner: Arc<HubInner<S>>,
}

impl<S> Clone for StreamHub<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct HubInner<S> {
    store: S,
    /// room -> (stream, live lease ids)
    rooms: RwLock<HashMap<RoomId, HubEntry<S>>>,
}

struct HubEntry<S> {
    stream: MessageStream<S>,
    leases: HashSet<Uuid>,
}

/// A claim on a shared conversation stream. Give it back with
/// [`StreamHub::release`].
#[derive(Debug)]
pub struct RoomLease {
    room: RoomId,
    id: Uuid,
    view: watch::Receiver<ConversationView>,
}

impl RoomLease {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current(&self) -> ConversationView {
        self.view.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<ConversationView> {
        self.view.clone()
    }
}

impl<S: RealtimeStore> StreamHub<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Lease the stream for `room`, opening it if nobody holds one yet.
    pub async fn attach(&self, room: &RoomId) -> Result<RoomLease> {
        let mut rooms = self.inner.rooms.write().await;
        let entry = match rooms.entry(room.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(slot) => slot.insert(HubEntry {
                stream: MessageStream::open(self.inner.store.clone(), room.clone())?,
                leases: HashSet::new(),
            }),
        };

        let id = Uuid::new_v4();
        entry.leases.insert(id);
        debug!("Lease {} on {} ({} held)", id, room, entry.leases.len());

        Ok(RoomLease {
            room: room.clone(),
            id,
            view: entry.stream.watch(),
        })
    }

    /// Give a lease back. Returns false if it was already released. The last
    /// release closes the stream.
    pub async fn release(&self, lease: &RoomLease) -> bool {
        let mut rooms = self.inner.rooms.write().await;
        let Some(entry) = rooms.get_mut(&lease.room) else {
            return false;
        };
        if !entry.leases.remove(&lease.id) {
            return false;
        }

        if entry.leases.is_empty() {
            if let Some(mut entry) = rooms.remove(&lease.room) {
                entry.stream.close();
            }
            info!("Last lease on {} released", lease.room);
        }
        true
    }

    pub async fn open_rooms(&self) -> Vec<RoomId> {
        self.inner.rooms.read().await.keys().cloned().collect()
    }
}
