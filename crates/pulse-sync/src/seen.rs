use pulse_db::RealtimeStore;
use pulse_types::models::{Message, MessageRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::paths;
use crate::records;
use crate::room::RoomId;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenOutcome {
    Marked,
    AlreadySeen,
}

/// Flips `seen` from false to true, once, on behalf of the receiver.
#[derive(Clone)]
pub struct SeenTracker<S> {
    store: S,
}

impl<S: RealtimeStore> SeenTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn mark_seen(&self, session: &Session, room: &RoomId, message_id: &str) -> Result<SeenOutcome> {
        let actor = session.actor()?;
        let path = paths::message(room, message_id)?;
        let value = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| SyncError::NotFound(path.to_string()))?;
        let message: MessageRecord = records::decode(&path, value)?;

        if message.receiver_id != actor.id {
            return Err(SyncError::NotRecipient);
        }
        if message.seen {
            debug!("Message {} in {} already seen", message_id, room);
            return Ok(SeenOutcome::AlreadySeen);
        }

        let mut fields = Map::new();
        fields.insert("seen".into(), Value::Bool(true));
        self.store.update(&path, fields).await?;

        info!("{} acknowledged message {} in {}", actor.id, message_id, room);
        Ok(SeenOutcome::Marked)
    }
}

/// Displayed messages `viewer_id` still has to acknowledge: sent by the other
/// party, addressed to the viewer, not yet seen.
pub fn pending_acknowledgements<'m>(messages: &'m [Message], viewer_id: &str) -> Vec<&'m Message> {
    messages
        .iter()
        .filter(|m| !m.seen && m.receiver_id == viewer_id && m.sender_id != viewer_id)
        .collect()
}
