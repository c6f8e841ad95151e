use chrono::Utc;
use pulse_db::{RealtimeStore, StorePath};
use pulse_types::models::{Message, MessageRecord};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::live::{LiveQuery, LiveView};
use crate::paths;
use crate::records;
use crate::room::RoomId;
use crate::seen::{SeenOutcome, SeenTracker};
use crate::session::Session;

/// Messages of one conversation in store insertion order.
pub type ConversationView = LiveView<Vec<Message>>;

/// Live, ordered view of one conversation plus the writes that feed it.
///
/// Messages are listed in the order the store appended them; timestamps are
/// carried but never used to re-sort.
pub struct MessageStream<S> {
    store: S,
    room: RoomId,
    query: LiveQuery<Vec<Message>>,
}

impl<S: RealtimeStore> MessageStream<S> {
    pub fn open(store: S, room: RoomId) -> Result<Self> {
        let path = paths::messages(&room)?;
        let query = LiveQuery::open(&store, path, decode_messages);
        info!("Opened conversation {}", room);
        Ok(Self { store, room, query })
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn view(&self) -> ConversationView {
        self.query.current()
    }

    pub fn watch(&self) -> watch::Receiver<ConversationView> {
        self.query.watch()
    }

    pub async fn changed(&mut self) -> Option<ConversationView> {
        self.query.changed().await
    }

    /// Wait for the first snapshot.
    pub async fn ready(&mut self) -> ConversationView {
        self.query.ready().await
    }

    /// Append a message from the acting user to `receiver_id`. The new
    /// message shows up through the live view; this does not wait for it.
    pub async fn send(&self, session: &Session, receiver_id: &str, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let actor = session.actor()?;
        let room = RoomId::derive(&actor.id, receiver_id)?;
        if room != self.room {
            return Err(SyncError::InvalidParticipants);
        }
        append(&self.store, &room, &actor.id, receiver_id, text).await
    }

    pub async fn mark_seen(&self, session: &Session, message_id: &str) -> Result<SeenOutcome> {
        SeenTracker::new(self.store.clone())
            .mark_seen(session, &self.room, message_id)
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.query.is_closed()
    }

    pub fn close(&mut self) {
        self.query.close();
    }
}

/// One-shot send without an open stream. Returns the room and the new key.
pub async fn send_message<S: RealtimeStore>(
    store: &S,
    session: &Session,
    receiver_id: &str,
    text: &str,
) -> Result<(RoomId, String)> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SyncError::EmptyMessage);
    }
    let actor = session.actor()?;
    let room = RoomId::derive(&actor.id, receiver_id)?;
    let key = append(store, &room, &actor.id, receiver_id, text).await?;
    Ok((room, key))
}

/// Point read of a conversation.
pub async fn load_messages<S: RealtimeStore>(store: &S, room: &RoomId) -> Result<Vec<Message>> {
    let path = paths::messages(room)?;
    let snapshot = store.get(&path).await?;
    Ok(decode_messages(&path, snapshot))
}

pub fn decode_messages(path: &StorePath, value: Option<Value>) -> Vec<Message> {
    records::decode_children::<MessageRecord>(path, value)
        .into_iter()
        .map(|(key, record)| Message::from_record(key, record))
        .collect()
}

async fn append<S: RealtimeStore>(
    store: &S,
    room: &RoomId,
    sender_id: &str,
    receiver_id: &str,
    text: &str,
) -> Result<String> {
    let record = MessageRecord {
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
        seen: false,
    };
    let path = paths::messages(room)?;
    let key = store.push(&path, records::encode(&path, &record)?).await?;
    debug!("Appended message {} to {}", key, room);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{provision, session_for, store};
    use pulse_types::events::StreamState;

    #[tokio::test]
    async fn test_send_then_read_ends_with_sent_message() {
        let store = store();
        provision(&store, "uid-1", "alice").await;
        let alice = session_for(&store, "uid-1").await;

        let room = RoomId::derive("uid-1", "uid-2").unwrap();
        let mut stream = MessageStream::open(store.clone(), room.clone()).unwrap();
        assert_eq!(stream.ready().await.state, StreamState::Live);

        stream.send(&alice, "uid-2", "first").await.unwrap();
        let key = stream.send(&alice, "uid-2", "  second ").await.unwrap();

        let messages = load_messages(&store, &room).await.unwrap();
        let last = messages.last().unwrap();
        assert_eq!(last.id, key);
        assert_eq!(last.text, "second");
        assert!(!last.seen);
        assert_eq!(messages.len(), 2);

        let mut view = stream.view();
        while view.data.len() < 2 {
            view = stream.changed().await.unwrap();
        }
        assert_eq!(view.data, messages);
        stream.close();
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_write() {
        let store = store();
        provision(&store, "uid-1", "alice").await;
        let alice = session_for(&store, "uid-1").await;
        let room = RoomId::derive("uid-1", "uid-2").unwrap();
        let stream = MessageStream::open(store.clone(), room.clone()).unwrap();

        assert!(matches!(stream.send(&alice, "uid-2", " \n\t").await, Err(SyncError::EmptyMessage)));
        assert!(matches!(
            stream.send(&alice, "uid-3", "wrong room").await,
            Err(SyncError::InvalidParticipants)
        ));
        assert!(matches!(
            send_message(&store, &alice, "uid-1", "me").await,
            Err(SyncError::InvalidParticipants)
        ));
        let anonymous = Session::issued("token");
        assert!(matches!(stream.send(&anonymous, "uid-2", "hi").await, Err(SyncError::MissingActor)));

        assert!(load_messages(&store, &room).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_follows_insertion_not_timestamp() {
        let store = store();
        let room = RoomId::derive("a", "b").unwrap();
        let path = paths::messages(&room).unwrap();
        for (text, ts) in [("later", "2024-01-02T00:00:00.000Z"), ("earlier", "2024-01-01T00:00:00.000Z")] {
            store
                .push(
                    &path,
                    serde_json::json!({"sender": "a", "receiver": "b", "text": text, "timestamp": ts, "seen": false}),
                )
                .await
                .unwrap();
        }
        let texts: Vec<String> = load_messages(&store, &room)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["later", "earlier"]);
    }

    #[tokio::test]
    async fn test_malformed_messages_are_skipped() {
        let store = store();
        let room = RoomId::derive("a", "b").unwrap();
        let path = paths::messages(&room).unwrap();
        store.push(&path, serde_json::json!({"sender": "a", "text": "no receiver"})).await.unwrap();
        store
            .push(
                &path,
                serde_json::json!({"sender": "a", "receiver": "b", "text": "ok", "timestamp": "2024-01-01T00:00:00.000Z", "extra": 1}),
            )
            .await
            .unwrap();
        store
            .push(
                &path,
                serde_json::json!({"sender": "a", "receiver": "b", "text": "fine", "timestamp": "2024-01-01T00:00:00.000Z"}),
            )
            .await
            .unwrap();

        let messages = load_messages(&store, &room).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "fine");
        assert!(!messages[0].seen);
    }
}
