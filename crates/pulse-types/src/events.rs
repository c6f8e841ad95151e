use serde::{Deserialize, Serialize};

use crate::models::{Message, Post};

/// Lifecycle of one live subscription as seen by its consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StreamState {
    Unsubscribed,
    Subscribing,
    Live,
    /// Upstream interrupted; the last delivered data is still shown.
    Error(String),
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the session
    Ready { user_id: String, username: String },

    /// Current view of a conversation the client opened. `unseen` lists the
    /// messages from the peer this client has yet to acknowledge.
    RoomSnapshot {
        room_id: String,
        state: StreamState,
        messages: Vec<Message>,
        unseen: Vec<String>,
    },

    /// Current view of the feed, newest post first
    FeedSnapshot { state: StreamState, posts: Vec<Post> },

    /// A command could not be honoured
    Rejected { reason: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start streaming the conversation with another user
    OpenRoom { peer_id: String },

    /// Stop streaming a conversation
    CloseRoom { peer_id: String },

    /// Start streaming the feed
    OpenFeed,

    /// Stop streaming the feed
    CloseFeed,
}
