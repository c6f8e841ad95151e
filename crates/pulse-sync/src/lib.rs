//! Realtime conversation and social-graph synchronization.
//!
//! Every component is generic over a [`RealtimeStore`] and takes the acting
//! user from an explicit [`Session`] validated by the [`IdentityResolver`].

pub mod directory;
pub mod error;
pub mod feed;
pub mod graph;
pub mod hub;
pub mod identity;
pub mod live;
pub mod paths;
pub mod room;
pub mod seen;
pub mod session;
pub mod stream;

mod records;

pub use directory::{Directory, ProfileChanges};
pub use error::{Result, SyncError};
pub use feed::{Feed, FeedSnapshot, FeedStream, PostDraft, ReactionOutcome};
pub use graph::{FriendOutcome, SocialGraph};
pub use hub::{RoomLease, StreamHub};
pub use identity::{IdentityResolver, decode_claims};
pub use live::{LiveQuery, LiveView};
pub use pulse_db::{RealtimeStore, StoreError};
pub use pulse_types::events::StreamState;
pub use room::RoomId;
pub use seen::{SeenOutcome, SeenTracker, pending_acknowledgements};
pub use session::{Actor, Session, SessionState};
pub use stream::{ConversationView, MessageStream};

#[cfg(test)]
pub(crate) mod testing;
