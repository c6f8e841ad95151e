use futures_util::future::join_all;
use pulse_db::RealtimeStore;
use pulse_types::models::User;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::error::{Result, SyncError};
use crate::paths;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendOutcome {
    Added,
    AlreadyFriends,
}

/// Directed friend edges stored under `Users/{key}/friends`.
///
/// `add_friend` records the edge target -> actor: the acting user's key goes
/// into the *target's* friend set. The inverse edge is never written.
#[derive(Clone)]
pub struct SocialGraph<S> {
    store: S,
    directory: Directory<S>,
}

impl<S: RealtimeStore> SocialGraph<S> {
    pub fn new(store: S) -> Self {
        Self {
            directory: Directory::new(store.clone()),
            store,
        }
    }

    pub async fn add_friend(&self, session: &Session, target_key: &str) -> Result<FriendOutcome> {
        let actor = session.actor()?;
        if target_key.is_empty() {
            return Err(SyncError::MissingActor);
        }
        if target_key == actor.key {
            return Err(SyncError::InvalidParticipants);
        }

        let target = self
            .directory
            .lookup(target_key)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("{}/{}", paths::USERS, target_key)))?;

        // Older records keyed the edge by subject id instead of storage key
        if target.friends.contains(&actor.key) || target.friends.contains(&actor.id) {
            debug!("{} is already in the friend set of {}", actor.key, target_key);
            return Ok(FriendOutcome::AlreadyFriends);
        }

        let mut fields = Map::new();
        fields.insert(actor.key.clone(), Value::Bool(true));
        self.store.update(&paths::friends(target_key)?, fields).await?;

        info!("Added {} to the friend set of {}", actor.key, target_key);
        Ok(FriendOutcome::Added)
    }

    /// Resolve every entry of a user's friend set. Entries that no longer
    /// name a user are dropped.
    pub async fn list_friends(&self, user_key: &str) -> Result<Vec<User>> {
        let user = self.directory.fetch_user(user_key).await?;
        let lookups = user.friends.iter().map(|key| self.directory.lookup(key));

        let mut friends = Vec::with_capacity(user.friends.len());
        for (key, found) in user.friends.iter().zip(join_all(lookups).await) {
            match found? {
                Some(friend) => friends.push(friend),
                None => warn!("Friend {} of {} no longer resolves", key, user_key),
            }
        }
        Ok(friends)
    }
}
