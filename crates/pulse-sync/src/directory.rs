use pulse_db::RealtimeStore;
use pulse_types::api::TokenClaims;
use pulse_types::models::{User, UserRecord};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Result, SyncError};
use crate::paths;
use crate::records;
use crate::session::Session;

#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub image: Option<String>,
}

/// User records: provisioning, lookup and profile edits.
#[derive(Clone)]
pub struct Directory<S> {
    store: S,
}

impl<S: RealtimeStore> Directory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create the user record for a token subject. A subject that already has
    /// a record gets that record back untouched.
    pub async fn register(&self, claims: &TokenClaims, username: &str, image: &str) -> Result<User> {
        let username = username.trim();
        check_username(username)?;

        if let Some(existing) = self.find_by_id(&claims.sub).await? {
            info!("Subject {} already provisioned as {}", claims.sub, existing.key);
            return Ok(existing);
        }

        let record = UserRecord {
            id: claims.sub.clone(),
            username: username.to_string(),
            image: image.to_string(),
            email: claims.email.clone(),
            friends: Default::default(),
        };
        let users = paths::users();
        let key = self.store.push(&users, records::encode(&users, &record)?).await?;

        info!("Provisioned {} ({}) under {}", record.username, record.id, key);
        Ok(User::from_record(key, record))
    }

    /// Every valid user, in store order.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = paths::users();
        let snapshot = self.store.get(&users).await?;
        Ok(records::decode_children::<UserRecord>(&users, snapshot)
            .into_iter()
            .map(|(key, record)| User::from_record(key, record))
            .collect())
    }

    /// Scan for the record whose `id` is `user_id`.
    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let mut matches = self
            .list_users()
            .await?
            .into_iter()
            .filter(|user| user.id == user_id);

        let found = matches.next();
        if found.is_some() && matches.next().is_some() {
            warn!("Subject {} has more than one user record; using the first", user_id);
        }
        Ok(found)
    }

    /// `None` when the key does not name a valid user record.
    pub async fn lookup(&self, key: &str) -> Result<Option<User>> {
        let Ok(path) = paths::user(key) else {
            return Ok(None);
        };
        let Some(value) = self.store.get(&path).await? else {
            return Ok(None);
        };
        match records::decode::<UserRecord>(&path, value) {
            Ok(record) => Ok(Some(User::from_record(key, record))),
            Err(e) => {
                warn!("Ignoring user {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn fetch_user(&self, key: &str) -> Result<User> {
        self.lookup(key)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("{}/{}", paths::USERS, key)))
    }

    /// Patch the acting user's username and/or image in one update.
    pub async fn update_profile(&self, session: &Session, changes: ProfileChanges) -> Result<User> {
        let actor = session.actor()?;

        let mut fields = Map::new();
        if let Some(username) = changes.username {
            let username = username.trim();
            check_username(username)?;
            fields.insert("username".into(), Value::from(username));
        }
        if let Some(image) = changes.image {
            fields.insert("image".into(), Value::from(image));
        }

        if !fields.is_empty() {
            self.store.update(&paths::user(&actor.key)?, fields).await?;
            info!("Updated profile of {}", actor.key);
        }
        self.fetch_user(&actor.key).await
    }
}

fn check_username(username: &str) -> Result<()> {
    if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SyncError::InvalidUsername);
    }
    Ok(())
}
