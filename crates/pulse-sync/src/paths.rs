//! Logical locations in the store.
//!
//! ```text
//! Users/{key}                          user record
//! Users/{key}/friends/{friendKey}      true
//! chatRooms/{roomId}/messages/{key}    message record
//! posts/{postId}                       post record
//! ```

use pulse_db::StorePath;

use crate::error::Result;
use crate::room::RoomId;

pub const USERS: &str = "Users";
pub const FRIENDS: &str = "friends";
pub const CHAT_ROOMS: &str = "chatRooms";
pub const MESSAGES: &str = "messages";
pub const POSTS: &str = "posts";

pub fn users() -> StorePath {
    StorePath::collection(USERS)
}

pub fn user(key: &str) -> Result<StorePath> {
    Ok(users().child(key)?)
}

pub fn friends(key: &str) -> Result<StorePath> {
    Ok(user(key)?.child(FRIENDS)?)
}

pub fn messages(room: &RoomId) -> Result<StorePath> {
    Ok(StorePath::collection(CHAT_ROOMS)
        .child(room.as_str())?
        .child(MESSAGES)?)
}

pub fn message(room: &RoomId, key: &str) -> Result<StorePath> {
    Ok(messages(room)?.child(key)?)
}

pub fn posts() -> StorePath {
    StorePath::collection(POSTS)
}

pub fn post(id: &str) -> Result<StorePath> {
    Ok(posts().child(id)?)
}
