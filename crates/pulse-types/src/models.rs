use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Shape check applied to every record read from the store, on top of the
/// field-level checks serde already performs.
pub trait Record: serde::de::DeserializeOwned {
    fn check(&self) -> Result<(), String>;
}

// -- Keyed sets --

/// A set stored as `{ member: true, ... }`. Iteration follows store order.
/// Members flagged `false` are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedSet(Vec<String>);

impl KeyedSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, member: &str) -> bool {
        self.0.iter().any(|m| m == member)
    }

    /// Returns false if the member was already present.
    pub fn insert(&mut self, member: impl Into<String>) -> bool {
        let member = member.into();
        if self.contains(&member) {
            return false;
        }
        self.0.push(member);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for KeyedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = KeyedSet::new();
        for member in iter {
            set.insert(member);
        }
        set
    }
}

impl Serialize for KeyedSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for member in &self.0 {
            map.serialize_entry(member, &true)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyedSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyedSetVisitor;

        impl<'de> Visitor<'de> for KeyedSetVisitor {
            type Value = KeyedSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of member keys to presence flags")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KeyedSet, A::Error> {
                let mut set = KeyedSet::new();
                while let Some((member, present)) = access.next_entry::<String, bool>()? {
                    if present {
                        set.insert(member);
                    }
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(KeyedSetVisitor)
    }
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// -- Users --

/// Stored shape of `Users/{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "KeyedSet::is_empty")]
    pub friends: KeyedSet,
}

impl Record for UserRecord {
    fn check(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("user id is empty".into());
        }
        if self.username.is_empty() {
            return Err("username is empty".into());
        }
        Ok(())
    }
}

/// A user together with the store key it lives under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub key: String,
    pub id: String,
    pub username: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub friends: KeyedSet,
}

impl User {
    pub fn from_record(key: impl Into<String>, record: UserRecord) -> Self {
        Self {
            key: key.into(),
            id: record.id,
            username: record.username,
            image: record.image,
            email: record.email,
            friends: record.friends,
        }
    }
}

// -- Messages --

/// Stored shape of `chatRooms/{roomId}/messages/{messageKey}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRecord {
    #[serde(rename = "sender")]
    pub sender_id: String,
    #[serde(rename = "receiver")]
    pub receiver_id: String,
    pub text: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub seen: bool,
}

impl Record for MessageRecord {
    fn check(&self) -> Result<(), String> {
        if self.sender_id.is_empty() || self.receiver_id.is_empty() {
            return Err("message is missing a participant".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "sender")]
    pub sender_id: String,
    #[serde(rename = "receiver")]
    pub receiver_id: String,
    pub text: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub seen: bool,
}

impl Message {
    pub fn from_record(id: impl Into<String>, record: MessageRecord) -> Self {
        Self {
            id: id.into(),
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            text: record.text,
            timestamp: record.timestamp,
            seen: record.seen,
        }
    }
}

// -- Posts --

/// Stored shape of `posts/{postId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostRecord {
    pub author: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "KeyedSet::is_empty")]
    pub likes: KeyedSet,
    #[serde(default, skip_serializing_if = "KeyedSet::is_empty")]
    pub dislikes: KeyedSet,
}

impl Record for PostRecord {
    fn check(&self) -> Result<(), String> {
        if self.author.is_empty() {
            return Err("post has no author".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub likes: KeyedSet,
    pub dislikes: KeyedSet,
}

impl Post {
    pub fn from_record(id: impl Into<String>, record: PostRecord) -> Self {
        Self {
            id: id.into(),
            author: record.author,
            title: record.title,
            content: record.content,
            image: record.image.filter(|uri| !uri.is_empty()),
            timestamp: record.timestamp,
            likes: record.likes,
            dislikes: record.dislikes,
        }
    }

    /// The reaction a user already cast on this post, if any.
    pub fn verdict_of(&self, user_id: &str) -> Option<Verdict> {
        if self.likes.contains(user_id) {
            Some(Verdict::Like)
        } else if self.dislikes.contains(user_id) {
            Some(Verdict::Dislike)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Like,
    Dislike,
}

impl Verdict {
    /// Post field holding the voters for this verdict.
    pub fn field(self) -> &'static str {
        match self {
            Self::Like => "likes",
            Self::Dislike => "dislikes",
        }
    }
}
