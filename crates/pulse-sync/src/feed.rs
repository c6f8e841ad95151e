use chrono::Utc;
use pulse_db::{RealtimeStore, StorePath};
use pulse_types::models::{KeyedSet, Post, PostRecord, Verdict};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::live::{LiveQuery, LiveView};
use crate::paths;
use crate::records;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionOutcome {
    Recorded,
    AlreadyReacted,
}

#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub image: Option<String>,
}

/// Posts as the store returned them, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    posts: Vec<Post>,
}

impl FeedSnapshot {
    pub fn new(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    /// Most recently created first. Can be restarted any number of times.
    pub fn newest_first(&self) -> impl Iterator<Item = &Post> + '_ {
        self.posts.iter().rev()
    }

    pub fn get(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == post_id)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    fn decode(path: &StorePath, value: Option<Value>) -> Self {
        Self::new(
            records::decode_children::<PostRecord>(path, value)
                .into_iter()
                .map(|(id, record)| Post::from_record(id, record))
                .collect(),
        )
    }
}

/// Shared feed: publishing, reactions and ordered listing.
#[derive(Clone)]
pub struct Feed<S> {
    store: S,
}

impl<S: RealtimeStore> Feed<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn publish(&self, session: &Session, draft: PostDraft) -> Result<String> {
        let title = draft.title.trim();
        let content = draft.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(SyncError::EmptyPost);
        }
        let actor = session.actor()?;

        let record = PostRecord {
            author: actor.username.clone(),
            title: title.to_string(),
            content: content.to_string(),
            image: draft.image.filter(|uri| !uri.trim().is_empty()),
            timestamp: Utc::now(),
            likes: KeyedSet::new(),
            dislikes: KeyedSet::new(),
        };
        let posts = paths::posts();
        let id = self.store.push(&posts, records::encode(&posts, &record)?).await?;

        info!("{} published post {}", actor.username, id);
        Ok(id)
    }

    /// Record the acting user's first reaction to a post. A user who already
    /// reacted either way gets `AlreadyReacted`; the first verdict is final.
    ///
    /// The write is a keyed field update of `likes/{user}` or
    /// `dislikes/{user}`, so concurrent reactions from different users never
    /// overwrite each other. Two different verdicts from the same user racing
    /// each other can both land.
    pub async fn react(&self, session: &Session, post_id: &str, verdict: Verdict) -> Result<ReactionOutcome> {
        let actor = session.actor()?;
        let path = paths::post(post_id)?;
        let value = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| SyncError::NotFound(path.to_string()))?;
        let post = Post::from_record(post_id, records::decode::<PostRecord>(&path, value)?);

        if let Some(existing) = post.verdict_of(&actor.id) {
            debug!("{} already reacted to {} with {:?}", actor.id, post_id, existing);
            return Ok(ReactionOutcome::AlreadyReacted);
        }

        let mut fields = Map::new();
        fields.insert(format!("{}/{}", verdict.field(), actor.id), Value::Bool(true));
        self.store.update(&path, fields).await?;

        info!("{} reacted to {} with {:?}", actor.id, post_id, verdict);
        Ok(ReactionOutcome::Recorded)
    }

    pub async fn load(&self) -> Result<FeedSnapshot> {
        let posts = paths::posts();
        let snapshot = self.store.get(&posts).await?;
        Ok(FeedSnapshot::decode(&posts, snapshot))
    }

    /// Live feed, re-evaluated on every upstream change.
    pub fn watch(&self) -> FeedStream {
        FeedStream {
            query: LiveQuery::open(&self.store, paths::posts(), FeedSnapshot::decode),
        }
    }
}

pub struct FeedStream {
    query: LiveQuery<FeedSnapshot>,
}

impl FeedStream {
    pub fn view(&self) -> LiveView<FeedSnapshot> {
        self.query.current()
    }

    pub fn watch(&self) -> watch::Receiver<LiveView<FeedSnapshot>> {
        self.query.watch()
    }

    pub async fn changed(&mut self) -> Option<LiveView<FeedSnapshot>> {
        self.query.changed().await
    }

    pub async fn ready(&mut self) -> LiveView<FeedSnapshot> {
        self.query.ready().await
    }

    pub fn is_closed(&self) -> bool {
        self.query.is_closed()
    }

    pub fn close(&mut self) {
        self.query.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{provision, session_for, store};
    use pulse_types::events::StreamState;

    fn draft(title: &str) -> PostDraft {
        PostDraft {
            title: title.into(),
            content: "body".into(),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_first_reaction_is_final() {
        let store = store();
        provision(&store, "uid-1", "alice").await;
        let session = session_for(&store, "uid-1").await;
        let feed = Feed::new(store);
        let id = feed.publish(&session, draft("hello")).await.unwrap();

        assert_eq!(
            feed.react(&session, &id, Verdict::Like).await.unwrap(),
            ReactionOutcome::Recorded
        );
        assert_eq!(
            feed.react(&session, &id, Verdict::Dislike).await.unwrap(),
            ReactionOutcome::AlreadyReacted
        );

        let snapshot = feed.load().await.unwrap();
        let post = snapshot.get(&id).unwrap();
        assert!(post.likes.contains("uid-1"));
        assert!(!post.dislikes.contains("uid-1"));
    }

    #[tokio::test]
    async fn test_concurrent_reactions_from_different_users_all_land() {
        let store = store();
        let mut sessions = Vec::new();
        for (i, name) in ["alice", "bob", "carol", "dave"].iter().enumerate() {
            let subject = format!("uid-{}", i);
            provision(&store, &subject, name).await;
            sessions.push(session_for(&store, &subject).await);
        }
        let feed = Feed::new(store);
        let id = feed.publish(&sessions[0], draft("vote")).await.unwrap();

        let reactions = sessions.iter().enumerate().map(|(i, session)| {
            let verdict = if i % 2 == 0 { Verdict::Like } else { Verdict::Dislike };
            feed.react(session, &id, verdict)
        });
        for outcome in futures_util::future::join_all(reactions).await {
            assert_eq!(outcome.unwrap(), ReactionOutcome::Recorded);
        }

        let snapshot = feed.load().await.unwrap();
        let post = snapshot.get(&id).unwrap();
        assert_eq!(post.likes.len(), 2);
        assert_eq!(post.dislikes.len(), 2);
    }

    #[tokio::test]
    async fn test_react_to_missing_post() {
        let store = store();
        provision(&store, "uid-1", "alice").await;
        let session = session_for(&store, "uid-1").await;
        let feed = Feed::new(store);
        assert!(matches!(
            feed.react(&session, "nope", Verdict::Like).await,
            Err(SyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_requires_title_and_content() {
        let store = store();
        provision(&store, "uid-1", "alice").await;
        let session = session_for(&store, "uid-1").await;
        let feed = Feed::new(store);

        let mut blank = draft("  ");
        assert!(matches!(feed.publish(&session, blank.clone()).await, Err(SyncError::EmptyPost)));
        blank.title = "t".into();
        blank.content = "\n".into();
        assert!(matches!(feed.publish(&session, blank).await, Err(SyncError::EmptyPost)));
        assert!(feed.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_lists_newest_first() {
        let store = store();
        provision(&store, "uid-1", "alice").await;
        let session = session_for(&store, "uid-1").await;
        let feed = Feed::new(store);
        feed.publish(&session, draft("one")).await.unwrap();

        let mut stream = feed.watch();
        let view = stream.ready().await;
        assert_eq!(view.state, StreamState::Live);
        assert_eq!(view.data.len(), 1);

        feed.publish(&session, draft("two")).await.unwrap();
        let mut view = stream.view();
        while view.data.len() < 2 {
            view = stream.changed().await.unwrap();
        }
        let titles: Vec<&str> = view.data.newest_first().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["two", "one"]);
        // Restartable
        assert_eq!(view.data.newest_first().count(), 2);
        assert_eq!(view.data.newest_first().next().unwrap().author, "alice");

        stream.close();
        assert_eq!(stream.view().state, StreamState::Unsubscribed);
    }
}
