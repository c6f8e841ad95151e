use jsonwebtoken::{EncodingKey, Header, encode};
use pulse_db::SqliteStore;
use pulse_sync::stream::load_messages;
use pulse_sync::{
    Directory, Feed, FriendOutcome, IdentityResolver, MessageStream, PostDraft, ReactionOutcome, RoomId,
    SeenOutcome, Session, SocialGraph, StreamState, SyncError,
};
use pulse_types::api::TokenClaims;
use pulse_types::models::Verdict;

fn claims(subject: &str) -> TokenClaims {
    TokenClaims {
        sub: subject.to_string(),
        exp: None,
        email: Some(format!("{}@example.com", subject)),
    }
}

fn token(subject: &str) -> String {
    encode(&Header::default(), &claims(subject), &EncodingKey::from_secret(b"s3cret")).unwrap()
}

async fn sign_in(store: &SqliteStore, subject: &str, username: &str) -> Session {
    let resolver = IdentityResolver::new(store.clone());
    let mut session = Session::issued(token(subject));

    // Not provisioned yet: recoverable, register and try again
    let err = resolver.validate(&mut session).await.unwrap_err();
    assert!(matches!(err, SyncError::UserNotFound(_)));
    Directory::new(store.clone())
        .register(&claims(subject), username, "")
        .await
        .unwrap();

    resolver.validate(&mut session).await.unwrap();
    session
}

#[tokio::test]
async fn hello_is_delivered_and_acknowledged() {
    let store = SqliteStore::in_memory().unwrap();
    let alice = sign_in(&store, "uid-1", "alice").await;
    let bob = sign_in(&store, "uid-2", "bob").await;

    let room = RoomId::derive("uid-2", "uid-1").unwrap();
    assert_eq!(room.as_str(), "uid-1_uid-2");

    let mut stream = MessageStream::open(store.clone(), room.clone()).unwrap();
    let view = stream.ready().await;
    assert_eq!(view.state, StreamState::Live);
    assert!(view.data.is_empty());

    let key = stream.send(&alice, "uid-2", "hello").await.unwrap();

    let mut view = stream.view();
    while view.data.is_empty() {
        view = stream.changed().await.unwrap();
    }
    assert_eq!(view.data.len(), 1);
    let message = &view.data[0];
    assert_eq!(message.id, key);
    assert_eq!(message.sender_id, "uid-1");
    assert_eq!(message.receiver_id, "uid-2");
    assert_eq!(message.text, "hello");
    assert!(!message.seen);

    assert_eq!(stream.mark_seen(&bob, &key).await.unwrap(), SeenOutcome::Marked);
    assert_eq!(stream.mark_seen(&bob, &key).await.unwrap(), SeenOutcome::AlreadySeen);

    let reread = load_messages(&store, &room).await.unwrap();
    assert_eq!(reread.len(), 1);
    assert!(reread[0].seen);

    stream.close();
    stream.close();
    assert!(stream.is_closed());
}

#[tokio::test]
async fn friend_requests_are_idempotent() {
    let store = SqliteStore::in_memory().unwrap();
    let alice = sign_in(&store, "uid-1", "alice").await;
    let _bob = sign_in(&store, "uid-2", "bob").await;

    let directory = Directory::new(store.clone());
    let bob = directory.find_by_id("uid-2").await.unwrap().unwrap();
    let graph = SocialGraph::new(store.clone());

    assert_eq!(graph.add_friend(&alice, &bob.key).await.unwrap(), FriendOutcome::Added);
    let size = directory.fetch_user(&bob.key).await.unwrap().friends.len();
    assert_eq!(graph.add_friend(&alice, &bob.key).await.unwrap(), FriendOutcome::AlreadyFriends);
    assert_eq!(directory.fetch_user(&bob.key).await.unwrap().friends.len(), size);
}

#[tokio::test]
async fn like_then_dislike_keeps_the_like() {
    let store = SqliteStore::in_memory().unwrap();
    let alice = sign_in(&store, "uid-1", "alice").await;
    let feed = Feed::new(store.clone());

    let post_id = feed
        .publish(
            &alice,
            PostDraft {
                title: "Sunset".into(),
                content: "From the pier".into(),
                image: Some(String::new()),
            },
        )
        .await
        .unwrap();

    assert_eq!(feed.react(&alice, &post_id, Verdict::Like).await.unwrap(), ReactionOutcome::Recorded);
    assert_eq!(
        feed.react(&alice, &post_id, Verdict::Dislike).await.unwrap(),
        ReactionOutcome::AlreadyReacted
    );

    let snapshot = feed.load().await.unwrap();
    let post = snapshot.get(&post_id).unwrap();
    assert_eq!(post.author, "alice");
    assert_eq!(post.image, None);
    assert!(post.likes.contains("uid-1"));
    assert!(post.dislikes.is_empty());
}
