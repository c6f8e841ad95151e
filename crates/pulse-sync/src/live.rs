use std::sync::Arc;

use pulse_db::{RealtimeStore, StorePath, Subscription, SubscriptionEvent};
use pulse_types::events::StreamState;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turns the raw value at a path into the materialized view.
pub type Decoder<T> = fn(&StorePath, Option<Value>) -> T;

/// What a live query currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveView<T> {
    pub state: StreamState,
    pub data: T,
}

/// A subscription driven through
/// `Unsubscribed -> Subscribing -> Live -> (Error | Unsubscribed)`.
///
/// Every snapshot replaces `data` wholesale. On `Error` the previous data is
/// kept until the store recovers.
pub struct LiveQuery<T> {
    path: StorePath,
    sender: Arc<watch::Sender<LiveView<T>>>,
    view: watch::Receiver<LiveView<T>>,
    cancel: CancellationToken,
    finished: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T> LiveQuery<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn open<S: RealtimeStore>(store: &S, path: StorePath, decode: Decoder<T>) -> Self {
        let (sender, view) = watch::channel(LiveView {
            state: StreamState::Subscribing,
            data: T::default(),
        });
        let sender = Arc::new(sender);
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        debug!("Subscribing to {}", path);
        let subscription = store.subscribe(&path);
        let task = tokio::spawn(pump(
            path.clone(),
            subscription,
            sender.clone(),
            cancel.clone(),
            finished.clone(),
            decode,
        ));

        Self {
            path,
            sender,
            view,
            cancel,
            finished,
            task: Some(task),
        }
    }

    pub fn current(&self) -> LiveView<T> {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> StreamState {
        self.view.borrow().state.clone()
    }

    /// Independent receiver; sees `Unsubscribed` once the query closes.
    pub fn watch(&self) -> watch::Receiver<LiveView<T>> {
        self.sender.subscribe()
    }

    /// Wait for the next update. `None` once the query is closed or its feed
    /// ended and the final state was already observed.
    pub async fn changed(&mut self) -> Option<LiveView<T>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            changed = self.view.changed() => {
                changed.ok()?;
                Some(self.view.borrow_and_update().clone())
            }
            _ = self.finished.cancelled() => {
                if self.view.has_changed().unwrap_or(false) {
                    Some(self.view.borrow_and_update().clone())
                } else {
                    None
                }
            }
        }
    }

    /// Wait until the query reports `Live` (or fails).
    pub async fn ready(&mut self) -> LiveView<T> {
        loop {
            let current = self.view.borrow_and_update().clone();
            if !matches!(current.state, StreamState::Subscribing) {
                return current;
            }
            if self.changed().await.is_none() {
                return self.current();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop delivery and release the subscription. Safe to call twice; a
    /// snapshot that arrives after this is dropped.
    pub fn close(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.sender.send_modify(|view| view.state = StreamState::Unsubscribed);
        info!("Closed live query on {}", self.path);
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn pump<T>(
    path: StorePath,
    mut subscription: Subscription,
    sender: Arc<watch::Sender<LiveView<T>>>,
    cancel: CancellationToken,
    finished: CancellationToken,
    decode: Decoder<T>,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = subscription.next() => event,
        };

        let applied = match event {
            Some(SubscriptionEvent::Snapshot(value)) => {
                let data = decode(&path, value);
                apply(&sender, &cancel, |view| {
                    view.data = data;
                    view.state = StreamState::Live;
                })
            }
            Some(SubscriptionEvent::Interrupted(e)) => {
                warn!("Live query on {} interrupted: {}", path, e);
                let detail = e.to_string();
                apply(&sender, &cancel, |view| view.state = StreamState::Error(detail))
            }
            Some(SubscriptionEvent::Reconnecting) => {
                debug!("Live query on {} reconnecting", path);
                apply(&sender, &cancel, |view| view.state = StreamState::Subscribing)
            }
            None => {
                apply(&sender, &cancel, |view| {
                    view.state = StreamState::Error("subscription ended".into())
                });
                break;
            }
        };

        if !applied {
            break;
        }
    }

    subscription.close();
    finished.cancel();
}

/// Apply `f` unless the query was closed; the check and the write happen
/// under the channel lock so a closed query never changes again.
fn apply<T>(
    sender: &watch::Sender<LiveView<T>>,
    cancel: &CancellationToken,
    f: impl FnOnce(&mut LiveView<T>),
) -> bool {
    let mut applied = false;
    sender.send_if_modified(|view| {
        if cancel.is_cancelled() {
            return false;
        }
        f(view);
        applied = true;
        true
    });
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_db::StoreError;
    use serde_json::{Map, json};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Hands out subscriptions whose events the test pushes by hand.
    #[derive(Clone, Default)]
    struct ScriptedStore {
        feeds: Arc<Mutex<Vec<mpsc::Sender<SubscriptionEvent>>>>,
    }

    impl ScriptedStore {
        fn feed(&self) -> mpsc::Sender<SubscriptionEvent> {
            self.feeds.lock().unwrap().last().unwrap().clone()
        }
    }

    impl RealtimeStore for ScriptedStore {
        async fn get(&self, _path: &StorePath) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }

        fn subscribe(&self, _path: &StorePath) -> Subscription {
            let (tx, rx) = mpsc::channel(8);
            self.feeds.lock().unwrap().push(tx);
            Subscription::new(rx, None)
        }

        async fn update(&self, _path: &StorePath, _fields: Map<String, Value>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn push(&self, _path: &StorePath, _value: Value) -> Result<String, StoreError> {
            Ok("k".into())
        }
    }

    fn count_children(_path: &StorePath, value: Option<Value>) -> Vec<String> {
        match value {
            Some(Value::Object(children)) => children.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn open(store: &ScriptedStore) -> LiveQuery<Vec<String>> {
        LiveQuery::open(store, StorePath::collection("items"), count_children)
    }

    #[tokio::test]
    async fn test_live_on_first_snapshot_even_if_empty() {
        let store = ScriptedStore::default();
        let mut query = open(&store);
        assert_eq!(query.state(), StreamState::Subscribing);

        store.feed().send(SubscriptionEvent::Snapshot(None)).await.unwrap();
        let view = query.changed().await.unwrap();
        assert_eq!(view.state, StreamState::Live);
        assert!(view.data.is_empty());
    }

    #[tokio::test]
    async fn test_error_keeps_last_known_data() {
        let store = ScriptedStore::default();
        let mut query = open(&store);
        let feed = store.feed();

        feed.send(SubscriptionEvent::Snapshot(Some(json!({"a": 1, "b": 2})))).await.unwrap();
        query.changed().await.unwrap();

        feed.send(SubscriptionEvent::Interrupted(StoreError::Unavailable(anyhow::anyhow!("offline"))))
            .await
            .unwrap();
        let view = query.changed().await.unwrap();
        assert!(matches!(view.state, StreamState::Error(_)));
        assert_eq!(view.data, vec!["a", "b"]);

        feed.send(SubscriptionEvent::Reconnecting).await.unwrap();
        let view = query.changed().await.unwrap();
        assert_eq!(view.state, StreamState::Subscribing);
        assert_eq!(view.data.len(), 2);

        feed.send(SubscriptionEvent::Snapshot(Some(json!({"c": 3})))).await.unwrap();
        let view = query.changed().await.unwrap();
        assert_eq!(view.state, StreamState::Live);
        assert_eq!(view.data, vec!["c"]);
    }

    #[tokio::test]
    async fn test_snapshot_after_close_is_discarded() {
        let store = ScriptedStore::default();
        let mut query = open(&store);
        let feed = store.feed();
        let mut watcher = query.watch();

        query.close();
        query.close();
        assert!(query.is_closed());
        assert_eq!(query.state(), StreamState::Unsubscribed);

        // The pump is gone, so the feed either refuses or nobody reads it.
        let _ = feed.send(SubscriptionEvent::Snapshot(Some(json!({"late": 1})))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(query.state(), StreamState::Unsubscribed);
        assert!(watcher.borrow_and_update().data.is_empty());
        assert!(query.changed().await.is_none());
    }

    #[tokio::test]
    async fn test_ended_feed_reports_error() {
        let store = ScriptedStore::default();
        let mut query = open(&store);
        store.feeds.lock().unwrap().clear();

        let view = query.changed().await.unwrap();
        assert!(matches!(view.state, StreamState::Error(_)));
        assert!(query.changed().await.is_none());
    }
}
