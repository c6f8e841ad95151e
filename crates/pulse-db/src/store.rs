use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Database;
use crate::models::SubtreeWrite;
use crate::path::StorePath;
use crate::tree;

/// Delay before a failed subscription read is retried.
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Snapshots buffered per subscription before the reader applies backpressure.
const SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    #[error("store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// What a live subscription delivers, in the order the store emits it.
#[derive(Debug)]
pub enum SubscriptionEvent {
    /// Full authoritative value at the subscribed path (`None` when absent).
    Snapshot(Option<Value>),
    /// A read failed; consumers keep their last snapshot.
    Interrupted(StoreError),
    /// The store is retrying after an interruption.
    Reconnecting,
}

/// Handle to a live subscription. Closing or dropping it stops delivery and
/// releases the listener behind it.
pub struct Subscription {
    events: mpsc::Receiver<SubscriptionEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<SubscriptionEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self { events, task }
    }

    /// Next event, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// The four primitives the sync layer relies on.
pub trait RealtimeStore: Clone + Send + Sync + 'static {
    /// Point read of the value at `path`.
    fn get(&self, path: &StorePath) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Live snapshots of `path`, starting with its current value.
    fn subscribe(&self, path: &StorePath) -> Subscription;

    /// Atomically replace each `relative/key` under `path` with its value.
    /// A `null` value deletes that subtree.
    fn update(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Append `value` under a generated key; children of one parent keep
    /// insertion order. Returns the key.
    fn push(&self, path: &StorePath, value: Value) -> impl Future<Output = Result<String, StoreError>> + Send;
}

/// Realtime tree persisted in SQLite, with change notification through a
/// broadcast channel.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    changes: broadcast::Sender<StorePath>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            db: Arc::new(db),
            changes,
        }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?;
        Ok(result?)
    }

    async fn write(&self, targets: Vec<(StorePath, Value)>) -> Result<(), StoreError> {
        let mut writes = Vec::with_capacity(targets.len());
        for (path, value) in &targets {
            writes.push(SubtreeWrite {
                path: path.as_str().to_string(),
                leaves: tree::flatten(path, value)?,
            });
        }

        self.blocking(move |db| db.apply_writes(&writes)).await?;

        for (path, _) in targets {
            // No receivers simply means nobody is listening
            let _ = self.changes.send(path);
        }
        Ok(())
    }
}

impl RealtimeStore for SqliteStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let key = path.as_str().to_string();
        let rows = self.blocking(move |db| db.read_subtree(&key)).await?;
        tree::assemble(rows)
    }

    fn subscribe(&self, path: &StorePath) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        // Listen before the first read so no write slips between the two
        let changes = self.changes.subscribe();
        let task = tokio::spawn(run_subscription(self.clone(), path.clone(), changes, tx));
        Subscription::new(rx, Some(task))
    }

    async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut targets = Vec::with_capacity(fields.len());
        for (relative, value) in fields {
            targets.push((path.join(&relative)?, value));
        }
        if targets.is_empty() {
            return Ok(());
        }
        self.write(targets).await
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let key = Uuid::new_v4().simple().to_string();
        let target = path.child(&key)?;
        self.write(vec![(target, value)]).await?;
        Ok(key)
    }
}

async fn run_subscription(
    store: SqliteStore,
    path: StorePath,
    mut changes: broadcast::Receiver<StorePath>,
    tx: mpsc::Sender<SubscriptionEvent>,
) {
    debug!("Subscription opened at {}", path);

    loop {
        match store.get(&path).await {
            Ok(snapshot) => {
                if tx.send(SubscriptionEvent::Snapshot(snapshot)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Subscription read at {} failed: {}", path, e);
                if tx.send(SubscriptionEvent::Interrupted(e)).await.is_err() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(RETRY_INTERVAL) => {}
                    _ = tx.closed() => break,
                }
                if tx.send(SubscriptionEvent::Reconnecting).await.is_err() {
                    break;
                }
                continue;
            }
        }

        if !wait_for_change(&mut changes, &path, &tx).await {
            break;
        }
    }

    debug!("Subscription closed at {}", path);
}

/// Block until a write touches `path`. Returns false when the subscriber is gone.
async fn wait_for_change(
    changes: &mut broadcast::Receiver<StorePath>,
    path: &StorePath,
    tx: &mpsc::Sender<SubscriptionEvent>,
) -> bool {
    loop {
        let received = tokio::select! {
            received = changes.recv() => received,
            _ = tx.closed() => return false,
        };
        match received {
            Ok(changed) if changed.overlaps(path) => break,
            Ok(_) => continue,
            Err(RecvError::Lagged(n)) => {
                warn!("Subscription at {} lagged by {} changes, re-reading", path, n);
                break;
            }
            Err(RecvError::Closed) => return false,
        }
    }

    // Coalesce a burst of writes into a single re-read
    loop {
        match changes.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    true
}
