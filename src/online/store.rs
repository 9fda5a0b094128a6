//! Record Store
//!
//! Abstract contract for the shared store that holds online match records,
//! and an in-process implementation used by the relay and by tests.
//!
//! The store is the only place atomicity comes from: [`RecordStore::transact`]
//! runs read-validate-write as one indivisible step, so two clients racing on
//! the same record can never both commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::core::code::JoinCode;
use super::record::{GameId, RecordDocument, RecordError, RecordStatus, RemoteGameRecord};

/// Store failures. These are transport-level problems, not game rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store cannot be reached.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// No record with this id (for operations that need one to exist).
    #[error("record {0} not found")]
    NotFound(GameId),

    /// Stored document failed validation.
    #[error("record {id} is corrupt: {source}")]
    Corrupt {
        /// Record id.
        id: GameId,
        /// Validation failure.
        source: RecordError,
    },

    /// A write would have stored an invalid record.
    #[error("refusing to store invalid record: {0}")]
    InvalidWrite(RecordError),
}

/// Field-equality query with a result limit.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Match records with this join code.
    pub code: Option<JoinCode>,
    /// Match records in this status.
    pub status: Option<RecordStatus>,
    /// Maximum number of results; 0 means unlimited.
    pub limit: usize,
}

impl RecordQuery {
    /// The join lookup: one waiting record with `code`.
    pub fn waiting_with_code(code: JoinCode) -> Self {
        Self {
            code: Some(code),
            status: Some(RecordStatus::Waiting),
            limit: 1,
        }
    }

    /// True if `record` satisfies every set field.
    pub fn matches(&self, record: &RemoteGameRecord) -> bool {
        self.code.as_ref().map_or(true, |c| *c == record.code)
            && self.status.map_or(true, |s| s == record.status)
    }
}

/// What a transaction body decided.
#[derive(Debug, Clone)]
pub enum TxDecision {
    /// Replace the record with this value.
    Write(RemoteGameRecord),
    /// Leave the record untouched.
    Abort,
}

/// Transaction body. Receives the current record (`None` if it does not
/// exist). May be called more than once by stores that retry on contention,
/// so it must not have side effects beyond recording its own decision.
pub type TxFn<'a> = Box<dyn FnMut(Option<&RemoteGameRecord>) -> TxDecision + Send + 'a>;

/// Live feed of one record's values.
///
/// Yields the value at subscription time, then every committed write in
/// commit order. Dropping it has no effect on the record.
#[derive(Debug)]
pub struct Subscription {
    game_id: GameId,
    rx: mpsc::UnboundedReceiver<RemoteGameRecord>,
}

impl Subscription {
    /// Wrap a channel receiver.
    pub fn new(game_id: GameId, rx: mpsc::UnboundedReceiver<RemoteGameRecord>) -> Self {
        Self { game_id, rx }
    }

    /// Record being watched.
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Next record value, `None` once the store closes the feed.
    pub async fn next(&mut self) -> Option<RemoteGameRecord> {
        self.rx.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_next(&mut self) -> Option<RemoteGameRecord> {
        self.rx.try_recv().ok()
    }
}

/// Contract of the shared record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new record and return its id.
    async fn create(&self, record: RemoteGameRecord) -> Result<GameId, StoreError>;

    /// Fetch a record.
    async fn get(&self, id: &GameId) -> Result<Option<RemoteGameRecord>, StoreError>;

    /// Records matching `query`, at most `query.limit`.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<(GameId, RemoteGameRecord)>, StoreError>;

    /// Atomically read the record, run `body`, and write its result.
    ///
    /// Returns the written record, or `None` if the body aborted or the
    /// record does not exist. A body returning `Write` for a missing record
    /// is treated as an abort.
    async fn transact(&self, id: &GameId, body: TxFn<'_>) -> Result<Option<RemoteGameRecord>, StoreError>;

    /// Subscribe to a record's values.
    async fn subscribe(&self, id: &GameId) -> Result<Subscription, StoreError>;

    /// Delete waiting records created before `cutoff`. Returns how many.
    async fn remove_stale_waiting(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// One stored entry: the raw document plus live subscribers.
struct StoredEntry {
    document: serde_json::Value,
    subscribers: Vec<mpsc::UnboundedSender<RemoteGameRecord>>,
}

impl StoredEntry {
    fn decode(&self, id: &GameId) -> Result<RemoteGameRecord, StoreError> {
        let doc: RecordDocument = serde_json::from_value(self.document.clone()).map_err(|e| {
            StoreError::Corrupt {
                id: id.clone(),
                source: RecordError::Schema(e.to_string()),
            }
        })?;
        RemoteGameRecord::try_from(doc).map_err(|source| StoreError::Corrupt {
            id: id.clone(),
            source,
        })
    }

    fn publish(&mut self, record: &RemoteGameRecord) {
        self.subscribers.retain(|tx| tx.send(record.clone()).is_ok());
    }
}

/// Document store kept in process memory.
///
/// Records are held in their loosely typed document form and validated on
/// every read, like a remote document database would require. A single
/// write lock covers each transaction, which makes writes linearizable.
pub struct InMemoryStore {
    records: RwLock<BTreeMap<GameId, StoredEntry>>,
    available: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Insert a raw document, bypassing validation.
    pub async fn insert_document(&self, id: GameId, document: serde_json::Value) {
        let mut records = self.records.write().await;
        records.insert(id, StoredEntry { document, subscribers: Vec::new() });
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store offline".to_string()))
        }
    }

    fn encode(record: &RemoteGameRecord) -> Result<serde_json::Value, StoreError> {
        record.validate().map_err(StoreError::InvalidWrite)?;
        serde_json::to_value(record.to_document())
            .map_err(|e| StoreError::Unavailable(format!("encode failed: {}", e)))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create(&self, mut record: RemoteGameRecord) -> Result<GameId, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        record.created_at = now;
        record.updated_at = now;
        let document = Self::encode(&record)?;

        let id = GameId::generate();
        let mut records = self.records.write().await;
        records.insert(id.clone(), StoredEntry { document, subscribers: Vec::new() });
        debug!(game_id = %id, code = %record.code, "record created");
        Ok(id)
    }

    async fn get(&self, id: &GameId) -> Result<Option<RemoteGameRecord>, StoreError> {
        self.check_available()?;
        let records = self.records.read().await;
        records.get(id).map(|entry| entry.decode(id)).transpose()
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<(GameId, RemoteGameRecord)>, StoreError> {
        self.check_available()?;
        let records = self.records.read().await;
        let mut found = Vec::new();

        for (id, entry) in records.iter() {
            let record = match entry.decode(id) {
                Ok(r) => r,
                Err(e) => {
                    warn!(game_id = %id, error = %e, "skipping corrupt record in query");
                    continue;
                }
            };
            if query.matches(&record) {
                found.push((id.clone(), record));
                if query.limit != 0 && found.len() >= query.limit {
                    break;
                }
            }
        }

        Ok(found)
    }

    async fn transact(&self, id: &GameId, mut body: TxFn<'_>) -> Result<Option<RemoteGameRecord>, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().await;

        let Some(entry) = records.get_mut(id) else {
            // Let the body observe the absence so it can report it.
            let _ = body(None);
            return Ok(None);
        };

        let current = entry.decode(id)?;
        match body(Some(&current)) {
            TxDecision::Abort => Ok(None),
            TxDecision::Write(mut next) => {
                next.created_at = current.created_at;
                next.updated_at = Utc::now();
                entry.document = Self::encode(&next)?;
                entry.publish(&next);
                Ok(Some(next))
            }
        }
    }

    async fn subscribe(&self, id: &GameId) -> Result<Subscription, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let entry = records.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let current = entry.decode(id)?;

        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, send cannot fail.
        let _ = tx.send(current);
        entry.subscribers.push(tx);
        Ok(Subscription::new(id.clone(), rx))
    }

    async fn remove_stale_waiting(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().await;

        let stale: Vec<GameId> = records
            .iter()
            .filter_map(|(id, entry)| {
                let record = entry.decode(id).ok()?;
                (record.status == RecordStatus::Waiting && record.created_at < cutoff)
                    .then(|| id.clone())
            })
            .collect();

        for id in &stale {
            // Dropping the entry closes every subscriber feed.
            records.remove(id);
            debug!(game_id = %id, "removed stale waiting record");
        }

        Ok(stale.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.check_available()?;
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online::record::{ParticipantId, Winner};

    fn waiting(code: &str) -> RemoteGameRecord {
        RemoteGameRecord::new_waiting(
            ParticipantId::new("host").unwrap(),
            JoinCode::from_stored(code),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryStore::new();
        let id = store.create(waiting("AAAAA")).await.unwrap();

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.code.as_str(), "AAAAA");
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get(&GameId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_by_code_and_status() {
        let store = InMemoryStore::new();
        store.create(waiting("AAAAA")).await.unwrap();
        store.create(waiting("BBBBB")).await.unwrap();
        store.create(waiting("BBBBB")).await.unwrap();

        let hits = store
            .query(&RecordQuery::waiting_with_code(JoinCode::from_stored("BBBBB")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let all = store
            .query(&RecordQuery { status: Some(RecordStatus::Waiting), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let none = store
            .query(&RecordQuery { status: Some(RecordStatus::Playing), ..Default::default() })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_transact_abort_leaves_record() {
        let store = InMemoryStore::new();
        let id = store.create(waiting("AAAAA")).await.unwrap();
        let before = store.get(&id).await.unwrap().unwrap();

        let result = store.transact(&id, Box::new(|_: Option<&RemoteGameRecord>| TxDecision::Abort)).await.unwrap();
        assert!(result.is_none());
        assert_eq!(store.get(&id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_transact_missing_record() {
        let store = InMemoryStore::new();
        let mut saw_missing = false;
        let result = store
            .transact(
                &GameId::new("nope"),
                Box::new(|current: Option<&RemoteGameRecord>| {
                    saw_missing = current.is_none();
                    TxDecision::Abort
                }),
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(saw_missing);
    }

    #[tokio::test]
    async fn test_transact_rejects_invalid_write() {
        let store = InMemoryStore::new();
        let id = store.create(waiting("AAAAA")).await.unwrap();

        let result = store
            .transact(
                &id,
                Box::new(|current: Option<&RemoteGameRecord>| {
                    let mut next = current.unwrap().clone();
                    next.status = RecordStatus::Playing; // no guest
                    TxDecision::Write(next)
                }),
            )
            .await;
        assert!(matches!(result, Err(StoreError::InvalidWrite(_))));
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, RecordStatus::Waiting);
    }

    #[tokio::test]
    async fn test_subscribe_sees_current_then_writes() {
        let store = InMemoryStore::new();
        let id = store.create(waiting("AAAAA")).await.unwrap();
        let mut sub = store.subscribe(&id).await.unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(first.status, RecordStatus::Waiting);

        store
            .transact(
                &id,
                Box::new(|current: Option<&RemoteGameRecord>| {
                    let mut next = current.unwrap().clone();
                    next.guest_id = ParticipantId::new("guest");
                    next.status = RecordStatus::Playing;
                    TxDecision::Write(next)
                }),
            )
            .await
            .unwrap();

        let second = sub.next().await.unwrap();
        assert_eq!(second.status, RecordStatus::Playing);
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = InMemoryStore::new();
        let id = store.create(waiting("AAAAA")).await.unwrap();
        drop(store.subscribe(&id).await.unwrap());

        // Publishing to a closed feed must not fail the write.
        let written = store
            .transact(&id, Box::new(|current: Option<&RemoteGameRecord>| TxDecision::Write(current.unwrap().clone())))
            .await
            .unwrap();
        assert!(written.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_rejected() {
        let store = InMemoryStore::new();
        let id = GameId::new("bad");
        store
            .insert_document(
                id.clone(),
                serde_json::json!({
                    "board": ["", "", "", "", "", "", "", "", ""],
                    "hostId": "h", "guestId": "", "currentTurn": "h",
                    "status": "paused", "winner": "", "code": "ABCDE"
                }),
            )
            .await;

        assert!(matches!(store.get(&id).await, Err(StoreError::Corrupt { .. })));
        // Queries skip it rather than fail.
        let all = store.query(&RecordQuery::default()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_error() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert!(matches!(store.create(waiting("AAAAA")).await, Err(StoreError::Unavailable(_))));
        store.set_available(true);
        assert!(store.create(waiting("AAAAA")).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_stale_waiting() {
        let store = InMemoryStore::new();
        let id = store.create(waiting("AAAAA")).await.unwrap();
        let mut sub = store.subscribe(&id).await.unwrap();
        sub.next().await.unwrap();

        let removed = store
            .remove_stale_waiting(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = store
            .remove_stale_waiting(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_remove_stale_waiting_spares_started_games() {
        let store = InMemoryStore::new();

        let mut playing = waiting("BBBBB");
        playing.guest_id = ParticipantId::new("guest");
        playing.status = RecordStatus::Playing;
        let playing_id = store.create(playing.clone()).await.unwrap();

        let mut finished = playing;
        finished.code = JoinCode::from_stored("CCCCC");
        finished.status = RecordStatus::Finished;
        finished.current_turn = None;
        finished.winner = Winner::Draw;
        let finished_id = store.create(finished).await.unwrap();

        let waiting_id = store.create(waiting("AAAAA")).await.unwrap();

        let removed = store
            .remove_stale_waiting(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&waiting_id).await.unwrap().is_none());
        assert_eq!(store.get(&playing_id).await.unwrap().unwrap().status, RecordStatus::Playing);
        assert_eq!(store.get(&finished_id).await.unwrap().unwrap().status, RecordStatus::Finished);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
