//! Key/value record store with change subscriptions.
//!
//! The store persists a fixed set of named records ([`StoreKey`]) through a
//! pluggable [`KvBackend`]. Reads fall back to the record's default when the
//! key is absent or the stored JSON is corrupt.
//!
//! Every read-modify-write goes through [`Store::transact`], which holds the
//! backend lock for the whole closure and commits all staged records in one
//! batch. A closure that returns an error commits nothing. Subscribers are
//! notified synchronously after a successful commit, outside the lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};
use crate::meditation::{MeditationRecord, MeditationSession};
use crate::mission::{Mission, MissionTimers};
use crate::profile::Profile;

/// Names of the persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKey {
    Missions,
    Meditation,
    Profile,
    MissionTimers,
    MeditationSession,
}

impl StoreKey {
    pub const ALL: [StoreKey; 5] = [
        StoreKey::Missions,
        StoreKey::Meditation,
        StoreKey::Profile,
        StoreKey::MissionTimers,
        StoreKey::MeditationSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Missions => "missions",
            StoreKey::Meditation => "meditation",
            StoreKey::Profile => "profile",
            StoreKey::MissionTimers => "mission_timers",
            StoreKey::MeditationSession => "meditation_session",
        }
    }

    /// JSON written for a key that has never been stored.
    fn default_value(&self) -> Result<serde_json::Value> {
        Ok(match self {
            StoreKey::Missions => serde_json::to_value(Vec::<Mission>::new())?,
            StoreKey::Meditation => serde_json::to_value(Vec::<MeditationRecord>::new())?,
            StoreKey::Profile => serde_json::to_value(Profile::default())?,
            StoreKey::MissionTimers => serde_json::to_value(MissionTimers::default())?,
            StoreKey::MeditationSession => serde_json::to_value(MeditationSession::default())?,
        })
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Rust type stored under one [`StoreKey`].
pub trait Record: Serialize + DeserializeOwned + Default {
    const KEY: StoreKey;
}

impl Record for Vec<Mission> {
    const KEY: StoreKey = StoreKey::Missions;
}

impl Record for Vec<MeditationRecord> {
    const KEY: StoreKey = StoreKey::Meditation;
}

impl Record for Profile {
    const KEY: StoreKey = StoreKey::Profile;
}

impl Record for MissionTimers {
    const KEY: StoreKey = StoreKey::MissionTimers;
}

impl Record for MeditationSession {
    const KEY: StoreKey = StoreKey::MeditationSession;
}

/// Raw string storage underneath the [`Store`].
///
/// [`Store::transact`] brackets every closure with `begin` and `commit` (or
/// `rollback`). Backends shared between processes use them to hold a write
/// lock across the whole read-modify-write.
pub trait KvBackend: Send {
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write every entry or none of them.
    fn write_batch(&mut self, entries: &[(String, String)]) -> Result<()>;

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Volatile backend for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    values: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing serialization.
    pub fn with_raw(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl KvBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn write_batch(&mut self, entries: &[(String, String)]) -> Result<()> {
        for (key, value) in entries {
            self.values.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Payload delivered to subscribers after a committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: StoreKey,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&StoreChange) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    key: StoreKey,
    callback: Callback,
}

/// Staged view of the store inside [`Store::transact`].
pub struct Txn<'a> {
    backend: &'a dyn KvBackend,
    staged: BTreeMap<StoreKey, serde_json::Value>,
}

impl<'a> Txn<'a> {
    /// Read a record, seeing values staged earlier in this transaction.
    pub fn load<R: Record>(&self) -> Result<R> {
        if let Some(value) = self.staged.get(&R::KEY) {
            return Ok(serde_json::from_value(value.clone())?);
        }
        let Some(raw) = self.backend.read(R::KEY.as_str())? else {
            return Ok(R::default());
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!(key = %R::KEY, error = %e, "corrupt record, using default");
                Ok(R::default())
            }
        }
    }

    /// Stage a record for commit.
    pub fn save<R: Record>(&mut self, record: &R) -> Result<()> {
        self.staged.insert(R::KEY, serde_json::to_value(record)?);
        Ok(())
    }

    /// Load, mutate and stage a record in one step.
    pub fn modify<R: Record, T>(&mut self, f: impl FnOnce(&mut R) -> T) -> Result<T> {
        let mut record = self.load::<R>()?;
        let out = f(&mut record);
        self.save(&record)?;
        Ok(out)
    }
}

/// The application's record store. Construct once and pass by reference.
pub struct Store {
    backend: Mutex<Box<dyn KvBackend>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscription: AtomicU64,
}

impl Store {
    /// Wrap a backend, writing defaults for any record that was never stored.
    pub fn new(backend: impl KvBackend + 'static) -> Result<Self> {
        let store = Self {
            backend: Mutex::new(Box::new(backend)),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        };
        store.init_defaults()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(MemoryBackend::new())
    }

    fn init_defaults(&self) -> Result<()> {
        let mut backend = self.backend.lock().map_err(|_| DatabaseError::Poisoned)?;
        let mut missing = Vec::new();
        for key in StoreKey::ALL {
            if backend.read(key.as_str())?.is_none() {
                missing.push((key.as_str().to_string(), key.default_value()?.to_string()));
            }
        }
        if !missing.is_empty() {
            tracing::debug!(count = missing.len(), "initialising default records");
            backend.write_batch(&missing)?;
        }
        Ok(())
    }

    pub fn get<R: Record>(&self) -> Result<R> {
        self.transact(|txn| txn.load::<R>())
    }

    pub fn set<R: Record>(&self, record: &R) -> Result<()> {
        self.transact(|txn| txn.save(record))
    }

    /// Untyped read of any record, defaulting like [`Store::get`].
    pub fn get_value(&self, key: StoreKey) -> Result<serde_json::Value> {
        let backend = self.backend.lock().map_err(|_| DatabaseError::Poisoned)?;
        match backend.read(key.as_str())? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(value),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "corrupt record, using default");
                    key.default_value()
                }
            },
            None => key.default_value(),
        }
    }

    /// Run a read-modify-write atomically.
    ///
    /// Writers are serialized: the backend stays locked, and its own
    /// transaction open, until the batch is committed. Other handles on the
    /// same database wait for the commit before reading. Do not call back into
    /// the same store from inside `f`.
    pub fn transact<T>(&self, f: impl FnOnce(&mut Txn<'_>) -> Result<T>) -> Result<T> {
        let (out, changes) = {
            let mut backend = self.backend.lock().map_err(|_| DatabaseError::Poisoned)?;
            backend.begin()?;
            let result = Self::run_staged(&mut **backend, f).and_then(|done| {
                backend.commit()?;
                Ok(done)
            });
            match result {
                Ok(done) => {
                    if !done.1.is_empty() {
                        tracing::debug!(keys = ?done.1.keys().collect::<Vec<_>>(), "committed records");
                    }
                    done
                }
                Err(e) => {
                    if let Err(rollback) = backend.rollback() {
                        tracing::warn!(error = %rollback, "rollback failed");
                    }
                    return Err(e);
                }
            }
        };

        self.notify(changes);
        Ok(out)
    }

    /// Run `f` against a fresh staging area and write what it staged.
    fn run_staged<T>(
        backend: &mut dyn KvBackend,
        f: impl FnOnce(&mut Txn<'_>) -> Result<T>,
    ) -> Result<(T, BTreeMap<StoreKey, serde_json::Value>)> {
        let mut txn = Txn {
            backend: &*backend,
            staged: BTreeMap::new(),
        };
        let out = f(&mut txn)?;
        let staged = txn.staged;

        if !staged.is_empty() {
            let entries: Vec<(String, String)> = staged
                .iter()
                .map(|(key, value)| (key.as_str().to_string(), value.to_string()))
                .collect();
            backend.write_batch(&entries)?;
        }
        Ok((out, staged))
    }

    /// Register interest in one record. The callback runs after each
    /// committed write of that key.
    pub fn subscribe(
        &self,
        key: StoreKey,
        callback: impl Fn(&StoreChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber {
                id,
                key,
                callback: Arc::new(callback),
            });
        }
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut subs) = self.subscribers.lock() else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    fn notify(&self, changes: BTreeMap<StoreKey, serde_json::Value>) {
        for (key, value) in changes {
            let callbacks: Vec<Callback> = match self.subscribers.lock() {
                Ok(subs) => subs
                    .iter()
                    .filter(|s| s.key == key)
                    .map(|s| Arc::clone(&s.callback))
                    .collect(),
                Err(_) => return,
            };
            if callbacks.is_empty() {
                continue;
            }
            let change = StoreChange { key, value };
            for callback in callbacks {
                callback(&change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ValidationError};

    #[test]
    fn absent_records_default() {
        let store = Store::in_memory().unwrap();
        let profile: Profile = store.get().unwrap();
        assert_eq!(profile.level, 1);
        let missions: Vec<Mission> = store.get().unwrap();
        assert!(missions.is_empty());
    }

    #[test]
    fn corrupt_record_falls_back_to_default() {
        let backend = MemoryBackend::new().with_raw("profile", "{not json");
        let store = Store::new(backend).unwrap();
        let profile: Profile = store.get().unwrap();
        assert_eq!(profile, Profile::default());
        assert_eq!(
            store.get_value(StoreKey::Profile).unwrap()["level"],
            serde_json::json!(1)
        );
    }

    #[test]
    fn set_then_get() {
        let store = Store::in_memory().unwrap();
        let mut profile = Profile::default();
        profile.total_exp = 42;
        store.set(&profile).unwrap();
        assert_eq!(store.get::<Profile>().unwrap().total_exp, 42);
    }

    #[test]
    fn subscribers_only_hear_their_key() {
        let store = Store::in_memory().unwrap();
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&heard);
        store.subscribe(StoreKey::Profile, move |change| {
            sink.lock().unwrap().push(change.key);
        });

        store.set(&Vec::<Mission>::new()).unwrap();
        store.set(&Profile::default()).unwrap();

        assert_eq!(*heard.lock().unwrap(), vec![StoreKey::Profile]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = Store::in_memory().unwrap();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = store.subscribe(StoreKey::Profile, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set(&Profile::default()).unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set(&Profile::default()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_can_read_store() {
        let store = Arc::new(Store::in_memory().unwrap());
        let seen = Arc::new(AtomicU64::new(0));
        let (reader, sink) = (Arc::clone(&store), Arc::clone(&seen));
        store.subscribe(StoreKey::Profile, move |_| {
            let level = reader.get::<Profile>().unwrap().level;
            sink.store(u64::from(level), Ordering::SeqCst);
        });

        let mut profile = Profile::default();
        profile.level = 7;
        store.set(&profile).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn failed_transaction_commits_nothing() {
        let store = Store::in_memory().unwrap();
        let notified = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&notified);
        store.subscribe(StoreKey::Profile, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let result: Result<()> = store.transact(|txn| {
            txn.modify(|p: &mut Profile| p.total_exp = 99)?;
            Err(ValidationError::Empty("title").into())
        });

        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(store.get::<Profile>().unwrap().total_exp, 0);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn staged_values_visible_within_transaction() {
        let store = Store::in_memory().unwrap();
        store
            .transact(|txn| {
                txn.modify(|p: &mut Profile| p.total_exp = 5)?;
                let seen = txn.load::<Profile>()?;
                assert_eq!(seen.total_exp, 5);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn store_over_sqlite_backend() {
        let db = crate::storage::Database::open_memory().unwrap();
        let store = Store::new(db).unwrap();
        let mut profile = Profile::default();
        profile.meditation_minutes = 12;
        store.set(&profile).unwrap();
        assert_eq!(store.get::<Profile>().unwrap().meditation_minutes, 12);
    }

    #[test]
    fn failed_transaction_rolls_back_sqlite() {
        let db = crate::storage::Database::open_memory().unwrap();
        let store = Store::new(db).unwrap();
        let result: Result<()> = store.transact(|txn| {
            txn.modify(|p: &mut Profile| p.total_exp = 99)?;
            Err(ValidationError::Empty("title").into())
        });
        assert!(result.is_err());

        // The connection is usable again after the rollback.
        store.transact(|txn| txn.modify(|p: &mut Profile| p.total_exp += 1)).unwrap();
        assert_eq!(store.get::<Profile>().unwrap().total_exp, 1);
    }
}
