use crate::identifier::Identifier;
use crate::networking::message_types::store_message::PutResponseCode;
use crate::store::StoreError;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Cached,
    Authoritative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: Identifier,
    pub value: Vec<u8>,
    pub tier: Tier,
}

///
/// This node's share of the store.
///
/// Authoritative inserts happen under the write lock with an entry check, so
/// two concurrent puts for the same key cannot both win.
///
#[derive(Default)]
pub struct LocalStore {
    cached: RwLock<AHashMap<Identifier, Vec<u8>>>,
    authoritative: RwLock<AHashMap<Identifier, Vec<u8>>>,
}

/// Absent and empty values both mean "delete".
pub fn normalize_value(value: Option<Vec<u8>>) -> Option<Vec<u8>> {
    value.filter(|value| !value.is_empty())
}

impl LocalStore {
    pub fn new() -> Self {
        LocalStore::default()
    }

    pub fn get_authoritative(&self, key: &Identifier) -> Option<Vec<u8>> {
        self.authoritative.read().get(key).cloned()
    }

    pub fn get_cached(&self, key: &Identifier) -> Option<Vec<u8>> {
        self.cached.read().get(key).cloned()
    }

    /// Authoritative value if there is one, the cached copy otherwise.
    pub fn get(&self, key: &Identifier) -> Option<StoredEntry> {
        if let Some(value) = self.get_authoritative(key) {
            return Some(StoredEntry {
                key: *key,
                value,
                tier: Tier::Authoritative,
            });
        }
        self.get_cached(key).map(|value| StoredEntry {
            key: *key,
            value,
            tier: Tier::Cached,
        })
    }

    /// Replace the cached copy, or drop it when `value` is absent or empty.
    pub fn put_cached(&self, key: Identifier, value: Option<Vec<u8>>) {
        let mut cached = self.cached.write();
        match normalize_value(value) {
            Some(value) => {
                cached.insert(key, value);
            }
            None => {
                cached.remove(&key);
            }
        }
    }

    /// Take ownership of `key`. Fails if this node already owns it.
    pub fn insert_authoritative(&self, key: Identifier, value: Vec<u8>) -> Result<(), StoreError> {
        match self.authoritative.write().entry(key) {
            Entry::Occupied(_) => Err(StoreError::KeyCollision(key)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }
    }

    pub fn remove_authoritative(&self, key: &Identifier) -> Result<Vec<u8>, StoreError> {
        self.authoritative
            .write()
            .remove(key)
            .ok_or(StoreError::KeyNotFound(*key))
    }

    /// A put as the receiving replica sees it: insert when a value is given,
    /// delete when it is not.
    pub fn apply_put(&self, key: Identifier, value: Option<Vec<u8>>) -> PutResponseCode {
        let result = match normalize_value(value) {
            Some(value) => self.insert_authoritative(key, value),
            None => self.remove_authoritative(&key).map(|_| ()),
        };
        match result {
            Ok(()) => PutResponseCode::Success,
            Err(StoreError::KeyCollision(_)) => PutResponseCode::DuplicateKey,
            Err(_) => PutResponseCode::KeyNotFound,
        }
    }

    /// Snapshot of every entry, authoritative first.
    pub fn entries(&self) -> Vec<StoredEntry> {
        let mut entries: Vec<StoredEntry> = self
            .authoritative
            .read()
            .iter()
            .map(|(key, value)| StoredEntry {
                key: *key,
                value: value.clone(),
                tier: Tier::Authoritative,
            })
            .collect();
        entries.extend(self.cached.read().iter().map(|(key, value)| StoredEntry {
            key: *key,
            value: value.clone(),
            tier: Tier::Cached,
        }));
        entries
    }

    pub fn authoritative_len(&self) -> usize {
        self.authoritative.read().len()
    }

    pub fn cached_len(&self) -> usize {
        self.cached.read().len()
    }
}
