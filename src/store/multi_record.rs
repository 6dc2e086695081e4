use crate::identifier::Identifier;
use crate::networking::contact::Contact;
use crate::store::distributed::{DataResult, DistributedStore};
use crate::store::StoreError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Separates records inside one stored value.
pub const RECORD_SEPARATOR: u8 = 0;

///
/// Several records under one key, stored as a single value joined by
/// `RECORD_SEPARATOR`.
///
/// A put that collides with this node's own authoritative value is merged
/// into it: the combined value replaces the old one on this node and on every
/// replica holding that same old value. Values owned by another node are never
/// merged from here.
///
pub struct MultiRecordStore {
    store: Arc<DistributedStore>,
}

pub fn join_records<T: AsRef<[u8]>>(records: &[T]) -> Vec<u8> {
    let mut joined: Vec<u8> = vec![];
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            joined.push(RECORD_SEPARATOR);
        }
        joined.extend_from_slice(record.as_ref());
    }
    joined
}

/// Empty pieces (leading, trailing or doubled separators) are skipped.
pub fn split_records(value: &[u8]) -> Vec<Vec<u8>> {
    value
        .split(|byte| *byte == RECORD_SEPARATOR)
        .filter(|record| !record.is_empty())
        .map(|record| record.to_vec())
        .collect()
}

impl MultiRecordStore {
    pub fn new(store: Arc<DistributedStore>) -> Self {
        MultiRecordStore { store }
    }

    pub async fn put(&self, key: Identifier, record: Vec<u8>) -> Result<(), StoreError> {
        if record.is_empty() || record.contains(&RECORD_SEPARATOR) {
            return Err(StoreError::InvalidRecord);
        }

        if let Some(existing) = self.store.local().get_authoritative(&key) {
            return self.merge(key, existing, record).await;
        }

        // a refused put has already undone its own share
        match self.store.put(key, Some(record)).await {
            Err(StoreError::KeyCollision(_)) => {
                debug!("multi-record put {:?} collided on a remote owner", key);
                Err(StoreError::CrossNodeMerge(key))
            }
            other => other,
        }
    }

    ///
    /// Replace `existing`, this node's authoritative value, with `existing`
    /// plus `record`.
    ///
    /// Every replica is read first. If any remote replica owns a different
    /// value the merge is refused with `CrossNodeMerge` and nothing changes.
    /// Otherwise the old value is removed from this node and from each remote
    /// owner of it, and the combined value is put. If that put is refused the
    /// old value is written back to the same places.
    ///
    async fn merge(
        &self,
        key: Identifier,
        existing: Vec<u8>,
        record: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut records = split_records(&existing);
        if records.contains(&record) {
            return Ok(());
        }

        let local_identifier = self.store.local_contact().identifier;
        let mut owners: Vec<Contact> = vec![];
        let mut results = self.store.get(key);
        while let Some(result) = results.next().await {
            if !result.authoritative || result.source.identifier == local_identifier {
                continue;
            }
            if result.data != existing {
                debug!("{:?} is owned by {} with another value", key, result.source);
                return Err(StoreError::CrossNodeMerge(key));
            }
            owners.push(result.source);
        }

        records.push(record);
        let combined = join_records(&records);
        let local = self.store.local();
        if local.get_authoritative(&key).as_ref() == Some(&existing) {
            let _ = local.remove_authoritative(&key);
        }
        for owner in owners.iter() {
            self.store.put_on(owner, key, None).await;
        }

        debug!("merging {} records under {:?}", records.len(), key);
        match self.store.put(key, Some(combined)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("merge under {:?} refused, restoring the old value", key);
                let _ = local.insert_authoritative(key, existing.clone());
                for owner in owners.iter() {
                    self.store.put_on(owner, key, Some(existing.clone())).await;
                }
                Err(err)
            }
        }
    }

    pub async fn delete(&self, key: Identifier) -> Result<(), StoreError> {
        self.store.delete(key).await
    }

    /// Every answer for `key`, split into records.
    pub async fn get(&self, key: Identifier) -> Vec<(DataResult, Vec<Vec<u8>>)> {
        self.store
            .get(key)
            .collect_all()
            .await
            .into_iter()
            .map(|result| {
                let records = split_records(&result.data);
                (result, records)
            })
            .collect()
    }

    /// The distinct records any replica returned, in the order first seen.
    pub async fn records(&self, key: Identifier) -> Vec<Vec<u8>> {
        let mut records: Vec<Vec<u8>> = vec![];
        for (_, split) in self.get(key).await {
            for record in split {
                if !records.contains(&record) {
                    records.push(record);
                }
            }
        }
        records
    }
}
