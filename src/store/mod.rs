//! The replicated key-value store.
//!
//! A key lives on the contacts the routing table names as closest to it. Each
//! node keeps two tiers locally: at most one authoritative value per key, which
//! it has committed to own, and at most one cached value per key, a copy it has
//! merely seen. Authoritative values are first-writer-wins everywhere: a second
//! put for a key that already has an owner fails with `KeyCollision` instead of
//! overwriting it.

pub mod consensus;
pub mod distributed;
pub mod local;
pub mod multi_record;

pub use consensus::{select_by_trust, TrustWeights};
pub use distributed::{DataResult, DataResults, DistributedStore, StoreHandler, STORE_CONSUMER};
pub use local::{LocalStore, StoredEntry, Tier};
pub use multi_record::{MultiRecordStore, RECORD_SEPARATOR};

use crate::identifier::Identifier;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key {0:?} already has an authoritative value")]
    KeyCollision(Identifier),
    #[error("key {0:?} has no authoritative value")]
    KeyNotFound(Identifier),
    #[error("record values must be non-empty and must not contain the zero separator")]
    InvalidRecord,
    #[error("key {0:?} is owned by another node, its records cannot be merged here")]
    CrossNodeMerge(Identifier),
}
