//! The routing-table seam.
//!
//! Deciding which peers are closest to a key, refreshing buckets, and tracking
//! liveness belong to the routing layer, not to this crate. The store and the
//! transport only need the narrow view in [`RoutingTable`].
//! [`StaticRoutingTable`] is a small in-memory implementation used by the
//! daemon with a fixed peer list and by the test harness.

use crate::identifier::Identifier;
use crate::networking::contact::Contact;
use crate::time::create_timestamp;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::time::Duration;

pub trait RoutingTable: Send + Sync {
    /// Candidates for `key`, closest first. Contacts whose identifier is in
    /// `exclude` are left out. May include the local contact.
    fn closest_contacts_for(&self, key: &Identifier, exclude: &[Identifier]) -> Vec<Contact>;

    fn local_contact(&self) -> Contact;

    fn local_identifier(&self) -> Identifier {
        self.local_contact().identifier
    }

    /// How long a single RPC waits for its response.
    fn lookup_timeout(&self) -> Duration;

    /// `contact` answered a liveness check.
    fn deliver_ping(&self, contact: &Contact);
}

///
/// Fixed set of known contacts, ordered by XOR distance to the key. Keeps the
/// last time each known contact answered a ping.
///
pub struct StaticRoutingTable {
    local_contact: Contact,
    lookup_timeout: Duration,
    replication: usize,
    contacts: RwLock<Vec<Contact>>,
    last_seen: RwLock<AHashMap<Identifier, u64>>,
}

impl StaticRoutingTable {
    /// `replication` bounds how many candidates a lookup returns.
    pub fn new(local_contact: Contact, lookup_timeout: Duration, replication: usize) -> Self {
        StaticRoutingTable {
            contacts: RwLock::new(vec![local_contact.clone()]),
            local_contact,
            lookup_timeout,
            replication,
            last_seen: RwLock::new(AHashMap::new()),
        }
    }

    /// Add or replace a contact. The local contact is always present.
    pub fn add_contact(&self, contact: Contact) {
        let mut contacts = self.contacts.write();
        contacts.retain(|known| known.identifier != contact.identifier);
        contacts.push(contact);
    }

    pub fn remove_contact(&self, identifier: &Identifier) {
        if *identifier == self.local_contact.identifier {
            return;
        }
        self.contacts
            .write()
            .retain(|known| known.identifier != *identifier);
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.contacts.read().clone()
    }

    /// Milliseconds timestamp of the last ping answer from `identifier`.
    pub fn last_seen(&self, identifier: &Identifier) -> Option<u64> {
        self.last_seen.read().get(identifier).copied()
    }
}

impl RoutingTable for StaticRoutingTable {
    fn closest_contacts_for(&self, key: &Identifier, exclude: &[Identifier]) -> Vec<Contact> {
        let mut candidates: Vec<Contact> = self
            .contacts
            .read()
            .iter()
            .filter(|contact| !exclude.contains(&contact.identifier))
            .cloned()
            .collect();
        candidates.sort_by_key(|contact| contact.identifier.distance(key));
        candidates.truncate(self.replication);
        candidates
    }

    fn local_contact(&self) -> Contact {
        self.local_contact.clone()
    }

    fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    fn deliver_ping(&self, contact: &Contact) {
        let known = self
            .contacts
            .read()
            .iter()
            .any(|known| known.identifier == contact.identifier);
        if known {
            self.last_seen
                .write()
                .insert(contact.identifier, create_timestamp());
        }
    }
}
