use crate::identifier::Identifier;
use crate::networking::contact::Contact;
use crate::networking::message_types::store_message::{
    GetResponse, PutResponseCode, StoreRequest,
};
use crate::networking::network::{Delivery, Network, PacketHandler};
use crate::store::local::{normalize_value, LocalStore, Tier};
use crate::store::StoreError;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, event, warn, Level};

pub const STORE_CONSUMER: &str = "store";

/// One replica's answer to a get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataResult {
    pub source: Contact,
    pub data: Vec<u8>,
    /// Whether the answering node owns the key rather than caching it.
    pub authoritative: bool,
}

///
/// Replicated put/get over the contacts closest to each key.
///
/// The local node is treated like any other candidate, except that it is
/// answered from the `LocalStore` directly instead of over the socket.
///
pub struct DistributedStore {
    network: Arc<Network>,
    local: Arc<LocalStore>,
}

impl DistributedStore {
    pub fn new(network: Arc<Network>, local: Arc<LocalStore>) -> Self {
        DistributedStore { network, local }
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn local_contact(&self) -> &Contact {
        self.network.local_contact()
    }

    fn local_identifier(&self) -> Identifier {
        self.network.local_contact().identifier
    }

    fn lookup_timeout(&self) -> Duration {
        self.network.routing().lookup_timeout()
    }

    ///
    /// Lazily walk the closest contacts for `key`.
    ///
    /// Nothing is sent until the results are pulled. Each pull asks candidates
    /// in order until one has data. Candidates that time out or hold nothing
    /// are skipped. Calling `get` again starts a fresh walk.
    ///
    pub fn get(&self, key: Identifier) -> DataResults {
        let candidates = self
            .network
            .routing()
            .closest_contacts_for(&key, &[]);
        DataResults {
            key,
            candidates: candidates.into(),
            network: self.network.clone(),
            local: self.local.clone(),
            timeout: self.lookup_timeout(),
        }
    }

    ///
    /// Store `value` under `key` on every candidate.
    ///
    /// The value is cached locally first, whatever happens remotely. The local
    /// candidate takes authoritative ownership; remote candidates are asked to
    /// do the same. If a replica reports the key as already owned, every entry
    /// this call created is removed again before `KeyCollision` is returned.
    /// Replicas that do not answer are skipped.
    ///
    /// A delete (`None` or an empty value) visits every candidate and fails
    /// with `KeyNotFound` only when no replica had anything to remove.
    ///
    pub async fn put(&self, key: Identifier, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        let value = normalize_value(value);
        self.local.put_cached(key, value.clone());
        match value {
            Some(value) => self.insert_everywhere(key, value).await,
            None => self.remove_everywhere(key).await,
        }
    }

    pub async fn delete(&self, key: Identifier) -> Result<(), StoreError> {
        self.put(key, None).await
    }

    ///
    /// Apply one put to one candidate and return its answer, or `None` when the
    /// candidate did not answer in time or answered with garbage. The local
    /// candidate is answered from the `LocalStore`.
    ///
    pub async fn put_on(
        &self,
        contact: &Contact,
        key: Identifier,
        value: Option<Vec<u8>>,
    ) -> Option<PutResponseCode> {
        if contact.identifier == self.local_identifier() {
            return Some(self.local.apply_put(key, value));
        }
        let response = self
            .network
            .request(contact, STORE_CONSUMER, self.lookup_timeout(), |token_id| {
                StoreRequest::Put {
                    token_id,
                    key,
                    value,
                }
                .serialize()
            })
            .await?;
        match PutResponseCode::deserialize(&response.payload) {
            Ok(code) => Some(code),
            Err(err) => {
                warn!("malformed put response from {}: {}", contact, err);
                None
            }
        }
    }

    async fn insert_everywhere(&self, key: Identifier, value: Vec<u8>) -> Result<(), StoreError> {
        let mut committed: Vec<Contact> = vec![];

        for contact in self.network.routing().closest_contacts_for(&key, &[]) {
            match self.put_on(&contact, key, Some(value.clone())).await {
                Some(PutResponseCode::Success) => committed.push(contact),
                Some(code) => {
                    debug!("put {:?} refused by {} with {:?}", key, contact, code);
                    self.roll_back(key, &value, &committed).await;
                    return Err(match code {
                        PutResponseCode::KeyNotFound => StoreError::KeyNotFound(key),
                        _ => StoreError::KeyCollision(key),
                    });
                }
                None => continue,
            }
        }

        event!(
            Level::DEBUG,
            "put {:?} acknowledged by {} replicas",
            key,
            committed.len()
        );
        Ok(())
    }

    /// Remove the entries a refused put created, and only those.
    async fn roll_back(&self, key: Identifier, value: &[u8], committed: &[Contact]) {
        for contact in committed {
            if contact.identifier == self.local_identifier() {
                if self.local.get_authoritative(&key).as_deref() == Some(value) {
                    let _ = self.local.remove_authoritative(&key);
                }
                continue;
            }
            match self.put_on(contact, key, None).await {
                Some(PutResponseCode::Success) => {}
                other => warn!("could not roll back {:?} on {}: {:?}", key, contact, other),
            }
        }
    }

    async fn remove_everywhere(&self, key: Identifier) -> Result<(), StoreError> {
        let mut removed = 0usize;
        let mut missing = 0usize;

        for contact in self.network.routing().closest_contacts_for(&key, &[]) {
            match self.put_on(&contact, key, None).await {
                Some(PutResponseCode::Success) => removed += 1,
                Some(PutResponseCode::KeyNotFound) => missing += 1,
                Some(PutResponseCode::DuplicateKey) => {
                    warn!("delete {:?} answered as a collision by {}", key, contact)
                }
                None => continue,
            }
        }

        event!(
            Level::DEBUG,
            "delete {:?} removed {} entries, {} replicas had none",
            key,
            removed,
            missing
        );
        if removed == 0 && missing > 0 {
            return Err(StoreError::KeyNotFound(key));
        }
        Ok(())
    }

    /// Answer a request from another node using only local state.
    pub fn answer(&self, request: &StoreRequest) -> Vec<u8> {
        match request {
            StoreRequest::Get { key, .. } => {
                let response = match self.local.get(key) {
                    Some(entry) => GetResponse {
                        authoritative: entry.tier == Tier::Authoritative,
                        data: Some(entry.value),
                    },
                    None => GetResponse {
                        authoritative: false,
                        data: None,
                    },
                };
                response.serialize()
            }
            StoreRequest::Put { key, value, .. } => {
                self.local.apply_put(*key, value.clone()).serialize()
            }
        }
    }
}

///
/// The lazy result sequence of a get. One network round trip per remote
/// candidate pulled. Dropping it, even in the middle of a pull, frees the
/// outstanding call token and sends nothing further.
///
pub struct DataResults {
    key: Identifier,
    candidates: VecDeque<Contact>,
    network: Arc<Network>,
    local: Arc<LocalStore>,
    timeout: Duration,
}

impl DataResults {
    pub fn key(&self) -> &Identifier {
        &self.key
    }

    /// Candidates not asked yet.
    pub fn remaining(&self) -> usize {
        self.candidates.len()
    }

    pub async fn next(&mut self) -> Option<DataResult> {
        let local_identifier = self.network.local_contact().identifier;
        while let Some(contact) = self.candidates.pop_front() {
            if contact.identifier == local_identifier {
                if let Some(entry) = self.local.get(&self.key) {
                    return Some(DataResult {
                        source: contact,
                        data: entry.value,
                        authoritative: entry.tier == Tier::Authoritative,
                    });
                }
                continue;
            }

            let key = self.key;
            let response = self
                .network
                .request(&contact, STORE_CONSUMER, self.timeout, |token_id| {
                    StoreRequest::Get { token_id, key }.serialize()
                })
                .await;
            let response = match response {
                Some(response) => response,
                None => continue,
            };
            match GetResponse::deserialize(&response.payload) {
                Ok(GetResponse {
                    authoritative,
                    data: Some(data),
                }) if !data.is_empty() => {
                    return Some(DataResult {
                        source: contact,
                        data,
                        authoritative,
                    });
                }
                Ok(_) => continue,
                Err(err) => {
                    warn!("malformed get response from {}: {}", contact, err);
                    continue;
                }
            }
        }
        None
    }

    /// Pull every remaining result.
    pub async fn collect_all(mut self) -> Vec<DataResult> {
        let mut results = vec![];
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    pub fn into_stream(self) -> impl Stream<Item = DataResult> {
        stream::unfold(self, |mut results| async move {
            results.next().await.map(|result| (result, results))
        })
    }
}

/// The `store` consumer. Decodes the request on the receive loop, answers from
/// local state, and sends the reply from a spawned task.
pub struct StoreHandler {
    store: Arc<DistributedStore>,
}

impl StoreHandler {
    pub fn new(store: Arc<DistributedStore>) -> Self {
        StoreHandler { store }
    }
}

impl PacketHandler for StoreHandler {
    fn handle(&self, delivery: Delivery) {
        let request = match StoreRequest::deserialize(&delivery.body) {
            Ok(request) => request,
            Err(err) => {
                debug!("dropping store request from {}: {}", delivery.sender, err);
                return;
            }
        };
        let payload = self.store.answer(&request);
        let network = self.store.network.clone();
        let token_id = request.token_id();
        tokio::spawn(async move {
            network
                .send_response(&delivery.sender, token_id, &payload)
                .await;
        });
    }
}
