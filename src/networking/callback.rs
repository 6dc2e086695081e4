use crate::networking::contact::Contact;
use crate::networking::packet::{write_bytes, FrameError, WireReader};
use crate::time::create_timestamp;
use ahash::AHashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Consumer name under which responses travel back to the requester.
pub const CALLBACK_CONSUMER: &str = "callback";

/// A response matched to a call token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub source: Contact,
    pub payload: Vec<u8>,
}

struct Slot {
    consumer: String,
    // when set, only a response from this contact completes the slot
    expected: Option<Contact>,
    // taken by the first completion, later ones find None
    sender: Option<oneshot::Sender<Response>>,
}

struct RegistryInner {
    slots: Mutex<AHashMap<u64, Slot>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn release(&self, token_id: u64) {
        if self.slots.lock().remove(&token_id).is_some() {
            trace!("freed call token {}", token_id);
        }
    }
}

///
/// Matches responses arriving on the shared socket to the call that is
/// waiting for them.
///
/// A caller allocates a `CallToken`, puts its id in the request, and waits on
/// it. When the response comes back the receive loop calls `complete` with the
/// same id, which wakes the waiter. Tokens go
/// `Allocated -> Waiting -> Completed | TimedOut -> Freed`. Dropping a token
/// frees it, so an abandoned call never leaks its slot.
///
/// Ids count up from a random start and are never handed out twice while the
/// slot is in use. Completing an unknown, already completed or freed id does
/// nothing.
///
#[derive(Clone)]
pub struct CallbackRegistry {
    inner: Arc<RegistryInner>,
}

/// Handle for one outstanding call. Owned by the caller that allocated it.
pub struct CallToken {
    id: u64,
    consumer: String,
    created: u64,
    receiver: oneshot::Receiver<Response>,
    response: Option<Response>,
    registry: Arc<RegistryInner>,
}

impl CallToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the consumer that issued the call.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Allocation time in milliseconds since the epoch.
    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn is_completed(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    ///
    /// Wait until the response arrives or `timeout` passes. Returns whether a
    /// response is available. Holds no lock while suspended.
    ///
    pub async fn wait(&mut self, timeout: Duration) -> bool {
        if self.response.is_some() {
            return true;
        }
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(response)) => {
                self.response = Some(response);
                true
            }
            // sender dropped: the slot went away underneath us
            Ok(Err(_)) => false,
            Err(_elapsed) => {
                trace!("call token {} timed out", self.id);
                false
            }
        }
    }
}

impl Drop for CallToken {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        CallbackRegistry::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        // ids from a previous run of this node should not match fresh calls
        let start: u64 = rand::thread_rng().gen_range(1..u64::MAX / 2);
        CallbackRegistry {
            inner: Arc::new(RegistryInner {
                slots: Mutex::new(AHashMap::new()),
                next_id: AtomicU64::new(start),
            }),
        }
    }

    /// Reserve a fresh token for a call made on behalf of `consumer`.
    pub fn allocate_token(&self, consumer: &str) -> CallToken {
        self.allocate_slot(consumer, None)
    }

    /// Like `allocate_token`, but responses from anyone other than `expected`
    /// are dropped and leave the token waiting.
    pub fn allocate_token_for(&self, consumer: &str, expected: &Contact) -> CallToken {
        self.allocate_slot(consumer, Some(expected.clone()))
    }

    fn allocate_slot(&self, consumer: &str, expected: Option<Contact>) -> CallToken {
        let (sender, receiver) = oneshot::channel();
        let mut slots = self.inner.slots.lock();
        let mut id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        while id == 0 || slots.contains_key(&id) {
            id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        }
        slots.insert(
            id,
            Slot {
                consumer: consumer.to_string(),
                expected,
                sender: Some(sender),
            },
        );
        drop(slots);

        CallToken {
            id,
            consumer: consumer.to_string(),
            created: create_timestamp(),
            receiver,
            response: None,
            registry: self.inner.clone(),
        }
    }

    pub async fn wait(&self, token: &mut CallToken, timeout: Duration) -> bool {
        token.wait(timeout).await
    }

    ///
    /// Hand a response to the token waiting for `token_id`. Returns whether a
    /// waiter received it. Only the first completion of a token counts.
    ///
    pub fn complete(&self, token_id: u64, source: Contact, payload: Vec<u8>) -> bool {
        let sender = {
            let mut slots = self.inner.slots.lock();
            match slots.get_mut(&token_id) {
                Some(slot) if !answers_for(slot.expected.as_ref(), &source) => {
                    debug!(
                        "dropping response from {} for call token {} sent elsewhere",
                        source, token_id
                    );
                    return false;
                }
                Some(slot) => match slot.sender.take() {
                    Some(sender) => Some((sender, slot.consumer.clone())),
                    None => None,
                },
                None => None,
            }
        };
        match sender {
            Some((sender, consumer)) => {
                trace!("completing call token {} for {}", token_id, consumer);
                sender.send(Response { source, payload }).is_ok()
            }
            None => {
                debug!(
                    "dropping response from {} for unknown or finished call token {}",
                    source, token_id
                );
                false
            }
        }
    }

    /// Release a token. Same as dropping it, spelled out for call sites that
    /// want the release to be visible.
    pub fn free(&self, token: CallToken) {
        drop(token);
    }

    /// Number of tokens currently allocated.
    pub fn pending_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Entry point for deliveries to the callback consumer.
    pub fn handle_response_body(&self, source: Contact, body: &[u8]) -> Result<bool, FrameError> {
        let (token_id, payload) = decode_response(body)?;
        Ok(self.complete(token_id, source, payload))
    }
}

fn answers_for(expected: Option<&Contact>, source: &Contact) -> bool {
    match expected {
        Some(expected) => {
            expected.identifier == source.identifier
                && expected.socket_addr() == source.socket_addr()
        }
        None => true,
    }
}

/// Body of a callback delivery: the token id followed by the response payload.
pub fn encode_response(token_id: u64, payload: &[u8]) -> Vec<u8> {
    let mut vbytes: Vec<u8> = vec![];
    vbytes.extend(&token_id.to_be_bytes());
    write_bytes(&mut vbytes, payload);
    vbytes
}

pub fn decode_response(body: &[u8]) -> Result<(u64, Vec<u8>), FrameError> {
    let mut reader = WireReader::new(body);
    let token_id = reader.read_u64()?;
    let payload = reader.read_bytes()?.to_vec();
    reader.finish()?;
    Ok((token_id, payload))
}
