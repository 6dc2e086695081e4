//! Pseudonymous identities.
//!
//! An identity is a secp256k1 keypair named by the SHA-512 of its public key.
//! A node may speak for any number of them. Two things happen over the
//! `pseudonym` consumer:
//!
//! * a challenge: the challenger seals a random nonce for the public key it
//!   believes an identity has, and the peer proves it holds the secret key by
//!   sending the nonce back in the clear.
//! * a secure message: a payload sealed for an identity, which the receiving
//!   node opens and hands to one of its local consumers.

pub mod flood;

use crate::crypto::{seal, CryptoError, PublicKey};
use crate::identifier::Identifier;
use crate::keypair::{identifier_for_public_key, Keypair};
use crate::networking::callback::CALLBACK_CONSUMER;
use crate::networking::contact::Contact;
use crate::networking::message_types::pseudonym_message::{ChallengeResponse, PseudonymRequest};
use crate::networking::network::{Delivery, Network, PacketHandler};
use ahash::AHashMap;
use flood::FloodPolicy;
use parking_lot::RwLock;
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, event, warn, Level};

pub const PSEUDONYM_CONSUMER: &str = "pseudonym";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("peer is shedding challenges, retry in {backoff:?}")]
    Flood { backoff: Duration },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("message could not be sent")]
    Send,
}

/// What the challenger remembers while it waits.
struct ChallengeRecord {
    nonce: Vec<u8>,
    identity: Identifier,
    deadline: Instant,
}

impl ChallengeRecord {
    fn issue(identity: Identifier, nonce_size: usize, timeout: Duration) -> Self {
        let mut nonce = vec![0u8; nonce_size];
        rand::thread_rng().fill_bytes(&mut nonce);
        ChallengeRecord {
            nonce,
            identity,
            deadline: Instant::now() + timeout,
        }
    }

    fn verify(&self, answer: &[u8]) -> bool {
        self.nonce.as_slice() == answer
    }
}

pub struct Pseudonym {
    network: Arc<Network>,
    identities: RwLock<AHashMap<Identifier, Arc<Keypair>>>,
    flood_policy: Arc<dyn FloodPolicy>,
}

impl Pseudonym {
    pub fn new(network: Arc<Network>, flood_policy: Arc<dyn FloodPolicy>) -> Self {
        Pseudonym {
            network,
            identities: RwLock::new(AHashMap::new()),
            flood_policy,
        }
    }

    /// Answer challenges and open messages for `keypair` from now on.
    pub fn add_identity(&self, keypair: Keypair) -> Identifier {
        let identifier = keypair.identifier();
        self.identities.write().insert(identifier, Arc::new(keypair));
        event!(Level::INFO, "speaking for identity {:?}", identifier);
        identifier
    }

    pub fn remove_identity(&self, identifier: &Identifier) -> bool {
        self.identities.write().remove(identifier).is_some()
    }

    pub fn identity(&self, identifier: &Identifier) -> Option<Arc<Keypair>> {
        self.identities.read().get(identifier).cloned()
    }

    pub fn identities(&self) -> Vec<Identifier> {
        self.identities.read().keys().copied().collect()
    }

    ///
    /// Ask `peer` to prove it holds the secret key of `public_key` for
    /// `identity`.
    ///
    /// `Ok(true)` only when the peer returns the exact nonce. A peer that does
    /// not answer in time, answers for an unknown identity, cannot decrypt, or
    /// returns anything else yields `Ok(false)`. A peer shedding load yields
    /// `AuthError::Flood` with the backoff it asked for; nothing is retried.
    ///
    pub async fn challenge(
        &self,
        peer: &Contact,
        identity: Identifier,
        public_key: &PublicKey,
        nonce_size: usize,
        timeout: Duration,
    ) -> Result<bool, AuthError> {
        let record = ChallengeRecord::issue(identity, nonce_size, timeout);
        let sealed_nonce = seal(&record.nonce, public_key)?;

        let response = self
            .network
            .request(peer, PSEUDONYM_CONSUMER, timeout, |token_id| {
                PseudonymRequest::Challenge {
                    token_id,
                    identity: record.identity,
                    sealed_nonce,
                }
                .serialize()
            })
            .await;
        let response = match response {
            Some(response) => response,
            None => {
                debug!(
                    "challenge for {:?} to {} timed out",
                    record.identity, peer
                );
                return Ok(false);
            }
        };
        if Instant::now() > record.deadline {
            return Ok(false);
        }

        match ChallengeResponse::deserialize(&response.payload) {
            Ok(ChallengeResponse::Answer(answer)) => Ok(record.verify(&answer)),
            Ok(ChallengeResponse::Flooded { backoff }) => Err(AuthError::Flood { backoff }),
            Ok(ChallengeResponse::UnknownIdentity) => {
                debug!("{} does not speak for {:?}", peer, record.identity);
                Ok(false)
            }
            Ok(ChallengeResponse::Undecryptable) => Ok(false),
            Err(err) => {
                warn!("malformed challenge response from {}: {}", peer, err);
                Ok(false)
            }
        }
    }

    ///
    /// Seal `data` for the owner of `public_key` and send it to `destination`,
    /// which delivers the plaintext to its local `consumer`.
    ///
    pub async fn send_secure_message(
        &self,
        destination: &Contact,
        consumer: &str,
        data: &[u8],
        public_key: &PublicKey,
    ) -> Result<(), AuthError> {
        let request = PseudonymRequest::SecureMessage {
            identity: identifier_for_public_key(public_key),
            consumer: consumer.to_string(),
            sealed_data: seal(data, public_key)?,
        };
        if self
            .network
            .send_data(destination, PSEUDONYM_CONSUMER, request.serialize())
            .await
        {
            Ok(())
        } else {
            Err(AuthError::Send)
        }
    }

    /// The responder's side of a challenge. Flood control counts by the
    /// address the challenge arrived from.
    pub fn answer_challenge(
        &self,
        sender: &Contact,
        source: &SocketAddr,
        identity: &Identifier,
        sealed_nonce: &[u8],
    ) -> ChallengeResponse {
        if let Err(backoff) = self.flood_policy.check(&source.ip()) {
            debug!("flooded by {} from {}, backing off {:?}", sender, source, backoff);
            return ChallengeResponse::Flooded { backoff };
        }
        let keypair = match self.identity(identity) {
            Some(keypair) => keypair,
            None => return ChallengeResponse::UnknownIdentity,
        };
        match keypair.open(sealed_nonce) {
            Ok(nonce) => ChallengeResponse::Answer(nonce),
            Err(err) => {
                debug!("cannot open challenge from {}: {}", sender, err);
                ChallengeResponse::Undecryptable
            }
        }
    }

    /// Open a secure message and hand it to its local consumer.
    pub fn deliver_secure_message(
        &self,
        sender: Contact,
        source: SocketAddr,
        identity: &Identifier,
        consumer: String,
        sealed_data: &[u8],
    ) -> bool {
        if consumer == PSEUDONYM_CONSUMER || consumer == CALLBACK_CONSUMER {
            debug!("refusing secure message for reserved consumer {:?}", consumer);
            return false;
        }
        let keypair = match self.identity(identity) {
            Some(keypair) => keypair,
            None => {
                debug!("secure message for unknown identity {:?}", identity);
                return false;
            }
        };
        let body = match keypair.open(sealed_data) {
            Ok(body) => body,
            Err(err) => {
                warn!("cannot open secure message from {}: {}", sender, err);
                return false;
            }
        };
        self.network.dispatch_local(Delivery {
            sender,
            source,
            consumer,
            body,
        })
    }
}

/// The `pseudonym` consumer. Decryption runs off the receive loop.
pub struct PseudonymHandler {
    service: Arc<Pseudonym>,
}

impl PseudonymHandler {
    pub fn new(service: Arc<Pseudonym>) -> Self {
        PseudonymHandler { service }
    }
}

impl PacketHandler for PseudonymHandler {
    fn handle(&self, delivery: Delivery) {
        let request = match PseudonymRequest::deserialize(&delivery.body) {
            Ok(request) => request,
            Err(err) => {
                debug!("dropping pseudonym request from {}: {}", delivery.sender, err);
                return;
            }
        };
        let service = self.service.clone();
        tokio::spawn(async move {
            match request {
                PseudonymRequest::Challenge {
                    token_id,
                    identity,
                    sealed_nonce,
                } => {
                    let response = service.answer_challenge(
                        &delivery.sender,
                        &delivery.source,
                        &identity,
                        &sealed_nonce,
                    );
                    service
                        .network
                        .send_response(&delivery.sender, token_id, &response.serialize())
                        .await;
                }
                PseudonymRequest::SecureMessage {
                    identity,
                    consumer,
                    sealed_data,
                } => {
                    service.deliver_secure_message(
                        delivery.sender,
                        delivery.source,
                        &identity,
                        consumer,
                        &sealed_data,
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utilities::test_manager::TestManager;
    use flood::{AlwaysFlooded, WindowFloodPolicy};
    use tokio::sync::mpsc;

    struct ChannelHandler {
        sender: mpsc::UnboundedSender<Delivery>,
    }

    impl PacketHandler for ChannelHandler {
        fn handle(&self, delivery: Delivery) {
            let _ = self.sender.send(delivery);
        }
    }

    /// Answers challenges like a key holder would, then damages the nonce.
    struct TamperingResponder {
        network: Arc<Network>,
        keypair: Arc<Keypair>,
        tamper: fn(&mut Vec<u8>),
    }

    impl PacketHandler for TamperingResponder {
        fn handle(&self, delivery: Delivery) {
            let (token_id, sealed_nonce) = match PseudonymRequest::deserialize(&delivery.body) {
                Ok(PseudonymRequest::Challenge {
                    token_id,
                    sealed_nonce,
                    ..
                }) => (token_id, sealed_nonce),
                _ => return,
            };
            let mut nonce = self.keypair.open(&sealed_nonce).unwrap();
            (self.tamper)(&mut nonce);
            let network = self.network.clone();
            tokio::spawn(async move {
                let payload = ChallengeResponse::Answer(nonce).serialize();
                network
                    .send_response(&delivery.sender, token_id, &payload)
                    .await;
            });
        }
    }

    #[test]
    fn verify_rejects_any_corruption() {
        let record = ChallengeRecord::issue(Identifier::random(), 32, Duration::from_secs(1));
        assert!(record.verify(&record.nonce));

        for byte in 0..record.nonce.len() {
            for bit in 0..8 {
                let mut answer = record.nonce.clone();
                answer[byte] ^= 1 << bit;
                assert!(!record.verify(&answer), "byte {} bit {}", byte, bit);
            }
        }
        assert!(!record.verify(&record.nonce[..record.nonce.len() - 1]));
        assert!(!record.verify(&record.nonce[1..]));
        let mut extended = record.nonce.clone();
        extended.push(0);
        assert!(!record.verify(&extended));
        assert!(!record.verify(&[]));
    }

    #[tokio::test]
    async fn tampered_answers_are_unverified() {
        let manager = TestManager::new(2).await;
        let keypair = Arc::new(Keypair::new());
        let public_key = *keypair.public_key();
        let identity = keypair.identifier();
        let responder = manager.node(1);
        let peer = responder.local_contact().clone();
        let challenger = manager.node(0).pseudonym();

        let tampers: [fn(&mut Vec<u8>); 4] = [
            |nonce| nonce[0] ^= 0x01,
            |nonce| *nonce.last_mut().unwrap() ^= 0x80,
            |nonce| {
                nonce.pop();
            },
            |nonce| nonce.push(0),
        ];
        for tamper in tampers {
            responder.network().register_consumer(
                PSEUDONYM_CONSUMER,
                Arc::new(TamperingResponder {
                    network: responder.network().clone(),
                    keypair: keypair.clone(),
                    tamper,
                }),
            );
            assert_eq!(
                challenger
                    .challenge(&peer, identity, &public_key, 32, Duration::from_secs(2))
                    .await,
                Ok(false)
            );
        }

        // the same responder without damage is believed
        responder.network().register_consumer(
            PSEUDONYM_CONSUMER,
            Arc::new(TamperingResponder {
                network: responder.network().clone(),
                keypair,
                tamper: |_| {},
            }),
        );
        assert_eq!(
            challenger
                .challenge(&peer, identity, &public_key, 32, Duration::from_secs(2))
                .await,
            Ok(true)
        );

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn changing_identity_does_not_reset_the_flood_window() {
        let manager = TestManager::new(0).await;
        let node = manager
            .spawn_node_with_flood_policy(Arc::new(WindowFloodPolicy::new(
                1,
                Duration::from_secs(10),
            )))
            .await;
        let keypair = Keypair::new();
        let sealed = keypair.seal(b"nonce").unwrap();
        let identity = node.pseudonym().add_identity(keypair);
        let source: SocketAddr = "10.0.0.9:4000".parse().unwrap();

        let first = Contact::new(Identifier::random(), "overlay", source.ip(), 4000);
        let second = Contact::new(Identifier::random(), "overlay", source.ip(), 4001);
        assert_eq!(
            node.pseudonym()
                .answer_challenge(&first, &source, &identity, &sealed),
            ChallengeResponse::Answer(b"nonce".to_vec())
        );
        match node
            .pseudonym()
            .answer_challenge(&second, &source, &identity, &sealed)
        {
            ChallengeResponse::Flooded { backoff } => {
                assert!(backoff <= Duration::from_secs(10))
            }
            other => panic!("expected a flood response, got {:?}", other),
        }
        // another address has its own window
        let elsewhere: SocketAddr = "10.0.0.10:4000".parse().unwrap();
        assert_eq!(
            node.pseudonym()
                .answer_challenge(&second, &elsewhere, &identity, &sealed),
            ChallengeResponse::Answer(b"nonce".to_vec())
        );

        node.shutdown().await;
    }

    #[tokio::test]
    async fn challenge_verifies_key_holder() {
        let manager = TestManager::new(2).await;
        let keypair = Keypair::new();
        let public_key = *keypair.public_key();
        let identity = manager.node(1).pseudonym().add_identity(keypair);
        let peer = manager.node(1).local_contact().clone();
        let timeout = Duration::from_secs(2);

        let challenger = manager.node(0).pseudonym();
        assert_eq!(
            challenger
                .challenge(&peer, identity, &public_key, 32, timeout)
                .await,
            Ok(true)
        );
        assert_eq!(
            challenger
                .challenge(&peer, identity, &public_key, 0, timeout)
                .await,
            Ok(true)
        );

        // a key the peer does not hold
        let impostor = *Keypair::new().public_key();
        assert_eq!(
            challenger
                .challenge(&peer, identity, &impostor, 32, timeout)
                .await,
            Ok(false)
        );
        // an identity the peer does not speak for
        assert_eq!(
            challenger
                .challenge(&peer, Identifier::random(), &public_key, 32, timeout)
                .await,
            Ok(false)
        );

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn flooded_peer_reports_its_backoff() {
        let manager = TestManager::new(1).await;
        let flooded = manager
            .spawn_node_with_flood_policy(Arc::new(AlwaysFlooded::new(Duration::from_secs(2))))
            .await;
        let keypair = Keypair::new();
        let public_key = *keypair.public_key();
        let identity = flooded.pseudonym().add_identity(keypair);

        let result = manager
            .node(0)
            .pseudonym()
            .challenge(
                flooded.local_contact(),
                identity,
                &public_key,
                32,
                Duration::from_secs(2),
            )
            .await;
        assert_eq!(
            result,
            Err(AuthError::Flood {
                backoff: Duration::from_secs(2)
            })
        );

        flooded.shutdown().await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn unanswered_challenge_is_unverified() {
        let manager = TestManager::new(1).await;
        let nobody = Contact::new(
            Identifier::random(),
            manager.node(0).local_contact().network_tag.as_str(),
            "127.0.0.1".parse().unwrap(),
            9,
        );
        let keypair = Keypair::new();
        let result = manager
            .node(0)
            .pseudonym()
            .challenge(
                &nobody,
                keypair.identifier(),
                keypair.public_key(),
                32,
                Duration::from_millis(100),
            )
            .await;
        assert_eq!(result, Ok(false));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn secure_messages_reach_the_named_consumer() {
        let manager = TestManager::new(2).await;
        let keypair = Keypair::new();
        let public_key = *keypair.public_key();
        manager.node(1).pseudonym().add_identity(keypair);
        let (sender, mut receiver) = mpsc::unbounded_channel();
        manager
            .node(1)
            .network()
            .register_consumer("dns", Arc::new(ChannelHandler { sender }));

        let destination = manager.node(1).local_contact().clone();
        for size in [0usize, 1, 3000] {
            let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
            manager
                .node(0)
                .pseudonym()
                .send_secure_message(&destination, "dns", &data, &public_key)
                .await
                .unwrap();
            let delivery = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(delivery.body, data);
            assert_eq!(delivery.consumer, "dns");
            assert_eq!(&delivery.sender, manager.node(0).local_contact());
        }

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn reserved_consumers_are_not_reachable_through_secure_messages() {
        let manager = TestManager::new(1).await;
        let keypair = Keypair::new();
        let identity = keypair.identifier();
        let sealed = keypair.seal(b"payload").unwrap();
        let service = manager.node(0).pseudonym();
        service.add_identity(keypair);

        let sender = manager.node(0).local_contact().clone();
        let source = sender.socket_addr();
        assert!(!service.deliver_secure_message(
            sender.clone(),
            source,
            &identity,
            CALLBACK_CONSUMER.to_string(),
            &sealed
        ));
        assert!(!service.deliver_secure_message(
            sender,
            source,
            &Identifier::random(),
            String::from("dns"),
            &sealed
        ));
        manager.shutdown().await;
    }
}
