use crate::config::{NodeConfig, PeerSetting};
use crate::crypto::PublicKey;
use crate::identifier::Identifier;
use crate::keypair::Keypair;
use crate::networking::contact::Contact;
use crate::networking::network::{bind_socket, Network};
use crate::pseudonym::flood::{FloodPolicy, WindowFloodPolicy};
use crate::pseudonym::{AuthError, Pseudonym, PseudonymHandler, PSEUDONYM_CONSUMER};
use crate::routing::{RoutingTable, StaticRoutingTable};
use crate::store::{
    select_by_trust, DataResults, DistributedStore, LocalStore, MultiRecordStore, StoreError,
    StoreHandler, TrustWeights, STORE_CONSUMER,
};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{event, Level};

///
/// One overlay node: a socket, the store and the pseudonym service wired onto
/// it, and the routing table they consult.
///
/// Dropping a node stops its receive loop; `shutdown` also waits for it.
///
pub struct Node {
    config: NodeConfig,
    public_key: PublicKey,
    network: Arc<Network>,
    store: Arc<DistributedStore>,
    multi_record: MultiRecordStore,
    pseudonym: Arc<Pseudonym>,
    trust: TrustWeights,
}

/// Turn a configured peer into a contact on `network_tag`.
pub fn peer_contact(peer: &PeerSetting, network_tag: &str) -> crate::Result<Contact> {
    let identifier = Identifier::from_str(&peer.identifier)?;
    let address = peer.host.parse::<IpAddr>()?;
    Ok(Contact::new(identifier, network_tag, address, peer.port))
}

impl Node {
    ///
    /// Start a node from `config`: the key comes from `identity.secret_hex` or
    /// is generated, the routing table holds the configured peers, and
    /// challenges are limited by a sliding window.
    ///
    pub async fn start(config: NodeConfig) -> crate::Result<Node> {
        let keypair = config.keypair()?;
        let flood_policy = Arc::new(WindowFloodPolicy::new(
            config.flood_max,
            config.flood_window,
        ));
        let peers = config
            .peers
            .iter()
            .map(|peer| peer_contact(peer, &config.network_tag))
            .collect::<crate::Result<Vec<Contact>>>()?;
        let lookup_timeout = config.lookup_timeout;
        let replication = config.replication;

        Node::start_with(config, keypair, flood_policy, move |local_contact| {
            let routing = StaticRoutingTable::new(local_contact, lookup_timeout, replication);
            for peer in peers {
                routing.add_contact(peer);
            }
            Arc::new(routing) as Arc<dyn RoutingTable>
        })
        .await
    }

    /// Start a node with an explicit key, flood policy and routing table. The
    /// routing table is built once the local contact is known.
    pub async fn start_with<F>(
        config: NodeConfig,
        keypair: Keypair,
        flood_policy: Arc<dyn FloodPolicy>,
        routing: F,
    ) -> crate::Result<Node>
    where
        F: FnOnce(Contact) -> Arc<dyn RoutingTable>,
    {
        let identifier = keypair.identifier();
        let public_key = *keypair.public_key();
        let (socket, local_contact) =
            bind_socket(config.host, config.port, identifier, &config.network_tag).await?;
        let routing = routing(local_contact.clone());
        let network = Network::listen(socket, local_contact, routing, config.max_datagram);

        let store = Arc::new(DistributedStore::new(
            network.clone(),
            Arc::new(LocalStore::new()),
        ));
        network.register_consumer(STORE_CONSUMER, Arc::new(StoreHandler::new(store.clone())));

        let pseudonym = Arc::new(Pseudonym::new(network.clone(), flood_policy));
        pseudonym.add_identity(keypair);
        network.register_consumer(
            PSEUDONYM_CONSUMER,
            Arc::new(PseudonymHandler::new(pseudonym.clone())),
        );

        event!(
            Level::INFO,
            "node {:?} started on {}",
            identifier,
            network.local_contact()
        );
        Ok(Node {
            trust: config.trust_weights(),
            config,
            public_key,
            multi_record: MultiRecordStore::new(store.clone()),
            network,
            store,
            pseudonym,
        })
    }

    pub fn identifier(&self) -> Identifier {
        self.network.local_contact().identifier
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn local_contact(&self) -> &Contact {
        self.network.local_contact()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn routing(&self) -> &Arc<dyn RoutingTable> {
        self.network.routing()
    }

    pub fn store(&self) -> &Arc<DistributedStore> {
        &self.store
    }

    pub fn local_store(&self) -> &Arc<LocalStore> {
        self.store.local()
    }

    pub fn multi_record_store(&self) -> &MultiRecordStore {
        &self.multi_record
    }

    pub fn pseudonym(&self) -> &Arc<Pseudonym> {
        &self.pseudonym
    }

    pub fn trust(&self) -> &TrustWeights {
        &self.trust
    }

    pub fn get(&self, key: Identifier) -> DataResults {
        self.store.get(key)
    }

    pub async fn put(&self, key: Identifier, value: Vec<u8>) -> Result<(), StoreError> {
        self.store.put(key, Some(value)).await
    }

    pub async fn delete(&self, key: Identifier) -> Result<(), StoreError> {
        self.store.delete(key).await
    }

    /// Every answer for `key`, reduced to one value by trust weight.
    pub async fn resolve(&self, key: Identifier) -> Option<Vec<u8>> {
        let results = self.store.get(key).collect_all().await;
        select_by_trust(&results, &self.trust)
    }

    pub async fn ping(&self, contact: &Contact) -> bool {
        self.network
            .ping(contact, self.config.lookup_timeout)
            .await
    }

    /// Challenge with the configured nonce size and lookup timeout.
    pub async fn challenge(
        &self,
        peer: &Contact,
        identity: Identifier,
        public_key: &PublicKey,
    ) -> Result<bool, AuthError> {
        self.pseudonym
            .challenge(
                peer,
                identity,
                public_key,
                self.config.nonce_size,
                self.config.lookup_timeout,
            )
            .await
    }

    pub async fn send_secure_message(
        &self,
        destination: &Contact,
        consumer: &str,
        data: &[u8],
        public_key: &PublicKey,
    ) -> Result<(), AuthError> {
        self.pseudonym
            .send_secure_message(destination, consumer, data, public_key)
            .await
    }

    pub async fn shutdown(&self) {
        self.network.shutdown().await;
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.network.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_config() -> NodeConfig {
        NodeConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            lookup_timeout: Duration::from_millis(500),
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn node_starts_from_config_with_static_peers() {
        let first = Node::start(local_config()).await.unwrap();

        let mut config = local_config();
        config.secret_hex =
            Some(String::from("0202020202020202020202020202020202020202020202020202020202020202"));
        config.peers = vec![PeerSetting {
            identifier: first.identifier().to_hex(),
            host: String::from("127.0.0.1"),
            port: first.local_contact().port,
        }];
        let second = Node::start(config.clone()).await.unwrap();

        let expected = Keypair::from_secret_hex(config.secret_hex.as_ref().unwrap()).unwrap();
        assert_eq!(second.identifier(), expected.identifier());
        assert_ne!(second.local_contact().port, 0);
        assert!(second.ping(first.local_contact()).await);
        assert_eq!(second.pseudonym().identities(), vec![second.identifier()]);

        let key = Identifier::from_data(b"example.org");
        first.put(key, b"10.1.1.1".to_vec()).await.unwrap();
        assert_eq!(second.resolve(key).await, Some(b"10.1.1.1".to_vec()));

        first.shutdown().await;
        second.shutdown().await;
        assert!(!second.network().is_running());
    }

    #[tokio::test]
    async fn bad_peer_settings_are_rejected() {
        let mut config = local_config();
        config.peers = vec![PeerSetting {
            identifier: String::from("zz"),
            host: String::from("127.0.0.1"),
            port: 1,
        }];
        assert!(Node::start(config).await.is_err());
    }

    #[tokio::test]
    async fn node_answers_challenges_for_its_own_key() {
        let first = Node::start(local_config()).await.unwrap();
        let second = Node::start(local_config()).await.unwrap();
        let verified = first
            .challenge(
                second.local_contact(),
                second.identifier(),
                second.public_key(),
            )
            .await;
        assert_eq!(verified, Ok(true));
    }
}
