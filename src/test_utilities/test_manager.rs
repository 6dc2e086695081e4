use crate::config::NodeConfig;
use crate::identifier::Identifier;
use crate::keypair::Keypair;
use crate::networking::contact::Contact;
use crate::node::Node;
use crate::pseudonym::flood::{FloodPolicy, NoFloodPolicy};
use crate::routing::{RoutingTable, StaticRoutingTable};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_LOOKUP_TIMEOUT: Duration = Duration::from_millis(1000);

///
/// A handful of nodes on 127.0.0.1, each with its own static routing table.
///
/// A fresh node only knows itself. `connect(a, b)` makes `b` one of the
/// contacts `a` considers for every key, so what each node sees is spelled out
/// by the test.
///
pub struct TestManager {
    nodes: Vec<Node>,
    routing_tables: Vec<Arc<StaticRoutingTable>>,
    lookup_timeout: Duration,
}

impl TestManager {
    pub async fn new(node_count: usize) -> Self {
        TestManager::with_timeout(node_count, TEST_LOOKUP_TIMEOUT).await
    }

    pub async fn with_timeout(node_count: usize, lookup_timeout: Duration) -> Self {
        let mut manager = TestManager {
            nodes: vec![],
            routing_tables: vec![],
            lookup_timeout,
        };
        for _ in 0..node_count {
            let (node, routing) = manager.start_node(Arc::new(NoFloodPolicy)).await;
            manager.nodes.push(node);
            manager.routing_tables.push(routing);
        }
        manager
    }

    pub fn config(&self) -> NodeConfig {
        NodeConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            lookup_timeout: self.lookup_timeout,
            ..NodeConfig::default()
        }
    }

    async fn start_node(&self, flood_policy: Arc<dyn FloodPolicy>) -> (Node, Arc<StaticRoutingTable>) {
        let lookup_timeout = self.lookup_timeout;
        let mut table: Option<Arc<StaticRoutingTable>> = None;
        let node = Node::start_with(self.config(), Keypair::new(), flood_policy, |local_contact| {
            let routing = Arc::new(StaticRoutingTable::new(local_contact, lookup_timeout, 20));
            table = Some(routing.clone());
            routing as Arc<dyn RoutingTable>
        })
        .await
        .unwrap();
        (node, table.unwrap())
    }

    /// A node outside the managed set, answering challenges under `flood_policy`.
    pub async fn spawn_node_with_flood_policy(&self, flood_policy: Arc<dyn FloodPolicy>) -> Node {
        self.start_node(flood_policy).await.0
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn routing(&self, index: usize) -> &Arc<StaticRoutingTable> {
        &self.routing_tables[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `from` will consider `to` a candidate for every key.
    pub fn connect(&self, from: usize, to: usize) {
        let contact = self.nodes[to].local_contact().clone();
        self.routing_tables[from].add_contact(contact);
    }

    pub fn connect_all(&self) {
        for from in 0..self.nodes.len() {
            for to in 0..self.nodes.len() {
                if from != to {
                    self.connect(from, to);
                }
            }
        }
    }

    ///
    /// A random key whose XOR distance to the listed nodes strictly increases
    /// in the order given, so `key_ordered(&[1, 0])` is closer to node 1.
    ///
    pub fn key_ordered(&self, order: &[usize]) -> Identifier {
        loop {
            let key = Identifier::random();
            let ordered = order.windows(2).all(|pair| {
                let near = self.nodes[pair[0]].identifier().distance(&key);
                let far = self.nodes[pair[1]].identifier().distance(&key);
                near < far
            });
            if ordered {
                return key;
            }
        }
    }

    /// Give node `index` a candidate nobody listens for.
    pub fn add_unreachable(&self, index: usize, port: u16) -> Contact {
        let contact = Contact::new(
            Identifier::random(),
            &self.nodes[index].local_contact().network_tag,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        );
        self.routing_tables[index].add_contact(contact.clone());
        contact
    }

    pub async fn shutdown(&self) {
        for node in self.nodes.iter() {
            node.shutdown().await;
        }
    }
}
