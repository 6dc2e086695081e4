use crate::identifier::Identifier;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

/// How a contact is reached. Datagrams over UDP are the only transport today,
/// but contacts carry the variant so a second transport can be added without
/// touching every call site.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
}

/// A peer as seen from this node: who it is, where it listens, and which
/// overlay network it belongs to.
///
/// Contacts are plain values. Two contacts are equal when identifier, endpoint
/// and network tag match. The transport variant does not take part, and a
/// contact never owns a socket.
#[derive(Debug, Clone)]
pub struct Contact {
    pub identifier: Identifier,
    pub network_tag: String,
    pub address: IpAddr,
    pub port: u16,
    pub transport: TransportKind,
}

impl Contact {
    pub fn new(identifier: Identifier, network_tag: &str, address: IpAddr, port: u16) -> Self {
        Contact {
            identifier,
            network_tag: network_tag.to_string(),
            address,
            port,
            transport: TransportKind::Udp,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn is_same_network(&self, other: &Contact) -> bool {
        self.network_tag == other.network_tag
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.address == other.address
            && self.port == other.port
            && self.network_tag == other.network_tag
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
        self.address.hash(state);
        self.port.hash(state);
        self.network_tag.hash(state);
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}@{}[{}]",
            self.identifier,
            self.socket_addr(),
            self.network_tag
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn contact_equality_test() {
        let id = Identifier::random();
        let a = Contact::new(id, "overlay", "127.0.0.1".parse().unwrap(), 5353);
        let b = Contact::new(id, "overlay", "127.0.0.1".parse().unwrap(), 5353);
        let other_port = Contact::new(id, "overlay", "127.0.0.1".parse().unwrap(), 5354);
        let other_net = Contact::new(id, "testnet", "127.0.0.1".parse().unwrap(), 5353);

        assert_eq!(a, b);
        assert_ne!(a, other_port);
        assert_ne!(a, other_net);
        assert!(!a.is_same_network(&other_net));

        let set: HashSet<Contact> = vec![a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(a.socket_addr(), "127.0.0.1:5353".parse().unwrap());
    }
}
