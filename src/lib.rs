/*!
# Overlay

Overlay is a peer-to-peer node which keeps a replicated key-value store on top of
plain UDP datagrams. A DNS resolver sits above it and answers queries by asking the
peers closest to a name, weighting their answers by how much it trusts them.

This crate holds the node-to-node layer:

* a fixed binary wire format for every datagram (`networking::packet`)
* one UDP socket per process with a single receive loop (`networking::network`)
* call tokens which match responses to the request that is waiting on them
  (`networking::callback`)
* the replicated put/get store with cached and authoritative tiers (`store`)
* challenge-response proof of key ownership and sealed messages between
  identities (`pseudonym`)

The routing table which decides which contacts are closest to a key lives outside
this crate. It is consumed through the `routing::RoutingTable` trait.

# Usage

```bash
overlay_rust --config config
overlaycli keys
overlaycli ping --host 127.0.0.1 --port 5353
```
*/
pub mod config;
pub mod crypto;
pub mod identifier;
pub mod keypair;
pub mod networking;
pub mod node;
pub mod pseudonym;
pub mod routing;
pub mod store;
pub mod test_utilities;
pub mod time;

mod test_setup;

pub use identifier::Identifier;
pub use node::Node;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
