use crate::keypair::Keypair;
use crate::networking::network::MAX_DATAGRAM_SIZE;
use crate::store::TrustWeights;
use config::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// A statically configured peer, `[[network.peers]]` in the config file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PeerSetting {
    pub identifier: String,
    pub host: String,
    pub port: u16,
}

///
/// Everything a node needs to start. `NodeConfig::default()` matches the
/// defaults applied to a config file, so tests can start nodes without one.
///
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: IpAddr,
    pub port: u16,
    pub network_tag: String,
    pub lookup_timeout: Duration,
    pub max_datagram: usize,
    pub replication: usize,
    pub peers: Vec<PeerSetting>,
    pub nonce_size: usize,
    pub flood_max: usize,
    pub flood_window: Duration,
    pub secret_hex: Option<String>,
    pub trust: HashMap<String, f64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5353,
            network_tag: String::from("overlay"),
            lookup_timeout: Duration::from_millis(2000),
            max_datagram: MAX_DATAGRAM_SIZE,
            replication: 8,
            peers: vec![],
            nonce_size: 32,
            flood_max: 16,
            flood_window: Duration::from_millis(10000),
            secret_hex: None,
            trust: HashMap::new(),
        }
    }
}

impl NodeConfig {
    /// Read `config_name` (any extension the config crate understands) on top
    /// of the defaults.
    pub fn load(config_name: &str) -> crate::Result<NodeConfig> {
        let mut settings = NodeConfig::default_settings()?;
        settings.merge(config::File::with_name(config_name))?;
        NodeConfig::from_settings(&settings)
    }

    pub fn default_settings() -> crate::Result<Config> {
        let mut settings = Config::default();
        settings
            .set_default("network.host", "0.0.0.0")?
            .set_default("network.port", 5353i64)?
            .set_default("network.tag", "overlay")?
            .set_default("network.lookup_timeout_ms", 2000i64)?
            .set_default("network.max_datagram", MAX_DATAGRAM_SIZE as i64)?
            .set_default("network.replication", 8i64)?
            .set_default("pseudonym.nonce_size", 32i64)?
            .set_default("pseudonym.flood_max", 16i64)?
            .set_default("pseudonym.flood_window_ms", 10000i64)?;
        Ok(settings)
    }

    pub fn from_settings(settings: &Config) -> crate::Result<NodeConfig> {
        let host: IpAddr = settings.get::<String>("network.host")?.parse()?;
        let peers = match settings.get::<Vec<PeerSetting>>("network.peers") {
            Ok(peers) => peers,
            Err(_) => vec![],
        };
        let trust = match settings.get::<HashMap<String, f64>>("trust") {
            Ok(trust) => trust,
            Err(_) => HashMap::new(),
        };

        Ok(NodeConfig {
            host,
            port: settings.get::<u16>("network.port")?,
            network_tag: settings.get::<String>("network.tag")?,
            lookup_timeout: Duration::from_millis(settings.get::<u64>("network.lookup_timeout_ms")?),
            max_datagram: settings.get::<usize>("network.max_datagram")?,
            replication: settings.get::<usize>("network.replication")?,
            peers,
            nonce_size: settings.get::<usize>("pseudonym.nonce_size")?,
            flood_max: settings.get::<usize>("pseudonym.flood_max")?,
            flood_window: Duration::from_millis(settings.get::<u64>("pseudonym.flood_window_ms")?),
            secret_hex: settings.get::<String>("identity.secret_hex").ok(),
            trust,
        })
    }

    /// The node key from `identity.secret_hex`, or a fresh one.
    pub fn keypair(&self) -> crate::Result<Keypair> {
        match &self.secret_hex {
            Some(secret_hex) => Ok(Keypair::from_secret_hex(secret_hex)?),
            None => Ok(Keypair::new()),
        }
    }

    pub fn trust_weights(&self) -> TrustWeights {
        TrustWeights::from_hex_map(&self.trust)
    }
}
