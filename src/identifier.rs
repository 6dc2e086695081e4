use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

use rand::RngCore;

use crate::crypto::hash;

pub const IDENTIFIER_SIZE: usize = 64;

/// A 512-bit opaque value. Names nodes and identities, and doubles as the key
/// for stored data. Compared by value only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; IDENTIFIER_SIZE]);

impl Identifier {
    pub fn new(bytes: [u8; IDENTIFIER_SIZE]) -> Self {
        Identifier(bytes)
    }

    /// Identifier derived from arbitrary data, e.g. a domain name or a public key.
    pub fn from_data(data: &[u8]) -> Self {
        Identifier(hash(data))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; IDENTIFIER_SIZE] = bytes.try_into().ok()?;
        Some(Identifier(array))
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; IDENTIFIER_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Identifier(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_SIZE] {
        &self.0
    }

    /// XOR distance between two identifiers. Smaller is closer when compared
    /// with `Ord`, which is big-endian over the bytes.
    pub fn distance(&self, other: &Identifier) -> Identifier {
        let mut out = [0u8; IDENTIFIER_SIZE];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Identifier(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Identifier {
    /// First eight bytes only, full identifiers drown the logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}..)", hex::encode(&self.0[..8]))
    }
}

impl FromStr for Identifier {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; IDENTIFIER_SIZE];
        hex::decode_to_slice(s, &mut bytes as &mut [u8])?;
        Ok(Identifier(bytes))
    }
}
