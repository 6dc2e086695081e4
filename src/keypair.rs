use crate::crypto::{generate_keys, open, seal, CryptoError};
use crate::identifier::Identifier;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use std::fmt;

/// An secp256k1 keypair. The public half names an identity, the secret half
/// opens payloads sealed for it.
#[derive(Debug, PartialEq)]
pub struct Keypair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Keypair {
    /// Create and return a keypair with a randomly generated private key.
    pub fn new() -> Keypair {
        let (public_key, secret_key) = generate_keys();
        Keypair {
            secret_key,
            public_key,
        }
    }

    /// Create and return a keypair with the given u8 array as the private key
    pub fn from_secret_slice(slice: &[u8]) -> Result<Keypair, CryptoError> {
        let secret_key = SecretKey::from_slice(slice).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public_key = PublicKey::from_secret_key(&SECP256K1, &secret_key);

        Ok(Keypair {
            secret_key,
            public_key,
        })
    }

    /// Create and return a keypair with the given hex string as the private key
    pub fn from_secret_hex(secret_hex: &str) -> Result<Keypair, CryptoError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(secret_hex, &mut bytes as &mut [u8])
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        Keypair::from_secret_slice(&bytes)
    }

    /// Get the public key of the keypair as secp256k1::key::PublicKey
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// The identity this keypair speaks for: SHA-512 of the compressed public key.
    pub fn identifier(&self) -> Identifier {
        identifier_for_public_key(&self.public_key)
    }

    /// Open a payload sealed for this keypair's public key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        open(sealed, &self.secret_key)
    }

    /// Seal a payload for this keypair's own public key.
    pub fn seal(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        seal(data, &self.public_key)
    }
}

impl Default for Keypair {
    fn default() -> Self {
        Keypair::new()
    }
}

pub fn identifier_for_public_key(public_key: &PublicKey) -> Identifier {
    Identifier::from_data(&public_key.serialize())
}

impl fmt::Display for Keypair {
    /// formats a Keypair for println!, the secret key stays out of it
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pubkey:{} identifier:{}",
            hex::encode(self.public_key.serialize()),
            self.identifier()
        )
    }
}
