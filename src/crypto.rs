use std::convert::TryInto;

use aes::Aes256;
use block_modes::block_padding::Pkcs7;
use block_modes::{BlockMode, Cbc};
use rand::RngCore;
use ring::{digest, hmac};
pub use secp256k1::{PublicKey, SecretKey};
use secp256k1::{ecdh::SharedSecret, SECP256K1};
use thiserror::Error;

// create an alias for convenience
type Aes256Cbc = Cbc<Aes256, Pkcs7>;

pub type OverlayHash = [u8; 64];

pub const PUBLIC_KEY_SIZE: usize = 33;
/// Plaintext bytes per sealed segment.
pub const SEGMENT_SIZE: usize = 1024;

const IV_SIZE: usize = 16;
const TAG_SIZE: usize = 32;
const SEAL_CONTEXT: &[u8] = b"overlay-seal-v1";
// iv + length + one padded block + tag
const MIN_SEGMENT_SIZE: usize = IV_SIZE + 4 + 16 + TAG_SIZE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("malformed sealed payload")]
    Malformed,
    #[error("sealed payload failed authentication")]
    Authentication,
    #[error("cipher failure")]
    Cipher,
}

/// SHA-512. The width matches `Identifier`.
pub fn hash(data: &[u8]) -> OverlayHash {
    let mut out = [0u8; 64];
    out.copy_from_slice(digest::digest(&digest::SHA512, data).as_ref());
    out
}

/// Create a fresh secp256k1 keypair.
pub fn generate_keys() -> (PublicKey, SecretKey) {
    let secret_key = generate_secret_key();
    let public_key = PublicKey::from_secret_key(&SECP256K1, &secret_key);
    (public_key, secret_key)
}

fn generate_secret_key() -> SecretKey {
    let mut bytes = [0u8; 32];
    loop {
        rand::thread_rng().fill_bytes(&mut bytes);
        // out-of-range scalars are astronomically rare, just draw again
        if let Ok(secret_key) = SecretKey::from_slice(&bytes) {
            return secret_key;
        }
    }
}

pub fn public_key_from_slice(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    PublicKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

struct SealKeys {
    encryption_key: [u8; 32],
    mac_key: hmac::Key,
}

fn derive_seal_keys(shared: &SharedSecret, ephemeral: &PublicKey) -> SealKeys {
    let mut material = Vec::with_capacity(SEAL_CONTEXT.len() + 32 + PUBLIC_KEY_SIZE);
    material.extend(SEAL_CONTEXT);
    material.extend(shared.as_ref());
    material.extend(&ephemeral.serialize());
    let okm = hash(&material);
    let mut encryption_key = [0u8; 32];
    encryption_key.copy_from_slice(&okm[..32]);
    SealKeys {
        encryption_key,
        mac_key: hmac::Key::new(hmac::HMAC_SHA256, &okm[32..]),
    }
}

fn segment_mac_input(index: u32, is_final: bool, iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut vbytes: Vec<u8> = Vec::with_capacity(5 + iv.len() + ciphertext.len());
    vbytes.extend(&index.to_be_bytes());
    vbytes.push(is_final as u8);
    vbytes.extend(iv);
    vbytes.extend(ciphertext);
    vbytes
}

///
/// Encrypt `data` so only the holder of the secret key behind `recipient` can
/// read it.
///
/// An ephemeral key agrees a secret with the recipient (ECDH), SHA-512 of that
/// secret gives an AES-256 key and an HMAC-SHA256 key. The plaintext is cut
/// into `SEGMENT_SIZE` pieces, each encrypted with its own IV and then MACed
/// together with its index and a final-segment flag, so segments cannot be
/// dropped, reordered or truncated. There is always at least one segment,
/// which makes the empty payload authenticated too.
///
/// ```bytes
/// 0-32    ephemeral public key (compressed)
/// 33-36   segment count (big-endian u32)
/// then per segment:
///         iv(16) ciphertext length(u32) ciphertext tag(32)
/// ```
///
pub fn seal(data: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let (ephemeral_public, ephemeral_secret) = generate_keys();
    let shared = SharedSecret::new(recipient, &ephemeral_secret);
    let keys = derive_seal_keys(&shared, &ephemeral_public);

    let segments: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(SEGMENT_SIZE).collect()
    };
    let segment_count: u32 = segments
        .len()
        .try_into()
        .map_err(|_| CryptoError::Malformed)?;

    let mut vbytes: Vec<u8> = vec![];
    vbytes.extend(&ephemeral_public.serialize());
    vbytes.extend(&segment_count.to_be_bytes());

    for (index, segment) in segments.iter().enumerate() {
        let index = index as u32;
        let is_final = index + 1 == segment_count;
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let cipher = Aes256Cbc::new_from_slices(&keys.encryption_key, &iv)
            .map_err(|_| CryptoError::Cipher)?;
        let ciphertext = cipher.encrypt_vec(segment);
        let tag = hmac::sign(
            &keys.mac_key,
            &segment_mac_input(index, is_final, &iv, &ciphertext),
        );

        vbytes.extend(&iv);
        vbytes.extend(&(ciphertext.len() as u32).to_be_bytes());
        vbytes.extend(&ciphertext);
        vbytes.extend(tag.as_ref());
    }
    Ok(vbytes)
}

/// Reverse of `seal`. Every segment is authenticated before it is decrypted.
pub fn open(sealed: &[u8], secret_key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < PUBLIC_KEY_SIZE + 4 {
        return Err(CryptoError::Malformed);
    }
    let ephemeral_public = PublicKey::from_slice(&sealed[..PUBLIC_KEY_SIZE])
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let segment_count = read_u32(sealed, PUBLIC_KEY_SIZE)?;
    let mut offset = PUBLIC_KEY_SIZE + 4;

    // a forged count must not make us reserve memory for segments that cannot exist
    let remaining = sealed.len() - offset;
    if segment_count == 0 || (segment_count as usize) > remaining / MIN_SEGMENT_SIZE {
        return Err(CryptoError::Malformed);
    }

    let shared = SharedSecret::new(&ephemeral_public, secret_key);
    let keys = derive_seal_keys(&shared, &ephemeral_public);

    let mut plaintext: Vec<u8> = Vec::with_capacity(remaining);
    for index in 0..segment_count {
        let is_final = index + 1 == segment_count;
        let iv = take(sealed, offset, IV_SIZE)?;
        offset += IV_SIZE;
        let ciphertext_len = read_u32(sealed, offset)? as usize;
        offset += 4;
        let ciphertext = take(sealed, offset, ciphertext_len)?;
        offset += ciphertext_len;
        let tag = take(sealed, offset, TAG_SIZE)?;
        offset += TAG_SIZE;

        hmac::verify(
            &keys.mac_key,
            &segment_mac_input(index, is_final, iv, ciphertext),
            tag,
        )
        .map_err(|_| CryptoError::Authentication)?;

        let cipher = Aes256Cbc::new_from_slices(&keys.encryption_key, iv)
            .map_err(|_| CryptoError::Cipher)?;
        let segment = cipher
            .decrypt_vec(ciphertext)
            .map_err(|_| CryptoError::Cipher)?;
        plaintext.extend(segment);
    }
    if offset != sealed.len() {
        return Err(CryptoError::Malformed);
    }
    Ok(plaintext)
}

fn take(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], CryptoError> {
    let end = offset.checked_add(len).ok_or(CryptoError::Malformed)?;
    bytes.get(offset..end).ok_or(CryptoError::Malformed)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, CryptoError> {
    let raw: [u8; 4] = take(bytes, offset, 4)?
        .try_into()
        .map_err(|_| CryptoError::Malformed)?;
    Ok(u32::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha512() {
        let digest = hash(b"abc");
        assert_eq!(
            hex::encode(&digest[..8]),
            "ddaf35a193617aba",
        );
    }

    #[test]
    fn seal_round_trip_sizes() {
        let (public_key, secret_key) = generate_keys();
        for size in [0usize, 1, 15, 16, SEGMENT_SIZE, SEGMENT_SIZE + 1, 5 * SEGMENT_SIZE + 7] {
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let sealed = seal(&data, &public_key).unwrap();
            assert_eq!(open(&sealed, &secret_key).unwrap(), data, "size {}", size);
        }
    }

    #[test]
    fn seal_with_wrong_key_fails() {
        let (public_key, _secret_key) = generate_keys();
        let (_other_public, other_secret) = generate_keys();
        let sealed = seal(b"hello", &public_key).unwrap();
        assert_eq!(open(&sealed, &other_secret), Err(CryptoError::Authentication));
    }

    #[test]
    fn tampered_segment_is_rejected() {
        let (public_key, secret_key) = generate_keys();
        let mut sealed = seal(b"hello world", &public_key).unwrap();
        let last = sealed.len() - TAG_SIZE - 1;
        sealed[last] ^= 0x01;
        assert_eq!(open(&sealed, &secret_key), Err(CryptoError::Authentication));
    }

    #[test]
    fn truncated_segments_are_rejected() {
        let (public_key, secret_key) = generate_keys();
        let data = vec![9u8; 3 * SEGMENT_SIZE];
        let sealed = seal(&data, &public_key).unwrap();

        // claim two segments and drop the third: segment 1 was not sealed as final
        let mut truncated = sealed.clone();
        truncated[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + 4].copy_from_slice(&2u32.to_be_bytes());
        let segment_len = IV_SIZE + 4 + SEGMENT_SIZE + 16 + TAG_SIZE;
        truncated.truncate(PUBLIC_KEY_SIZE + 4 + 2 * segment_len);
        assert_eq!(open(&truncated, &secret_key), Err(CryptoError::Authentication));

        assert_eq!(open(&sealed[..10], &secret_key), Err(CryptoError::Malformed));
    }
}
