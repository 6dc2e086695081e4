use crate::identifier::Identifier;
use crate::networking::packet::{write_bytes, FrameError, WireReader};
use macros::TryFromByte;
use std::convert::TryFrom;
use std::time::Duration;

#[derive(TryFromByte, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PseudonymMessageType {
    ChallengeRequest = 0,
    SecureMessage = 1,
}

///
/// Requests sent to the `pseudonym` consumer.
///
/// ```bytes
/// ChallengeRequest
/// 0       message type (0)
/// 1-8     token id (big-endian u64)
/// 9..     identity being challenged, u32 length + 64 bytes
/// ..      nonce sealed for that identity's public key, u32 length + bytes
///
/// SecureMessage
/// 0       message type (1)
/// 1..     recipient identity, u32 length + 64 bytes
/// ..      consumer name, u32 length + utf-8
/// ..      payload sealed for the recipient, u32 length + bytes
/// ```
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudonymRequest {
    Challenge {
        token_id: u64,
        identity: Identifier,
        sealed_nonce: Vec<u8>,
    },
    SecureMessage {
        identity: Identifier,
        consumer: String,
        sealed_data: Vec<u8>,
    },
}

impl PseudonymRequest {
    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = vec![];
        match self {
            PseudonymRequest::Challenge {
                token_id,
                identity,
                sealed_nonce,
            } => {
                vbytes.push(PseudonymMessageType::ChallengeRequest as u8);
                vbytes.extend(&token_id.to_be_bytes());
                write_bytes(&mut vbytes, identity.as_bytes());
                write_bytes(&mut vbytes, sealed_nonce);
            }
            PseudonymRequest::SecureMessage {
                identity,
                consumer,
                sealed_data,
            } => {
                vbytes.push(PseudonymMessageType::SecureMessage as u8);
                write_bytes(&mut vbytes, identity.as_bytes());
                write_bytes(&mut vbytes, consumer.as_bytes());
                write_bytes(&mut vbytes, sealed_data);
            }
        }
        vbytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<PseudonymRequest, FrameError> {
        let mut reader = WireReader::new(bytes);
        let message_type = PseudonymMessageType::try_from(reader.read_u8()?)
            .map_err(FrameError::UnknownMessageType)?;
        let request = match message_type {
            PseudonymMessageType::ChallengeRequest => PseudonymRequest::Challenge {
                token_id: reader.read_u64()?,
                identity: reader.read_identifier()?,
                sealed_nonce: reader.read_bytes()?.to_vec(),
            },
            PseudonymMessageType::SecureMessage => PseudonymRequest::SecureMessage {
                identity: reader.read_identifier()?,
                consumer: reader.read_string()?,
                sealed_data: reader.read_bytes()?.to_vec(),
            },
        };
        reader.finish()?;
        Ok(request)
    }
}

#[derive(TryFromByte, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChallengeStatus {
    Answer = 0,
    Flooded = 1,
    UnknownIdentity = 2,
    Undecryptable = 3,
}

///
/// Answer to a challenge.
///
/// ```bytes
/// 0       status
/// Answer:     u32 length + recovered nonce
/// Flooded:    suggested backoff in milliseconds (big-endian u64)
/// ```
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeResponse {
    Answer(Vec<u8>),
    Flooded { backoff: Duration },
    UnknownIdentity,
    Undecryptable,
}

impl ChallengeResponse {
    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = vec![];
        match self {
            ChallengeResponse::Answer(plaintext) => {
                vbytes.push(ChallengeStatus::Answer as u8);
                write_bytes(&mut vbytes, plaintext);
            }
            ChallengeResponse::Flooded { backoff } => {
                vbytes.push(ChallengeStatus::Flooded as u8);
                vbytes.extend(&(backoff.as_millis() as u64).to_be_bytes());
            }
            ChallengeResponse::UnknownIdentity => {
                vbytes.push(ChallengeStatus::UnknownIdentity as u8);
            }
            ChallengeResponse::Undecryptable => {
                vbytes.push(ChallengeStatus::Undecryptable as u8);
            }
        }
        vbytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<ChallengeResponse, FrameError> {
        let mut reader = WireReader::new(bytes);
        let status =
            ChallengeStatus::try_from(reader.read_u8()?).map_err(FrameError::UnknownMessageType)?;
        let response = match status {
            ChallengeStatus::Answer => ChallengeResponse::Answer(reader.read_bytes()?.to_vec()),
            ChallengeStatus::Flooded => ChallengeResponse::Flooded {
                backoff: Duration::from_millis(reader.read_u64()?),
            },
            ChallengeStatus::UnknownIdentity => ChallengeResponse::UnknownIdentity,
            ChallengeStatus::Undecryptable => ChallengeResponse::Undecryptable,
        };
        reader.finish()?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pseudonym_request_serialize() {
        let identity = Identifier::from_data(b"alice");
        let challenge = PseudonymRequest::Challenge {
            token_id: 77,
            identity,
            sealed_nonce: vec![1, 2, 3],
        };
        assert_eq!(
            PseudonymRequest::deserialize(&challenge.serialize()).unwrap(),
            challenge
        );

        let message = PseudonymRequest::SecureMessage {
            identity,
            consumer: String::from("dns"),
            sealed_data: vec![9; 40],
        };
        let bytes = message.serialize();
        assert_eq!(bytes[0], PseudonymMessageType::SecureMessage as u8);
        assert_eq!(PseudonymRequest::deserialize(&bytes).unwrap(), message);
        assert!(PseudonymRequest::deserialize(&bytes[..20]).is_err());
    }

    #[test]
    fn test_challenge_response_serialize() {
        let flooded = ChallengeResponse::Flooded {
            backoff: Duration::from_secs(2),
        };
        let bytes = flooded.serialize();
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[1..], &2000u64.to_be_bytes());
        assert_eq!(ChallengeResponse::deserialize(&bytes).unwrap(), flooded);

        for response in [
            ChallengeResponse::Answer(b"nonce".to_vec()),
            ChallengeResponse::Answer(vec![]),
            ChallengeResponse::UnknownIdentity,
            ChallengeResponse::Undecryptable,
        ] {
            assert_eq!(
                ChallengeResponse::deserialize(&response.serialize()).unwrap(),
                response
            );
        }
        assert_eq!(
            ChallengeResponse::deserialize(&[4]),
            Err(FrameError::UnknownMessageType(4))
        );
    }
}
