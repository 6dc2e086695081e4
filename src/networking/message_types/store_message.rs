use crate::identifier::Identifier;
use crate::networking::packet::{write_bytes, FrameError, WireReader};
use macros::TryFromByte;
use std::convert::TryFrom;

#[derive(TryFromByte, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoreMessageType {
    GetRequest = 0,
    PutRequest = 1,
}

///
/// Requests sent to the `store` consumer.
///
/// ```bytes
/// 0       message type (GetRequest=0, PutRequest=1)
/// 1-8     token id (big-endian u64)
/// 9..     key, u32 length + 64 bytes
/// PutRequest only:
/// ..      value present flag (u8), then u32 length + value when present
/// ```
///
/// A put without a value deletes the key.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRequest {
    Get {
        token_id: u64,
        key: Identifier,
    },
    Put {
        token_id: u64,
        key: Identifier,
        value: Option<Vec<u8>>,
    },
}

impl StoreRequest {
    pub fn token_id(&self) -> u64 {
        match self {
            StoreRequest::Get { token_id, .. } => *token_id,
            StoreRequest::Put { token_id, .. } => *token_id,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = vec![];
        match self {
            StoreRequest::Get { token_id, key } => {
                vbytes.push(StoreMessageType::GetRequest as u8);
                vbytes.extend(&token_id.to_be_bytes());
                write_bytes(&mut vbytes, key.as_bytes());
            }
            StoreRequest::Put {
                token_id,
                key,
                value,
            } => {
                vbytes.push(StoreMessageType::PutRequest as u8);
                vbytes.extend(&token_id.to_be_bytes());
                write_bytes(&mut vbytes, key.as_bytes());
                write_optional_bytes(&mut vbytes, value.as_deref());
            }
        }
        vbytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<StoreRequest, FrameError> {
        let mut reader = WireReader::new(bytes);
        let message_type = StoreMessageType::try_from(reader.read_u8()?)
            .map_err(FrameError::UnknownMessageType)?;
        let token_id = reader.read_u64()?;
        let key = reader.read_identifier()?;
        let request = match message_type {
            StoreMessageType::GetRequest => StoreRequest::Get { token_id, key },
            StoreMessageType::PutRequest => StoreRequest::Put {
                token_id,
                key,
                value: read_optional_bytes(&mut reader)?,
            },
        };
        reader.finish()?;
        Ok(request)
    }
}

/// Outcome of a put on the node that received it.
#[derive(TryFromByte, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PutResponseCode {
    Success = 0,
    DuplicateKey = 1,
    KeyNotFound = 2,
}

impl PutResponseCode {
    pub fn serialize(&self) -> Vec<u8> {
        vec![*self as u8]
    }

    pub fn deserialize(bytes: &[u8]) -> Result<PutResponseCode, FrameError> {
        let mut reader = WireReader::new(bytes);
        let code =
            PutResponseCode::try_from(reader.read_u8()?).map_err(FrameError::UnknownMessageType)?;
        reader.finish()?;
        Ok(code)
    }
}

///
/// Answer to a get.
///
/// ```bytes
/// 0       authoritative flag (u8)
/// 1       data present flag (u8)
/// 2..     u32 length + data when present
/// ```
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    pub authoritative: bool,
    pub data: Option<Vec<u8>>,
}

impl GetResponse {
    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = vec![self.authoritative as u8];
        write_optional_bytes(&mut vbytes, self.data.as_deref());
        vbytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<GetResponse, FrameError> {
        let mut reader = WireReader::new(bytes);
        let authoritative = reader.read_bool()?;
        let data = read_optional_bytes(&mut reader)?;
        reader.finish()?;
        Ok(GetResponse {
            authoritative,
            data,
        })
    }
}

fn write_optional_bytes(vbytes: &mut Vec<u8>, value: Option<&[u8]>) {
    match value {
        Some(value) => {
            vbytes.push(1);
            write_bytes(vbytes, value);
        }
        None => vbytes.push(0),
    }
}

fn read_optional_bytes(reader: &mut WireReader) -> Result<Option<Vec<u8>>, FrameError> {
    if reader.read_bool()? {
        Ok(Some(reader.read_bytes()?.to_vec()))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_request_serialize() {
        let key = Identifier::from_data(b"id1");
        let requests = vec![
            StoreRequest::Get { token_id: 9, key },
            StoreRequest::Put {
                token_id: 10,
                key,
                value: Some(b"v1".to_vec()),
            },
            StoreRequest::Put {
                token_id: 11,
                key,
                value: None,
            },
            StoreRequest::Put {
                token_id: 12,
                key,
                value: Some(vec![]),
            },
        ];
        for request in requests {
            let bytes = request.serialize();
            assert_eq!(StoreRequest::deserialize(&bytes).unwrap(), request);
        }
    }

    #[test]
    fn test_store_request_rejects_garbage() {
        let bytes = StoreRequest::Get {
            token_id: 1,
            key: Identifier::random(),
        }
        .serialize();
        assert_eq!(
            StoreRequest::deserialize(&bytes[..bytes.len() - 1]),
            Err(FrameError::Truncated)
        );
        let mut unknown = bytes.clone();
        unknown[0] = 7;
        assert_eq!(
            StoreRequest::deserialize(&unknown),
            Err(FrameError::UnknownMessageType(7))
        );
    }

    #[test]
    fn test_responses_serialize() {
        for code in [
            PutResponseCode::Success,
            PutResponseCode::DuplicateKey,
            PutResponseCode::KeyNotFound,
        ] {
            assert_eq!(PutResponseCode::deserialize(&code.serialize()).unwrap(), code);
        }
        assert!(PutResponseCode::deserialize(&[3]).is_err());

        let response = GetResponse {
            authoritative: true,
            data: Some(b"v1".to_vec()),
        };
        assert_eq!(GetResponse::deserialize(&response.serialize()).unwrap(), response);
        let empty = GetResponse {
            authoritative: false,
            data: None,
        };
        assert_eq!(empty.serialize(), vec![0, 0]);
    }
}
