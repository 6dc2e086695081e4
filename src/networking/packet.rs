use crate::identifier::Identifier;
use crate::networking::contact::Contact;
use macros::TryFromByte;
use std::convert::{TryFrom, TryInto};
use std::net::IpAddr;
use thiserror::Error;

/// Why a buffer could not be read as a packet. Decoding never panics, every
/// out-of-bounds read ends up here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer ended before the frame did")]
    Truncated,
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("text field is not valid utf-8")]
    InvalidUtf8,
    #[error("invalid address")]
    InvalidAddress,
    #[error("port {0} out of range")]
    InvalidPort(u32),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("datagram of {size} bytes exceeds maximum of {max}")]
    Oversized { size: usize, max: usize },
}

#[derive(TryFromByte, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Ping = 0,
    Data = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Liveness check. The answer comes back through the callback consumer
    /// tagged with `token_id`.
    Ping { token_id: u64 },
    /// Opaque body addressed to a named consumer on the receiving node.
    Data { consumer: String, body: Vec<u8> },
}

///
/// A single UDP datagram.
///
/// ```bytes
/// 0       packet type (Ping=0, Data=1)
/// ..      sender contact:
///             identifier      u32 length + bytes
///             network tag     u32 length + bytes
///             port            u32
///             address         u32 length + bytes (textual ip)
/// ..      payload:
///             Ping            token id u64
///             Data            u32 length + consumer, u32 length + body
/// ```
///
/// Integers are big-endian. There is no version field.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sender: Contact,
    pub payload: Payload,
}

impl Packet {
    pub fn new(sender: Contact, payload: Payload) -> Self {
        Packet { sender, payload }
    }

    pub fn packet_type(&self) -> PacketType {
        match self.payload {
            Payload::Ping { .. } => PacketType::Ping,
            Payload::Data { .. } => PacketType::Data,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = vec![];
        vbytes.push(self.packet_type() as u8);
        write_contact(&mut vbytes, &self.sender);
        match &self.payload {
            Payload::Ping { token_id } => {
                vbytes.extend(&token_id.to_be_bytes());
            }
            Payload::Data { consumer, body } => {
                write_bytes(&mut vbytes, consumer.as_bytes());
                write_bytes(&mut vbytes, body);
            }
        }
        vbytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Packet, FrameError> {
        let mut reader = WireReader::new(bytes);
        let packet_type =
            PacketType::try_from(reader.read_u8()?).map_err(FrameError::UnknownPacketType)?;
        let sender = read_contact(&mut reader)?;
        let payload = match packet_type {
            PacketType::Ping => Payload::Ping {
                token_id: reader.read_u64()?,
            },
            PacketType::Data => Payload::Data {
                consumer: reader.read_string()?,
                body: reader.read_bytes()?.to_vec(),
            },
        };
        reader.finish()?;
        Ok(Packet { sender, payload })
    }
}

pub fn write_contact(vbytes: &mut Vec<u8>, contact: &Contact) {
    write_bytes(vbytes, contact.identifier.as_bytes());
    write_bytes(vbytes, contact.network_tag.as_bytes());
    vbytes.extend(&(contact.port as u32).to_be_bytes());
    write_bytes(vbytes, contact.address.to_string().as_bytes());
}

pub fn read_contact(reader: &mut WireReader) -> Result<Contact, FrameError> {
    let identifier = reader.read_identifier()?;
    let network_tag = reader.read_string()?;
    let raw_port = reader.read_u32()?;
    let port: u16 = raw_port
        .try_into()
        .map_err(|_| FrameError::InvalidPort(raw_port))?;
    let address: IpAddr = reader
        .read_string()?
        .parse()
        .map_err(|_| FrameError::InvalidAddress)?;
    Ok(Contact::new(identifier, &network_tag, address, port))
}

/// Append a u32 length prefix followed by the bytes.
pub fn write_bytes(vbytes: &mut Vec<u8>, bytes: &[u8]) {
    vbytes.extend(&(bytes.len() as u32).to_be_bytes());
    vbytes.extend(bytes);
}

/// Bounds-checked cursor over a received buffer.
pub struct WireReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        WireReader { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        let end = self.offset.checked_add(len).ok_or(FrameError::Truncated)?;
        let slice = self.bytes.get(self.offset..end).ok_or(FrameError::Truncated)?;
        self.offset = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, FrameError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32, FrameError> {
        let raw: [u8; 4] = self.take(4)?.try_into().map_err(|_| FrameError::Truncated)?;
        Ok(u32::from_be_bytes(raw))
    }

    pub fn read_u64(&mut self) -> Result<u64, FrameError> {
        let raw: [u8; 8] = self.take(8)?.try_into().map_err(|_| FrameError::Truncated)?;
        Ok(u64::from_be_bytes(raw))
    }

    /// A u32 length prefix and that many bytes.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], FrameError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String, FrameError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8)
    }

    pub fn read_identifier(&mut self) -> Result<Identifier, FrameError> {
        Identifier::from_slice(self.read_bytes()?).ok_or(FrameError::Truncated)
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Fails if anything is left over. Every frame must be read completely.
    pub fn finish(self) -> Result<(), FrameError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(FrameError::TrailingBytes(n)),
        }
    }
}
