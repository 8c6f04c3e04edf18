//! Protocol messages and frame codec
//!
//! One frame on a connection is exactly one encoded wire item: a
//! two-element list of `[message type, payload]`. The payload is an
//! arbitrary [`WireValue`] tree whose shape depends on the message type.

use crate::wire::{self, WireError, WireValue};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Protocol version carried in the handshake payload.
pub const PROTOCOL_VERSION: u64 = 1;

/// Message types understood by the peer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// First message on a fresh connection: `[version, node nonce]`.
    Handshake = 0x00,
    /// Orderly close; payload unused.
    Disconnect = 0x01,
    /// Keep-alive probe; payload is echoed back in the pong.
    Ping = 0x02,
    /// Keep-alive reply.
    Pong = 0x03,
    /// Ask for the remote's known peer addresses.
    GetPeers = 0x10,
    /// List of `host:port` byte-strings.
    Peers = 0x11,
    /// Transaction relay; payload is a list of encoded transactions.
    Txs = 0x12,
    /// Block relay.
    Blocks = 0x13,
}

impl MessageType {
    pub fn from_wire(id: u64) -> Result<Self, WireError> {
        match id {
            0x00 => Ok(MessageType::Handshake),
            0x01 => Ok(MessageType::Disconnect),
            0x02 => Ok(MessageType::Ping),
            0x03 => Ok(MessageType::Pong),
            0x10 => Ok(MessageType::GetPeers),
            0x11 => Ok(MessageType::Peers),
            0x12 => Ok(MessageType::Txs),
            0x13 => Ok(MessageType::Blocks),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }

    /// Name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Handshake => "Handshake",
            MessageType::Disconnect => "Disconnect",
            MessageType::Ping => "Ping",
            MessageType::Pong => "Pong",
            MessageType::GetPeers => "GetPeers",
            MessageType::Peers => "Peers",
            MessageType::Txs => "Txs",
            MessageType::Blocks => "Blocks",
        }
    }
}

/// One protocol message: a type and an uninterpreted payload tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub payload: WireValue,
}

impl Message {
    pub fn new(kind: MessageType, payload: WireValue) -> Self {
        Self { kind, payload }
    }

    /// Encode as one wire item, ready for framing.
    pub fn encode(&self) -> Vec<u8> {
        let item = WireValue::list(vec![
            WireValue::uint(self.kind as u64),
            self.payload.clone(),
        ]);
        wire::encode(&item)
    }

    /// Decode one message from the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let (item, _) = wire::decode(buf, 0)?;
        let kind = MessageType::from_wire(item.get(0).as_u64())?;
        Ok(Self {
            kind,
            payload: item.get(1).clone(),
        })
    }
}

/// Length-delimited message framing over a TCP stream.
///
/// The wire item's own header carries the length, so the codec peeks at
/// it to find the frame boundary and only then decodes.
pub struct FrameCodec;

impl Encoder<Message> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = item.encode();
        dst.reserve(data.len());
        dst.put_slice(&data);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame_len = match wire::codec::item_len(src, 0) {
            None => return Ok(None),
            Some(Err(e)) => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
            }
            Some(Ok(len)) => len,
        };

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        let msg = Message::decode(&frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        Ok(Some(msg))
    }
}
