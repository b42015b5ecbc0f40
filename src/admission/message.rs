//! Protocol messages and their fixed-size wire frame.

use serde::{Deserialize, Serialize};

use crate::clock::{LogicalTimestamp, PeerId};

use super::error::CoordinatorError;

/// Identifier of an admission-controlled resource.
pub type ResourceId = u32;

/// Resource id carried by `Terminate`, which is not about any resource.
pub const NO_RESOURCE: ResourceId = ResourceId::MAX;

/// Size of an encoded frame: `kind: u32`, `timestamp: u64`, `resource: u32`.
pub const FRAME_LEN: usize = 16;

/// Kind of protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Ask every other peer for permission to hold a resource.
    Request,
    /// Grant a pending request.
    Approve,
    /// The sender has finished the current round.
    Terminate,
}

impl MessageKind {
    /// Numeric tag used on the wire.
    pub fn as_u32(&self) -> u32 {
        match self {
            MessageKind::Request => 0,
            MessageKind::Approve => 1,
            MessageKind::Terminate => 2,
        }
    }

    pub fn from_u32(kind: u32) -> Option<Self> {
        match kind {
            0 => Some(MessageKind::Request),
            1 => Some(MessageKind::Approve),
            2 => Some(MessageKind::Terminate),
            _ => None,
        }
    }
}

/// A protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// What the message means.
    pub kind: MessageKind,
    /// Sender's logical time at send.
    pub timestamp: LogicalTimestamp,
    /// Resource the message is about ([`NO_RESOURCE`] for `Terminate`).
    pub resource: ResourceId,
}

impl Message {
    pub fn request(timestamp: LogicalTimestamp, resource: ResourceId) -> Self {
        Message { kind: MessageKind::Request, timestamp, resource }
    }

    pub fn approve(timestamp: LogicalTimestamp, resource: ResourceId) -> Self {
        Message { kind: MessageKind::Approve, timestamp, resource }
    }

    pub fn terminate(timestamp: LogicalTimestamp) -> Self {
        Message { kind: MessageKind::Terminate, timestamp, resource: NO_RESOURCE }
    }

    /// Encode into a fixed-size frame.
    pub fn encode(&self) -> Result<Vec<u8>, CoordinatorError> {
        let frame = WireFrame {
            kind: self.kind.as_u32(),
            timestamp: self.timestamp.as_u64(),
            resource: self.resource,
        };
        let bytes = bincode::serialize(&frame)?;
        debug_assert_eq!(bytes.len(), FRAME_LEN);
        Ok(bytes)
    }

    /// Decode a frame received from `from`.
    ///
    /// An unknown kind is an invariant violation, not something to skip.
    pub fn decode(from: PeerId, bytes: &[u8]) -> Result<Self, CoordinatorError> {
        if bytes.len() != FRAME_LEN {
            return Err(CoordinatorError::MalformedFrame {
                len: bytes.len(),
                expected: FRAME_LEN,
            });
        }

        let frame: WireFrame = bincode::deserialize(bytes)?;
        let kind = MessageKind::from_u32(frame.kind)
            .ok_or(CoordinatorError::UnknownMessageKind { kind: frame.kind, from })?;

        Ok(Message {
            kind,
            timestamp: LogicalTimestamp::new(frame.timestamp),
            resource: frame.resource,
        })
    }
}

/// On-the-wire record. Little-endian fixed-width integers (bincode defaults).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireFrame {
    kind: u32,
    timestamp: u64,
    resource: u32,
}

/// A message together with the peer that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub from: PeerId,
    pub message: Message,
}
