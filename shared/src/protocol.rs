//! Wire protocol shared by the relay server and its clients
//!
//! Every datagram is one message: a 4-byte kind tag followed by the kind's
//! fixed payload. Messages are encoded with bincode's default options, which
//! gives fixed-width little-endian fields with no padding:
//!
//! | kind            | tag | size | payload                                      |
//! |-----------------|-----|------|----------------------------------------------|
//! | Logon           | 0   | 4    | none                                         |
//! | Logoff          | 1   | 4    | none                                         |
//! | UpdatePlayer    | 2   | 40   | id u32, velocity 3xf32, position 3xf32, state u32, yaw f32 |
//! | ConfirmLogon    | 3   | 4    | none                                         |
//! | PlayerLoggedOff | 4   | 8    | id u32                                       |
//!
//! There is no sequence number or checksum. UpdatePlayer carries absolute
//! state, so loss and duplication only ever cost freshness.

use crate::{LocomotionState, PlayerId, Vec3};
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Size of the kind tag at the start of every datagram.
pub const HEADER_SIZE: usize = 4;
pub const UPDATE_PLAYER_SIZE: usize = HEADER_SIZE + 4 + 12 + 12 + 4 + 4;
pub const PLAYER_LOGGED_OFF_SIZE: usize = HEADER_SIZE + 4;

/// One kinematic snapshot of a player.
///
/// The sending client owns every field except `player_id`, which the server
/// overwrites with the id of the session the datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub player_id: PlayerId,
    /// Distance units per second.
    pub velocity: Vec3,
    pub position: Vec3,
    pub state: LocomotionState,
    /// Radians.
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Logon,
    Logoff,
    UpdatePlayer(PlayerUpdate),
    ConfirmLogon,
    PlayerLoggedOff { player_id: PlayerId },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Logon => MessageKind::Logon,
            Message::Logoff => MessageKind::Logoff,
            Message::UpdatePlayer(_) => MessageKind::UpdatePlayer,
            Message::ConfirmLogon => MessageKind::ConfirmLogon,
            Message::PlayerLoggedOff { .. } => MessageKind::PlayerLoggedOff,
        }
    }
}

/// Discriminant of a [`Message`], in wire tag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Logon,
    Logoff,
    UpdatePlayer,
    ConfirmLogon,
    PlayerLoggedOff,
}

impl MessageKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Logon),
            1 => Some(MessageKind::Logoff),
            2 => Some(MessageKind::UpdatePlayer),
            3 => Some(MessageKind::ConfirmLogon),
            4 => Some(MessageKind::PlayerLoggedOff),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            MessageKind::Logon => 0,
            MessageKind::Logoff => 1,
            MessageKind::UpdatePlayer => 2,
            MessageKind::ConfirmLogon => 3,
            MessageKind::PlayerLoggedOff => 4,
        }
    }

    /// Exact datagram length a message of this kind occupies.
    pub fn wire_size(self) -> usize {
        match self {
            MessageKind::UpdatePlayer => UPDATE_PLAYER_SIZE,
            MessageKind::PlayerLoggedOff => PLAYER_LOGGED_OFF_SIZE,
            MessageKind::Logon | MessageKind::Logoff | MessageKind::ConfirmLogon => HEADER_SIZE,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Logon => "Logon",
            MessageKind::Logoff => "Logoff",
            MessageKind::UpdatePlayer => "UpdatePlayer",
            MessageKind::ConfirmLogon => "ConfirmLogon",
            MessageKind::PlayerLoggedOff => "PlayerLoggedOff",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("datagram of {actual} bytes is too short for a message header")]
    Truncated { actual: usize },
    #[error("unknown message kind tag {0}")]
    UnknownKind(u32),
    #[error("{kind} message must be {expected} bytes, got {actual}")]
    WrongSize {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },
    #[error("malformed payload: {0}")]
    Malformed(#[from] bincode::Error),
}

#[derive(Debug, Error)]
#[error("failed to encode message: {0}")]
pub struct EncodeError(#[from] bincode::Error);

pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    Ok(serialize(message)?)
}

/// Decodes one datagram, checking the tag and the exact size before any
/// payload field is read.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let header: [u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|header| header.try_into().ok())
        .ok_or(DecodeError::Truncated {
            actual: bytes.len(),
        })?;

    let tag = u32::from_le_bytes(header);
    let kind = MessageKind::from_tag(tag).ok_or(DecodeError::UnknownKind(tag))?;

    let expected = kind.wire_size();
    if bytes.len() != expected {
        return Err(DecodeError::WrongSize {
            kind,
            expected,
            actual: bytes.len(),
        });
    }

    Ok(deserialize(bytes)?)
}
