//! Room identifiers and the frames exchanged with the replication transport.

use std::fmt;

use error_stack::{Report, ResultExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::presence::PresenceRecord;

/// Current wire protocol version. Prefixed to every encoded frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Identifier of a collaboratively edited document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Transport-assigned identity of one connection to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Frames a client sends to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Replica update bytes, in the order they were produced.
    Update { updates: Vec<Vec<u8>> },
    Presence(PresenceRecord),
    Leave,
}

/// Frames the room delivers to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    Update {
        from: ConnectionId,
        updates: Vec<Vec<u8>>,
    },
    Presence(PresenceRecord),
    PeerLeft(ConnectionId),
    /// The room dropped this connection.
    Closed,
}

/// Room state handed to a connection when it joins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    /// Replica state, as update bytes to merge in order.
    pub updates: Vec<Vec<u8>>,
    /// Presence of every other connection in the room.
    pub peers: Vec<PresenceRecord>,
}

/// Encode a frame for the wire.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, Report<CodecError>> {
    postcard::to_extend(frame, vec![PROTOCOL_VERSION]).change_context(CodecError)
}

/// Decode a frame from the wire.
///
/// # Errors
///
/// Returns [`CodecError`] if the version byte is missing or unknown, or the
/// payload does not deserialize.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Report<CodecError>> {
    let Some((&version, payload)) = bytes.split_first() else {
        return Err(Report::new(CodecError).attach("empty frame"));
    };
    if version != PROTOCOL_VERSION {
        return Err(Report::new(CodecError).attach(format!("unknown protocol version: {version}")));
    }
    postcard::from_bytes(payload).change_context(CodecError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::User;

    #[test]
    fn frames_carry_version_prefix() {
        let bytes = encode(&ClientFrame::Leave).unwrap();
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(decode::<ClientFrame>(&bytes).unwrap(), ClientFrame::Leave);
    }

    #[test]
    fn presence_frame_decodes() {
        let record = PresenceRecord::mounted(ConnectionId(3), User::new("Ada", "#0af"));
        let bytes = encode(&ServerFrame::Presence(record.clone())).unwrap();
        assert_eq!(decode::<ServerFrame>(&bytes).unwrap(), ServerFrame::Presence(record));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = encode(&ClientFrame::Leave).unwrap();
        bytes[0] = 9;
        let err = decode::<ClientFrame>(&bytes).unwrap_err();
        assert!(format!("{err:?}").contains("unknown protocol version: 9"));
        assert!(decode::<ClientFrame>(&[]).is_err());
    }
}
