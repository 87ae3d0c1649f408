//! Error types and structured `error_stack` context types.
//!
//! Errors are zero-sized markers; details travel as attachments on the
//! [`error_stack::Report`].

use std::fmt;

use crate::protocol::{ConnectionId, RoomId};
use crate::tree::Path;

/// An operation could not be applied to a document tree.
#[derive(Debug, Default)]
pub struct OperationError;

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("document operation failed")
    }
}

impl std::error::Error for OperationError {}

/// The replicated document rejected an update or could not be read.
#[derive(Debug, Default)]
pub struct ReplicaError;

impl fmt::Display for ReplicaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("replicated document operation failed")
    }
}

impl std::error::Error for ReplicaError {}

/// The replication transport could not open or lost its connection.
#[derive(Debug, Default)]
pub struct TransportError;

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("replication transport failed")
    }
}

impl std::error::Error for TransportError {}

/// A wire frame could not be encoded or decoded.
#[derive(Debug, Default)]
pub struct CodecError;

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("frame codec failed")
    }
}

impl std::error::Error for CodecError {}

/// Configuration could not be read or parsed.
#[derive(Debug, Default)]
pub struct ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid configuration")
    }
}

impl std::error::Error for ConfigError {}

/// A logical range no longer resolves against the current document.
#[derive(Debug, Default)]
pub struct RangeError;

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("range does not resolve")
    }
}

impl std::error::Error for RangeError {}

/// Initial content could not be converted into a document tree.
#[derive(Debug, Default)]
pub struct NormalizeError;

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("content normalization failed")
    }
}

impl std::error::Error for NormalizeError {}

/// Error context: room.
#[derive(Debug, Clone)]
pub struct RoomContext {
    pub room: RoomId,
}

impl RoomContext {
    #[must_use]
    pub fn new(room: RoomId) -> Self {
        Self { room }
    }
}

impl fmt::Display for RoomContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room: {}", self.room)
    }
}

/// Error context: connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
}

impl ConnectionContext {
    #[must_use]
    pub fn new(connection_id: ConnectionId) -> Self {
        Self { connection_id }
    }
}

impl fmt::Display for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection: {}", self.connection_id)
    }
}

/// Error context: tree path.
#[derive(Debug, Clone)]
pub struct PathContext {
    pub path: Path,
}

impl PathContext {
    #[must_use]
    pub fn new(path: &[usize]) -> Self {
        Self {
            path: path.to_vec(),
        }
    }
}

impl fmt::Display for PathContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path: {:?}", self.path)
    }
}

/// Error context: what operation was in progress.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: &'static str,
}

impl OperationContext {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "while {}", self.operation)
    }
}

impl OperationContext {
    pub const OPENING_SESSION: Self = Self {
        operation: "opening session",
    };
    pub const APPLYING_HANDSHAKE: Self = Self {
        operation: "applying handshake state",
    };
    pub const FORWARDING_LOCAL: Self = Self {
        operation: "forwarding local operations",
    };
    pub const APPLYING_REMOTE: Self = Self {
        operation: "applying remote update",
    };
    pub const SEEDING: Self = Self {
        operation: "seeding replica",
    };
    pub const PUBLISHING_PRESENCE: Self = Self {
        operation: "publishing presence",
    };
    pub const DISPOSING: Self = Self {
        operation: "disposing replica",
    };
    pub const RECONNECTING: Self = Self {
        operation: "reconnecting",
    };
}
