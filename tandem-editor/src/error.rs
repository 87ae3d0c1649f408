//! Editor-level error markers and their attachments.

use std::fmt;

/// A request to the editor could not be served.
#[derive(Debug, Default)]
pub struct EditorError;

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("editor request failed")
    }
}

impl std::error::Error for EditorError {}

/// A replication session could not be opened or used.
#[derive(Debug, Default)]
pub struct SessionError;

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("replication session failed")
    }
}

impl std::error::Error for SessionError {}

/// The document adapter could not commit a batch.
#[derive(Debug, Default)]
pub struct AdapterError;

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("document adapter failed")
    }
}

impl std::error::Error for AdapterError {}

/// Attachment: the transport refused or failed to open a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionFailed;

impl fmt::Display for ConnectionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("connection failed")
    }
}

/// Attachment: the room is not ready for edits yet.
#[derive(Debug, Clone, Copy)]
pub struct NotReady;

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("room is not ready")
    }
}

/// Attachment: no open room by that id.
#[derive(Debug, Clone, Copy)]
pub struct UnknownRoom;

impl fmt::Display for UnknownRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("room is not open")
    }
}

/// Attachment: the adapter has no bound replica.
#[derive(Debug, Clone, Copy)]
pub struct NotBound;

impl fmt::Display for NotBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("adapter is not bound")
    }
}
