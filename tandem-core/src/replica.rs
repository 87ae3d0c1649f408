//! The replicated document contract.

use error_stack::Report;

use crate::error::ReplicaError;
use crate::operation::Operation;
use crate::tree::Document;

/// A CRDT-backed copy of one room's document.
///
/// Local operations are recorded as pending update bytes; the session
/// takes them with [`flush`](Self::flush), sends them, then calls
/// [`confirm_flush`](Self::confirm_flush).
pub trait ReplicatedDocument: Send + 'static {
    /// No top-level blocks exist.
    fn is_empty(&self) -> bool;

    /// Reads the replica as a document tree.
    ///
    /// Empty structures read as their canonical defaults.
    fn materialize(&self) -> Result<Document, Report<ReplicaError>>;

    /// Applies local content operations in one transaction.
    fn apply_local_operations(&mut self, operations: &[Operation])
    -> Result<(), Report<ReplicaError>>;

    /// Merges update bytes received from a peer.
    fn apply_update(&mut self, update: &[u8]) -> Result<(), Report<ReplicaError>>;

    /// Pending local updates not yet handed to the transport.
    ///
    /// Returns the same data until [`confirm_flush`](Self::confirm_flush).
    fn flush(&mut self) -> Option<Vec<Vec<u8>>>;

    fn confirm_flush(&mut self);

    /// Full replica state as a single update.
    fn snapshot(&self) -> Result<Vec<u8>, Report<ReplicaError>>;

    /// Releases the replica. Later calls fail.
    fn dispose(&mut self) -> Result<(), Report<ReplicaError>>;
}
