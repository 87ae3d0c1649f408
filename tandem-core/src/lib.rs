//! Shared types for collaborative rich-text editing: the document tree and
//! its operations, presence records, wire frames, configuration and the
//! contracts for the replica, transport and editing surface.

#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod normalize;
pub mod operation;
pub mod presence;
pub mod protocol;
pub mod range;
pub mod replica;
pub mod surface;
pub mod transport;
pub mod tree;

pub use config::{EmptinessPolicy, SyncConfig};
pub use error::{
    CodecError, ConfigError, ConnectionContext, NormalizeError, OperationContext, OperationError,
    PathContext, RangeError, ReplicaError, RoomContext, TransportError,
};
pub use normalize::{CanonicalNormalizer, InitialContent, Normalizer};
pub use operation::{NodeProps, Operation, OperationBatch, OperationKind};
pub use presence::{CursorPosition, PresenceRecord, PresenceUpdate, User};
pub use protocol::{ClientFrame, ConnectionId, Handshake, PROTOCOL_VERSION, RoomId, ServerFrame};
pub use range::{LogicalRange, Point};
pub use replica::ReplicatedDocument;
pub use surface::{Rect, SurfaceGeometry};
pub use transport::{Transport, TransportLink};
pub use tree::{Alignment, Block, BlockKind, Document, Leaf, Marks, Node, NodeRef, Path};
