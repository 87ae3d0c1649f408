//! Request/response types for the editor actor, and the events it emits.

use error_stack::Report;
use tandem_core::{
    ConnectionId, Document, InitialContent, LogicalRange, OperationBatch, RoomId, SurfaceGeometry,
    User,
};
use tokio::sync::oneshot;
use tracing::debug;

use crate::adapter::{AdapterStats, Committed, LocalDocument};
use crate::error::EditorError;
use crate::presence::{PeerSet, Subscription};
use crate::projector::Projection;
use crate::seeding::SeedOutcome;

pub type Reply<T> = oneshot::Sender<Result<T, Report<EditorError>>>;

// =============================================================================
// Room state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and seeded; waiting out the ready delay.
    Syncing,
    /// Accepting local edits.
    Ready,
    /// The transport dropped the connection. Reconnect to resume.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    pub connection_id: ConnectionId,
    pub state: ConnectionState,
    pub seed: Option<SeedOutcome>,
    pub stats: AdapterStats,
}

// =============================================================================
// Events
// =============================================================================

/// The local document changed because of a remote update.
#[derive(Debug, Clone)]
pub struct DocumentUpdatedPayload {
    pub room: RoomId,
    pub document: Document,
    pub selection: Option<LogicalRange>,
}

#[derive(Debug, Clone)]
pub struct PresenceChangedPayload {
    pub room: RoomId,
    pub peers: PeerSet,
}

#[derive(Debug, Clone)]
pub struct CursorsProjectedPayload {
    pub room: RoomId,
    pub projection: Projection,
}

#[derive(Debug, Clone)]
pub struct ConnectionStatePayload {
    pub room: RoomId,
    pub state: ConnectionState,
}

/// Where the actor sends events for the rendering layer.
pub trait EventEmitter: Clone + Send + 'static {
    fn emit_document_updated(&self, payload: &DocumentUpdatedPayload);
    fn emit_presence_changed(&self, payload: &PresenceChangedPayload);
    fn emit_cursors_projected(&self, payload: &CursorsProjectedPayload);
    fn emit_connection_state(&self, payload: &ConnectionStatePayload);
}

/// Logs every event and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit_document_updated(&self, payload: &DocumentUpdatedPayload) {
        debug!(room = %payload.room, text = %payload.document, "document updated");
    }

    fn emit_presence_changed(&self, payload: &PresenceChangedPayload) {
        debug!(room = %payload.room, peers = payload.peers.len(), "presence changed");
    }

    fn emit_cursors_projected(&self, payload: &CursorsProjectedPayload) {
        debug!(
            room = %payload.room,
            cursors = payload.projection.cursors.len(),
            selections = payload.projection.selections.len(),
            "cursors projected"
        );
    }

    fn emit_connection_state(&self, payload: &ConnectionStatePayload) {
        debug!(room = %payload.room, state = ?payload.state, "connection state");
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request sent to the [`EditorActor`](crate::actor::EditorActor).
pub enum EditorRequest {
    /// Open a room, bind a fresh local document and seed it if the room is
    /// empty. Opening a room that is already open returns its document.
    OpenRoom {
        room: RoomId,
        user: User,
        initial: InitialContent,
        surface: Box<dyn SurfaceGeometry>,
        reply: Reply<LocalDocument>,
    },
    /// Close a room. Replies whether it was open.
    CloseRoom {
        room: RoomId,
        reply: oneshot::Sender<bool>,
    },
    /// Drop the room's connection and open a new one with a fresh replica.
    Reconnect {
        room: RoomId,
        reply: Reply<LocalDocument>,
    },
    /// Forward a request to an open room. Dropped if the room is not open.
    ForRoom { room: RoomId, request: RoomRequest },
    /// Close every room and stop the actor.
    Shutdown,
}

/// Request handled by one open room.
pub enum RoomRequest {
    /// Commit a batch from the editing surface and replicate it.
    ApplyOperations {
        batch: OperationBatch,
        reply: Reply<Committed>,
    },
    GetDocument {
        reply: oneshot::Sender<LocalDocument>,
    },
    /// Pointer moved to viewport coordinates.
    PointerMoved { x: f64, y: f64 },
    PointerLeft,
    GetPeers {
        reply: oneshot::Sender<PeerSet>,
    },
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    GetStatus {
        reply: oneshot::Sender<RoomStatus>,
    },
    /// The most recent projection of peers' cursors and selections.
    GetProjection {
        reply: oneshot::Sender<Option<Projection>>,
    },
}
