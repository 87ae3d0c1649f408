//! Async front door to a running [`EditorActor`].

use error_stack::Report;
use tandem_core::{
    InitialContent, OperationBatch, RoomContext, RoomId, SurfaceGeometry, SyncConfig, Transport,
    User,
};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::actor::EditorActor;
use crate::adapter::{Committed, LocalDocument};
use crate::error::{EditorError, UnknownRoom};
use crate::presence::{PeerSet, Subscription};
use crate::projector::Projection;
use crate::types::{EditorRequest, EventEmitter, Reply, RoomRequest, RoomStatus};

/// Starts an editor actor on the current runtime.
pub fn spawn_editor<T: Transport, E: EventEmitter>(
    transport: T,
    config: SyncConfig,
    emitter: E,
) -> EditorHandle {
    let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);
    let actor = EditorActor::new(transport, config, request_rx, emitter);
    tokio::spawn(actor.run());
    info!("editor actor spawned");
    EditorHandle::new(request_tx)
}

#[derive(Debug, Clone)]
pub struct EditorHandle {
    request_tx: mpsc::Sender<EditorRequest>,
}

fn actor_closed() -> Report<EditorError> {
    Report::new(EditorError).attach("editor actor closed")
}

impl EditorHandle {
    #[must_use]
    pub fn new(request_tx: mpsc::Sender<EditorRequest>) -> Self {
        Self { request_tx }
    }

    async fn request<T>(
        &self,
        make_request: impl FnOnce(Reply<T>) -> EditorRequest,
    ) -> Result<T, Report<EditorError>> {
        let (tx, rx) = oneshot::channel();
        self.request_tx
            .send(make_request(tx))
            .await
            .map_err(|_| actor_closed())?;
        rx.await.map_err(|_| actor_closed())?
    }

    async fn room_request<T>(
        &self,
        room: &RoomId,
        make_request: impl FnOnce(oneshot::Sender<T>) -> RoomRequest,
    ) -> Result<T, Report<EditorError>> {
        let (tx, rx) = oneshot::channel();
        self.request_tx
            .send(EditorRequest::ForRoom {
                room: room.clone(),
                request: make_request(tx),
            })
            .await
            .map_err(|_| actor_closed())?;
        rx.await.map_err(|_| {
            Report::new(EditorError)
                .attach(UnknownRoom)
                .attach(RoomContext::new(room.clone()))
        })
    }

    async fn room_notify(
        &self,
        room: &RoomId,
        request: RoomRequest,
    ) -> Result<(), Report<EditorError>> {
        self.request_tx
            .send(EditorRequest::ForRoom {
                room: room.clone(),
                request,
            })
            .await
            .map_err(|_| actor_closed())
    }

    /// Opens `room` and returns the bound local document once seeding has
    /// run.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError`] if the transport cannot connect.
    pub async fn open_room(
        &self,
        room: &RoomId,
        user: User,
        initial: impl Into<InitialContent>,
        surface: impl SurfaceGeometry,
    ) -> Result<LocalDocument, Report<EditorError>> {
        let initial = initial.into();
        self.request(|reply| EditorRequest::OpenRoom {
            room: room.clone(),
            user,
            initial,
            surface: Box::new(surface),
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the room is not open or not ready, or the
    /// batch does not apply.
    pub async fn apply(
        &self,
        room: &RoomId,
        batch: OperationBatch,
    ) -> Result<Committed, Report<EditorError>> {
        self.room_request(room, |reply| RoomRequest::ApplyOperations { batch, reply })
            .await?
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the room is not open.
    pub async fn document(&self, room: &RoomId) -> Result<LocalDocument, Report<EditorError>> {
        self.room_request(room, |reply| RoomRequest::GetDocument { reply })
            .await
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the actor has stopped.
    pub async fn pointer_moved(
        &self,
        room: &RoomId,
        x: f64,
        y: f64,
    ) -> Result<(), Report<EditorError>> {
        self.room_notify(room, RoomRequest::PointerMoved { x, y }).await
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the actor has stopped.
    pub async fn pointer_left(&self, room: &RoomId) -> Result<(), Report<EditorError>> {
        self.room_notify(room, RoomRequest::PointerLeft).await
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the room is not open.
    pub async fn peers(&self, room: &RoomId) -> Result<PeerSet, Report<EditorError>> {
        self.room_request(room, |reply| RoomRequest::GetPeers { reply })
            .await
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the room is not open.
    pub async fn subscribe(&self, room: &RoomId) -> Result<Subscription, Report<EditorError>> {
        self.room_request(room, |reply| RoomRequest::Subscribe { reply })
            .await
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the room is not open.
    pub async fn status(&self, room: &RoomId) -> Result<RoomStatus, Report<EditorError>> {
        self.room_request(room, |reply| RoomRequest::GetStatus { reply })
            .await
    }

    /// # Errors
    ///
    /// Returns [`EditorError`] if the room is not open.
    pub async fn projection(
        &self,
        room: &RoomId,
    ) -> Result<Option<Projection>, Report<EditorError>> {
        self.room_request(room, |reply| RoomRequest::GetProjection { reply })
            .await
    }

    /// Closes `room`. Returns whether it was open.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError`] if the actor has stopped.
    pub async fn close_room(&self, room: &RoomId) -> Result<bool, Report<EditorError>> {
        let (tx, rx) = oneshot::channel();
        self.request_tx
            .send(EditorRequest::CloseRoom {
                room: room.clone(),
                reply: tx,
            })
            .await
            .map_err(|_| actor_closed())?;
        rx.await.map_err(|_| actor_closed())
    }

    /// Replaces the room's connection and replica with fresh ones.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError`] if the room is not open or the transport
    /// cannot connect.
    pub async fn reconnect(&self, room: &RoomId) -> Result<LocalDocument, Report<EditorError>> {
        self.request(|reply| EditorRequest::Reconnect {
            room: room.clone(),
            reply,
        })
        .await
    }

    /// Closes every room and stops the actor.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(EditorRequest::Shutdown).await;
    }
}
