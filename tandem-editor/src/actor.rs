//! Editor actor.
//!
//! Owns every open room: its replication session, seeding controller,
//! presence broadcaster and cursor projector. All state is mediated by
//! channels; one `select!` loop serves requests, inbound frames and the
//! refresh tick, which also promotes rooms whose ready delay has passed and
//! resends updates the transport could not take.

use std::collections::HashMap;

use error_stack::{Report, ResultExt};
use tandem_core::{
    CanonicalNormalizer, Document, InitialContent, Normalizer, OperationBatch, OperationContext,
    PresenceRecord, RoomContext, RoomId, SurfaceGeometry, SyncConfig, Transport, User,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::adapter::{Committed, LocalDocument};
use crate::error::{EditorError, NotReady, UnknownRoom};
use crate::presence::PresenceBroadcaster;
use crate::projector::CursorProjector;
use crate::seeding::{SeedOutcome, SeedingController};
use crate::session::{FrameOutcome, LinkEvent, RoomInbound, Session, SessionRegistry};
use crate::types::{
    ConnectionState, ConnectionStatePayload, CursorsProjectedPayload, DocumentUpdatedPayload,
    EditorRequest, EventEmitter, PresenceChangedPayload, RoomRequest, RoomStatus,
};

/// Per-room editor state that lives beside the session.
struct Room {
    user: User,
    initial: Document,
    surface: Box<dyn SurfaceGeometry>,
    seeding: SeedingController,
    seed: Option<SeedOutcome>,
    broadcaster: PresenceBroadcaster,
    projector: CursorProjector,
    state: ConnectionState,
    /// When a syncing room starts accepting edits.
    ready_at: Option<Instant>,
}

pub struct EditorActor<T: Transport, E: EventEmitter> {
    config: SyncConfig,
    registry: SessionRegistry<T>,
    rooms: HashMap<RoomId, Room>,
    request_rx: mpsc::Receiver<EditorRequest>,
    inbound_rx: mpsc::Receiver<RoomInbound>,
    normalizer: CanonicalNormalizer,
    emitter: E,
}

impl<T: Transport, E: EventEmitter> EditorActor<T, E> {
    pub fn new(
        transport: T,
        config: SyncConfig,
        request_rx: mpsc::Receiver<EditorRequest>,
        emitter: E,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        Self {
            registry: SessionRegistry::new(transport, inbound_tx),
            rooms: HashMap::new(),
            request_rx,
            inbound_rx,
            normalizer: CanonicalNormalizer,
            emitter,
            config,
        }
    }

    pub async fn run(mut self) {
        let mut refresh = tokio::time::interval(self.config.cursor_refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                req = self.request_rx.recv() => {
                    match req {
                        Some(EditorRequest::Shutdown) | None => break,
                        Some(req) => self.handle_request(req).await,
                    }
                }
                Some(inbound) = self.inbound_rx.recv() => {
                    self.handle_inbound(inbound);
                }
                _ = refresh.tick() => {
                    self.check_ready();
                    self.tick();
                }
            }
        }

        self.registry.close_all();
        self.rooms.clear();
        info!("editor shutting down");
    }

    async fn handle_request(&mut self, request: EditorRequest) {
        match request {
            EditorRequest::OpenRoom {
                room,
                user,
                initial,
                surface,
                reply,
            } => {
                let result = self.open_room(room, user, &initial, surface).await;
                let _ = reply.send(result);
            }
            EditorRequest::CloseRoom { room, reply } => {
                let _ = reply.send(self.close_room(&room));
            }
            EditorRequest::Reconnect { room, reply } => {
                let result = self.reconnect(room).await;
                let _ = reply.send(result);
            }
            EditorRequest::ForRoom { room, request } => {
                self.handle_room_request(&room, request);
            }
            EditorRequest::Shutdown => {}
        }
    }

    async fn open_room(
        &mut self,
        room: RoomId,
        user: User,
        initial: &InitialContent,
        surface: Box<dyn SurfaceGeometry>,
    ) -> Result<LocalDocument, Report<EditorError>> {
        if let Ok(session) = self.registry.get_mut(&room)
            && let Some(document) = session.adapter().document()
        {
            debug!(%room, "room already open");
            return Ok(LocalDocument {
                tree: document.clone(),
                selection: session.adapter().selection().cloned(),
            });
        }
        let initial = self.normalizer.normalize(initial);
        let seeding = SeedingController::new(self.config.emptiness_policy);
        self.registry
            .open(&room)
            .await
            .change_context(EditorError)?;
        self.start_room(room, user, initial, surface, seeding)
    }

    /// Binds a fresh document to the room's new session, seeds it and
    /// announces presence.
    fn start_room(
        &mut self,
        room: RoomId,
        user: User,
        initial: Document,
        surface: Box<dyn SurfaceGeometry>,
        mut seeding: SeedingController,
    ) -> Result<LocalDocument, Report<EditorError>> {
        let session = self.registry.get_mut(&room).change_context(EditorError)?;
        session.bind(LocalDocument::default());

        let seed = match seeding.seed_if_empty(session.adapter_mut(), &initial) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(%room, ?err, "seeding failed");
                None
            }
        };
        if let Err(err) = session.flush_updates() {
            warn!(%room, ?err, "failed to send seeded content");
        }

        let mut broadcaster = PresenceBroadcaster::new(
            session.connection_id(),
            user.clone(),
            self.config.presence_throttle,
        );
        send_presence(session, &broadcaster.mount());

        let local = LocalDocument {
            tree: session.adapter().document().cloned().unwrap_or_else(Document::empty),
            selection: session.adapter().selection().cloned(),
        };
        let peers = session.presence().peers();

        let (state, ready_at) = if self.config.ready_delay.is_zero() {
            (ConnectionState::Ready, None)
        } else {
            (
                ConnectionState::Syncing,
                Some(Instant::now() + self.config.ready_delay),
            )
        };
        self.rooms.insert(
            room.clone(),
            Room {
                user,
                initial,
                surface,
                seeding,
                seed,
                broadcaster,
                projector: CursorProjector::new(),
                state,
                ready_at,
            },
        );

        info!(%room, ?seed, ?state, "room open");
        self.emitter.emit_connection_state(&ConnectionStatePayload {
            room: room.clone(),
            state,
        });
        if !peers.is_empty() {
            self.emitter
                .emit_presence_changed(&PresenceChangedPayload { room, peers });
        }
        Ok(local)
    }

    fn close_room(&mut self, room: &RoomId) -> bool {
        self.rooms.remove(room);
        self.registry.close(room)
    }

    /// Replaces the room's session with a fresh one. If the new connection
    /// fails the room keeps its current session and state.
    async fn reconnect(&mut self, room: RoomId) -> Result<LocalDocument, Report<EditorError>> {
        if !self.rooms.contains_key(&room) {
            return Err(Report::new(EditorError)
                .attach(UnknownRoom)
                .attach(RoomContext::new(room)));
        }
        info!(%room, "reconnecting");
        self.registry
            .reopen(&room)
            .await
            .change_context(EditorError)
            .attach(OperationContext::RECONNECTING)?;

        let Some(mut state) = self.rooms.remove(&room) else {
            return Err(Report::new(EditorError)
                .attach(UnknownRoom)
                .attach(RoomContext::new(room)));
        };
        state.seeding.reset();
        self.start_room(room, state.user, state.initial, state.surface, state.seeding)
            .attach(OperationContext::RECONNECTING)
    }

    fn handle_room_request(&mut self, room_id: &RoomId, request: RoomRequest) {
        let (Some(room), Ok(session)) = (self.rooms.get_mut(room_id), self.registry.get_mut(room_id))
        else {
            debug!(room = %room_id, "request for a room that is not open");
            return;
        };

        match request {
            RoomRequest::ApplyOperations { batch, reply } => {
                let result = apply_operations(room, session, &batch)
                    .attach_with(|| RoomContext::new(room_id.clone()));
                let _ = reply.send(result);
            }
            RoomRequest::GetDocument { reply } => {
                let _ = reply.send(LocalDocument {
                    tree: session.adapter().document().cloned().unwrap_or_else(Document::empty),
                    selection: session.adapter().selection().cloned(),
                });
            }
            RoomRequest::PointerMoved { x, y } => {
                let bounds = room.surface.bounds();
                if let Some(record) = room.broadcaster.pointer_moved(x, y, &bounds, Instant::now())
                {
                    send_presence(session, &record);
                }
            }
            RoomRequest::PointerLeft => {
                send_presence(session, &room.broadcaster.pointer_left());
            }
            RoomRequest::GetPeers { reply } => {
                let _ = reply.send(session.presence().peers());
            }
            RoomRequest::Subscribe { reply } => {
                let _ = reply.send(session.presence().subscribe());
            }
            RoomRequest::GetStatus { reply } => {
                let _ = reply.send(RoomStatus {
                    connection_id: session.connection_id(),
                    state: room.state,
                    seed: room.seed,
                    stats: session.adapter().stats(),
                });
            }
            RoomRequest::GetProjection { reply } => {
                let _ = reply.send(room.projector.last().cloned());
            }
        }
    }

    fn handle_inbound(&mut self, inbound: RoomInbound) {
        let RoomInbound {
            room: room_id,
            connection_id,
            event,
        } = inbound;
        let (Some(room), Ok(session)) =
            (self.rooms.get_mut(&room_id), self.registry.get_mut(&room_id))
        else {
            return;
        };
        if session.connection_id() != connection_id {
            trace!(room = %room_id, %connection_id, "dropping event from a stale connection");
            return;
        }

        let outcome = match event {
            LinkEvent::Frame(bytes) => match session.handle_frame(&bytes) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(room = %room_id, ?err, "failed to handle inbound frame");
                    return;
                }
            },
            LinkEvent::Closed => FrameOutcome::Closed,
        };

        match outcome {
            FrameOutcome::Document(committed) => {
                if !committed.content_changed && !committed.selection_changed {
                    return;
                }
                let Some(document) = session.adapter().document() else {
                    return;
                };
                self.emitter.emit_document_updated(&DocumentUpdatedPayload {
                    room: room_id.clone(),
                    document: document.clone(),
                    selection: session.adapter().selection().cloned(),
                });
                if committed.selection_changed
                    && let Some(record) = room
                        .broadcaster
                        .selection_changed(session.adapter().selection())
                {
                    send_presence(session, &record);
                }
            }
            FrameOutcome::Presence => {
                self.emitter.emit_presence_changed(&PresenceChangedPayload {
                    room: room_id.clone(),
                    peers: session.presence().peers(),
                });
                refresh_projection(&self.emitter, &room_id, room, session);
            }
            FrameOutcome::Closed => {
                if room.state == ConnectionState::Disconnected {
                    return;
                }
                warn!(room = %room_id, "connection closed by the room");
                room.state = ConnectionState::Disconnected;
                room.ready_at = None;
                self.emitter.emit_connection_state(&ConnectionStatePayload {
                    room: room_id,
                    state: ConnectionState::Disconnected,
                });
            }
            FrameOutcome::Ignored => {}
        }
    }

    fn check_ready(&mut self) {
        let now = Instant::now();
        for (room_id, room) in &mut self.rooms {
            if room.state != ConnectionState::Syncing
                || room.ready_at.is_some_and(|at| now < at)
            {
                continue;
            }
            room.ready_at = None;
            room.state = ConnectionState::Ready;
            debug!(room = %room_id, "room ready");
            self.emitter.emit_connection_state(&ConnectionStatePayload {
                room: room_id.clone(),
                state: ConnectionState::Ready,
            });
        }
    }

    /// Retries updates the transport could not take, sends throttled
    /// pointer moves and re-projects peers' cursors.
    fn tick(&mut self) {
        let now = Instant::now();
        for (room_id, room) in &mut self.rooms {
            let Ok(session) = self.registry.get_mut(room_id) else {
                continue;
            };
            if room.state != ConnectionState::Disconnected
                && session.is_connected()
                && let Err(err) = session.flush_updates()
            {
                debug!(room = %room_id, ?err, "failed to send pending updates");
            }
            if let Some(record) = room.broadcaster.flush_pending(now) {
                send_presence(session, &record);
            }
            refresh_projection(&self.emitter, room_id, room, session);
        }
    }
}

/// Re-projects peers' cursors and emits the result if it changed.
fn refresh_projection<E: EventEmitter>(
    emitter: &E,
    room_id: &RoomId,
    room: &mut Room,
    session: &Session,
) {
    let Some(document) = session.adapter().document() else {
        return;
    };
    let peers = session.presence().peers();
    if let Some(projection) = room.projector.refresh(&peers, document, room.surface.as_ref()) {
        emitter.emit_cursors_projected(&CursorsProjectedPayload {
            room: room_id.clone(),
            projection,
        });
    }
}

fn apply_operations(
    room: &mut Room,
    session: &mut Session,
    batch: &OperationBatch,
) -> Result<Committed, Report<EditorError>> {
    if room.state != ConnectionState::Ready {
        return Err(Report::new(EditorError)
            .attach(NotReady)
            .attach(format!("state: {:?}", room.state)));
    }
    let committed = session
        .adapter_mut()
        .apply_local(batch)
        .change_context(EditorError)?;
    if committed.forwarded
        && let Err(err) = session.flush_updates()
    {
        warn!(?err, "failed to send local updates");
    }
    if let Some(record) = room
        .broadcaster
        .selection_changed(session.adapter().selection())
    {
        send_presence(session, &record);
    }
    Ok(committed)
}

fn send_presence(session: &Session, record: &PresenceRecord) {
    if let Err(err) = session.send_presence(record) {
        debug!(room = %session.room(), ?err, "failed to publish presence");
    }
}
