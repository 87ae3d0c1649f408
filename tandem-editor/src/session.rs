//! Replication sessions: one open transport connection per room, its
//! replica, document adapter and presence channel.
//!
//! A session is created by [`SessionRegistry::open`] and torn down by
//! [`Session::close`]. Inbound frames are pumped by a forwarder task into the
//! owner's channel as [`RoomInbound`] events tagged with the connection they
//! arrived on.

use std::collections::HashMap;

use error_stack::{Report, ResultExt};
use tandem_core::{
    ClientFrame, ConnectionContext, ConnectionId, OperationContext, PresenceRecord,
    ReplicatedDocument, RoomContext, RoomId, ServerFrame, Transport, TransportLink, protocol,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::adapter::{Committed, DocumentAdapter, LocalDocument};
use crate::error::{ConnectionFailed, SessionError, UnknownRoom};
use crate::presence::PresenceChannel;
use crate::yrs_replica::YrsReplica;

/// Something that happened on a room's connection.
#[derive(Debug)]
pub enum LinkEvent {
    /// An encoded [`ServerFrame`].
    Frame(Vec<u8>),
    /// The transport dropped its end.
    Closed,
}

#[derive(Debug)]
pub struct RoomInbound {
    pub room: RoomId,
    pub connection_id: ConnectionId,
    pub event: LinkEvent,
}

/// Result of handling one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Document(Committed),
    /// The peer set changed.
    Presence,
    /// The room closed this connection.
    Closed,
    Ignored,
}

#[derive(Debug)]
struct Link {
    outbound: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
    forwarder: JoinHandle<()>,
}

impl Link {
    /// Stops forwarding and tells the room we are leaving.
    fn release(self) {
        self.cancel.cancel();
        send_leave(&self.outbound);
    }
}

fn send_leave(outbound: &mpsc::Sender<Vec<u8>>) {
    match protocol::encode(&ClientFrame::Leave) {
        Ok(bytes) => {
            if outbound.try_send(bytes).is_err() {
                debug!("transport gone before leave was sent");
            }
        }
        Err(err) => warn!(?err, "failed to encode leave frame"),
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
pub struct Session<R = YrsReplica> {
    room: RoomId,
    connection_id: ConnectionId,
    adapter: DocumentAdapter<R>,
    /// The replica while no local document is bound.
    replica: Option<R>,
    presence: PresenceChannel,
    link: Option<Link>,
}

impl<R: ReplicatedDocument + Default> Session<R> {
    /// Builds the replica from the handshake and starts forwarding inbound
    /// frames to `inbound`.
    fn start(
        room: RoomId,
        link: TransportLink,
        inbound: mpsc::Sender<RoomInbound>,
    ) -> Result<Self, Report<SessionError>> {
        let TransportLink {
            connection_id,
            handshake,
            outbound,
            inbound: frames,
        } = link;

        let mut replica = R::default();
        for update in &handshake.updates {
            if let Err(err) = replica.apply_update(update) {
                send_leave(&outbound);
                return Err(err
                    .change_context(SessionError)
                    .attach(OperationContext::APPLYING_HANDSHAKE)
                    .attach(ConnectionContext::new(connection_id)));
            }
        }

        let cancel = CancellationToken::new();
        let forwarder = tokio::spawn(forward_inbound(
            room.clone(),
            connection_id,
            frames,
            inbound,
            cancel.clone(),
        ));

        info!(
            %room,
            %connection_id,
            peers = handshake.peers.len(),
            updates = handshake.updates.len(),
            "session opened"
        );
        Ok(Self {
            room,
            connection_id,
            adapter: DocumentAdapter::new(),
            replica: Some(replica),
            presence: PresenceChannel::new(connection_id, handshake.peers),
            link: Some(Link {
                outbound,
                cancel,
                forwarder,
            }),
        })
    }
}

impl<R: ReplicatedDocument> Session<R> {
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn adapter(&self) -> &DocumentAdapter<R> {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut DocumentAdapter<R> {
        &mut self.adapter
    }

    #[must_use]
    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| !link.forwarder.is_finished())
    }

    /// Binds `local` to this session's replica. A previously bound document
    /// is unbound first and returned.
    pub fn bind(&mut self, local: LocalDocument) -> Option<LocalDocument> {
        let (previous, replica) = match self.adapter.unbind() {
            Some(binding) => (Some(binding.local), Some(binding.replica)),
            None => (None, self.replica.take()),
        };
        match replica {
            Some(replica) => {
                self.adapter.bind(local, replica);
            }
            None => warn!(room = %self.room, "session has no replica to bind"),
        }
        previous
    }

    /// Sends pending replica updates. They stay pending if the transport
    /// cannot take them right now.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the link is released or the frame cannot
    /// be encoded.
    pub fn flush_updates(&mut self) -> Result<usize, Report<SessionError>> {
        let Some(replica) = self.adapter.replica_mut() else {
            return Ok(0);
        };
        let Some(updates) = replica.flush() else {
            return Ok(0);
        };
        let count = updates.len();
        let bytes = protocol::encode(&ClientFrame::Update { updates })
            .change_context(SessionError)
            .attach(OperationContext::FORWARDING_LOCAL)?;
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| Report::new(SessionError).attach("link released"))?;
        match link.outbound.try_send(bytes) {
            Ok(()) => {
                replica.confirm_flush();
                trace!(room = %self.room, count, "sent updates");
                Ok(count)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(room = %self.room, "transport busy, keeping updates pending");
                Ok(0)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Report::new(SessionError)
                .attach("transport closed")
                .attach(RoomContext::new(self.room.clone()))),
        }
    }

    /// Publishes the local presence record to the room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the link is released or closed.
    pub fn send_presence(&self, record: &PresenceRecord) -> Result<(), Report<SessionError>> {
        let bytes = self
            .presence
            .publish(record)
            .change_context(SessionError)
            .attach(OperationContext::PUBLISHING_PRESENCE)?;
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| Report::new(SessionError).attach("link released"))?;
        link.outbound
            .try_send(bytes)
            .map_err(|_| Report::new(SessionError).attach(OperationContext::PUBLISHING_PRESENCE))
    }

    /// Applies one frame received from the room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the frame does not decode or an update is
    /// rejected by the replica.
    pub fn handle_frame(&mut self, bytes: &[u8]) -> Result<FrameOutcome, Report<SessionError>> {
        let frame: ServerFrame = protocol::decode(bytes).change_context(SessionError)?;
        match frame {
            ServerFrame::Update { from, updates } => {
                if from == self.connection_id {
                    return Ok(FrameOutcome::Ignored);
                }
                if let Some(replica) = self.replica.as_mut() {
                    for update in &updates {
                        replica
                            .apply_update(update)
                            .change_context(SessionError)
                            .attach(OperationContext::APPLYING_REMOTE)?;
                    }
                    return Ok(FrameOutcome::Ignored);
                }
                let mut total = Committed::default();
                for update in &updates {
                    let committed = self
                        .adapter
                        .apply_remote(update)
                        .change_context(SessionError)
                        .attach(ConnectionContext::new(from))?;
                    total.content_changed |= committed.content_changed;
                    total.selection_changed |= committed.selection_changed;
                    total.repaired |= committed.repaired;
                }
                Ok(FrameOutcome::Document(total))
            }
            ServerFrame::Presence(record) => Ok(if self.presence.upsert(record) {
                FrameOutcome::Presence
            } else {
                FrameOutcome::Ignored
            }),
            ServerFrame::PeerLeft(peer) => Ok(if self.presence.remove(peer) {
                FrameOutcome::Presence
            } else {
                FrameOutcome::Ignored
            }),
            ServerFrame::Closed => Ok(FrameOutcome::Closed),
        }
    }

    /// Tears the session down: unbinds the document, closes presence,
    /// disposes the replica and finally releases the connection.
    pub fn close(mut self) -> Option<LocalDocument> {
        let binding = self.adapter.unbind();
        self.presence.close();

        let (local, replica) = match binding {
            Some(binding) => (Some(binding.local), Some(binding.replica)),
            None => (None, self.replica.take()),
        };
        if let Some(mut replica) = replica
            && let Err(err) = replica.dispose()
        {
            warn!(room = %self.room, ?err, "{}", OperationContext::DISPOSING);
        }

        if let Some(link) = self.link.take() {
            link.release();
        }
        info!(room = %self.room, connection_id = %self.connection_id, "session closed");
        local
    }
}

async fn forward_inbound(
    room: RoomId,
    connection_id: ConnectionId,
    mut frames: mpsc::Receiver<Vec<u8>>,
    inbound: mpsc::Sender<RoomInbound>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            frame = frames.recv() => match frame {
                Some(bytes) => LinkEvent::Frame(bytes),
                None => LinkEvent::Closed,
            },
        };
        let closed = matches!(event, LinkEvent::Closed);
        let message = RoomInbound {
            room: room.clone(),
            connection_id,
            event,
        };
        if inbound.send(message).await.is_err() || closed {
            return;
        }
    }
}

/// Open sessions, at most one per room.
#[derive(Debug)]
pub struct SessionRegistry<T, R = YrsReplica> {
    transport: T,
    inbound: mpsc::Sender<RoomInbound>,
    sessions: HashMap<RoomId, Session<R>>,
}

impl<T: Transport, R: ReplicatedDocument + Default> SessionRegistry<T, R> {
    /// Inbound events of every session are delivered to `inbound`.
    pub fn new(transport: T, inbound: mpsc::Sender<RoomInbound>) -> Self {
        Self {
            transport,
            inbound,
            sessions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens a session for `room`, or returns the one already open.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] with [`ConnectionFailed`] attached if the
    /// transport cannot connect; no session is recorded in that case.
    pub async fn open(&mut self, room: &RoomId) -> Result<&mut Session<R>, Report<SessionError>> {
        if self.sessions.contains_key(room) {
            return self.get_mut(room);
        }
        let session = self.connect(room).await?;
        Ok(self.sessions.entry(room.clone()).or_insert(session))
    }

    /// Opens a new session for `room` and only then closes the one it
    /// replaces. A failed attempt leaves the previous session in place.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] with [`ConnectionFailed`] attached if the
    /// transport cannot connect.
    pub async fn reopen(&mut self, room: &RoomId) -> Result<&mut Session<R>, Report<SessionError>> {
        let session = self.connect(room).await?;
        if let Some(previous) = self.sessions.insert(room.clone(), session) {
            previous.close();
        }
        self.get_mut(room)
    }

    async fn connect(&self, room: &RoomId) -> Result<Session<R>, Report<SessionError>> {
        let link = self
            .transport
            .connect(room)
            .await
            .change_context(SessionError)
            .attach(ConnectionFailed)
            .attach(OperationContext::OPENING_SESSION)
            .attach_with(|| RoomContext::new(room.clone()))?;
        Session::start(room.clone(), link, self.inbound.clone())
            .attach_with(|| RoomContext::new(room.clone()))
    }

    #[must_use]
    pub fn is_open(&self, room: &RoomId) -> bool {
        self.sessions.contains_key(room)
    }

    #[must_use]
    pub fn get(&self, room: &RoomId) -> Option<&Session<R>> {
        self.sessions.get(room)
    }

    /// # Errors
    ///
    /// Returns [`SessionError`] with [`UnknownRoom`] if no session is open.
    pub fn get_mut(&mut self, room: &RoomId) -> Result<&mut Session<R>, Report<SessionError>> {
        self.sessions.get_mut(room).ok_or_else(|| {
            Report::new(SessionError)
                .attach(UnknownRoom)
                .attach(RoomContext::new(room.clone()))
        })
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.sessions.keys()
    }

    /// Closes the session for `room`. Returns whether one was open.
    pub fn close(&mut self, room: &RoomId) -> bool {
        match self.sessions.remove(room) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.close();
        }
    }
}
