//! In-process relay that implements [`Transport`] for any number of
//! editors on one runtime.
//!
//! Each room keeps the log of every update it has relayed; a joining
//! connection receives that log and the current presence of the room in its
//! handshake. A room can be held, in which case relayed frames queue until it
//! is released.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use error_stack::Report;
use tandem_core::{
    ClientFrame, ConnectionId, Handshake, PresenceRecord, RoomContext, RoomId, ServerFrame,
    Transport, TransportError, TransportLink, protocol,
};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
struct Member {
    sender: mpsc::Sender<Vec<u8>>,
    presence: Option<PresenceRecord>,
}

#[derive(Debug, Default)]
struct RoomState {
    updates: Vec<Vec<u8>>,
    members: BTreeMap<ConnectionId, Member>,
    held: Option<Vec<Delivery>>,
}

#[derive(Debug, Default)]
struct HubState {
    rooms: HashMap<RoomId, RoomState>,
    next_connection: u64,
    refuse: usize,
}

/// One encoded frame bound for one connection.
#[derive(Debug)]
struct Delivery {
    sender: mpsc::Sender<Vec<u8>>,
    bytes: Vec<u8>,
}

impl Delivery {
    async fn send(self) {
        if self.sender.send(self.bytes).await.is_err() {
            trace!("recipient gone");
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
    capacity: usize,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A hub whose per-connection channels hold `capacity` frames.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connect(&self, count: usize) {
        self.lock().refuse = count;
    }

    /// Connections currently in `room`.
    #[must_use]
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.lock()
            .rooms
            .get(room)
            .map(|state| state.members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of updates relayed through `room` so far.
    #[must_use]
    pub fn update_count(&self, room: &RoomId) -> usize {
        self.lock()
            .rooms
            .get(room)
            .map_or(0, |state| state.updates.len())
    }

    /// Polls until `room` has relayed at least `count` updates.
    pub async fn wait_for_updates(&self, room: &RoomId, count: usize) {
        while self.update_count(room) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Queue frames relayed in `room` instead of delivering them.
    pub fn hold(&self, room: &RoomId) {
        let mut state = self.lock();
        let room = state.rooms.entry(room.clone()).or_default();
        room.held.get_or_insert_with(Vec::new);
    }

    /// Deliver everything queued while `room` was held, in order.
    pub async fn release(&self, room: &RoomId) {
        let queued = self
            .lock()
            .rooms
            .get_mut(room)
            .and_then(|state| state.held.take())
            .unwrap_or_default();
        debug!(%room, frames = queued.len(), "releasing held frames");
        for delivery in queued {
            delivery.send().await;
        }
    }

    /// Drops `connection` from `room` as if the network failed. The
    /// connection is told it was closed and the other members see it leave.
    pub async fn disconnect(&self, room: &RoomId, connection: ConnectionId) {
        let mut deliveries = Vec::new();
        {
            let mut state = self.lock();
            let Some(room_state) = state.rooms.get_mut(room) else {
                return;
            };
            let Some(member) = room_state.members.remove(&connection) else {
                return;
            };
            if let Ok(bytes) = protocol::encode(&ServerFrame::Closed) {
                deliveries.push(Delivery {
                    sender: member.sender,
                    bytes,
                });
            }
            deliveries.extend(room_state.fan_out(connection, &ServerFrame::PeerLeft(connection)));
        }
        debug!(%room, %connection, "disconnected");
        for delivery in deliveries {
            delivery.send().await;
        }
    }

    fn join(&self, room: &RoomId) -> Result<TransportLink, Report<TransportError>> {
        let mut state = self.lock();
        if state.refuse > 0 {
            state.refuse -= 1;
            return Err(Report::new(TransportError)
                .attach("connection refused")
                .attach(RoomContext::new(room.clone())));
        }
        state.next_connection += 1;
        let connection_id = ConnectionId(state.next_connection);

        let (server_tx, inbound) = mpsc::channel(self.capacity);
        let (outbound, client_rx) = mpsc::channel(self.capacity);

        let room_state = state.rooms.entry(room.clone()).or_default();
        let handshake = Handshake {
            updates: room_state.updates.clone(),
            peers: room_state
                .members
                .values()
                .filter_map(|member| member.presence.clone())
                .collect(),
        };
        room_state.members.insert(
            connection_id,
            Member {
                sender: server_tx,
                presence: None,
            },
        );
        drop(state);

        debug!(%room, %connection_id, "connection joined");
        tokio::spawn(relay(self.clone(), room.clone(), connection_id, client_rx));
        Ok(TransportLink {
            connection_id,
            handshake,
            outbound,
            inbound,
        })
    }

    /// Applies one client frame to the room and collects what must be sent.
    fn accept(&self, room: &RoomId, from: ConnectionId, frame: ClientFrame) -> Vec<Delivery> {
        let mut state = self.lock();
        let Some(room_state) = state.rooms.get_mut(room) else {
            return Vec::new();
        };
        if !room_state.members.contains_key(&from) {
            trace!(%room, %from, "dropping frame from a departed connection");
            return Vec::new();
        }
        match frame {
            ClientFrame::Update { updates } => {
                room_state.updates.extend(updates.iter().cloned());
                room_state.fan_out(from, &ServerFrame::Update { from, updates })
            }
            ClientFrame::Presence(record) => {
                if let Some(member) = room_state.members.get_mut(&from) {
                    member.presence = Some(record.clone());
                }
                room_state.fan_out(from, &ServerFrame::Presence(record))
            }
            ClientFrame::Leave => {
                room_state.members.remove(&from);
                room_state.fan_out(from, &ServerFrame::PeerLeft(from))
            }
        }
    }
}

impl RoomState {
    /// Frames for every member except `from`, or nothing if the room is
    /// held, in which case they are queued.
    fn fan_out(&mut self, from: ConnectionId, frame: &ServerFrame) -> Vec<Delivery> {
        let bytes = match protocol::encode(frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(?err, "failed to encode server frame");
                return Vec::new();
            }
        };
        let deliveries: Vec<Delivery> = self
            .members
            .iter()
            .filter(|(id, _)| **id != from)
            .map(|(_, member)| Delivery {
                sender: member.sender.clone(),
                bytes: bytes.clone(),
            })
            .collect();
        match &mut self.held {
            Some(queue) => {
                queue.extend(deliveries);
                Vec::new()
            }
            None => deliveries,
        }
    }
}

/// Reads one connection's outbound frames until it leaves or hangs up.
async fn relay(
    hub: LoopbackHub,
    room: RoomId,
    from: ConnectionId,
    mut client_rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(bytes) = client_rx.recv().await {
        let frame: ClientFrame = match protocol::decode(&bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%room, %from, ?err, "dropping undecodable frame");
                continue;
            }
        };
        let leaving = matches!(frame, ClientFrame::Leave);
        for delivery in hub.accept(&room, from, frame) {
            delivery.send().await;
        }
        if leaving {
            debug!(%room, %from, "connection left");
            return;
        }
    }
    for delivery in hub.accept(&room, from, ClientFrame::Leave) {
        delivery.send().await;
    }
}

impl Transport for LoopbackHub {
    fn connect(
        &self,
        room: &RoomId,
    ) -> impl Future<Output = Result<TransportLink, Report<TransportError>>> + Send {
        let result = self.join(room);
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::User;

    use super::*;

    async fn recv(link: &mut TransportLink) -> ServerFrame {
        let bytes = tokio::time::timeout(Duration::from_secs(5), link.inbound.recv())
            .await
            .unwrap()
            .unwrap();
        protocol::decode(&bytes).unwrap()
    }

    async fn send(link: &TransportLink, frame: &ClientFrame) {
        link.outbound
            .send(protocol::encode(frame).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn relays_to_everyone_but_the_sender() {
        let hub = LoopbackHub::new();
        let room = RoomId::from("r");
        let a = hub.connect(&room).await.unwrap();
        let mut b = hub.connect(&room).await.unwrap();
        assert_ne!(a.connection_id, b.connection_id);

        send(&a, &ClientFrame::Update { updates: vec![vec![1, 2]] }).await;
        assert_eq!(
            recv(&mut b).await,
            ServerFrame::Update {
                from: a.connection_id,
                updates: vec![vec![1, 2]],
            }
        );
        hub.wait_for_updates(&room, 1).await;

        let c = hub.connect(&room).await.unwrap();
        assert_eq!(c.handshake.updates, vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn handshake_carries_presence() {
        let hub = LoopbackHub::new();
        let room = RoomId::from("r");
        let a = hub.connect(&room).await.unwrap();
        let mut b = hub.connect(&room).await.unwrap();
        let record = PresenceRecord::mounted(a.connection_id, User::new("Ann", "#f00"));
        send(&a, &ClientFrame::Presence(record.clone())).await;
        assert_eq!(recv(&mut b).await, ServerFrame::Presence(record.clone()));

        let c = hub.connect(&room).await.unwrap();
        assert_eq!(c.handshake.peers, vec![record]);
    }

    #[tokio::test]
    async fn leave_and_hangup_notify_peers() {
        let hub = LoopbackHub::new();
        let room = RoomId::from("r");
        let a = hub.connect(&room).await.unwrap();
        let b = hub.connect(&room).await.unwrap();
        let mut c = hub.connect(&room).await.unwrap();

        send(&a, &ClientFrame::Leave).await;
        assert_eq!(recv(&mut c).await, ServerFrame::PeerLeft(a.connection_id));

        let b_id = b.connection_id;
        drop(b);
        assert_eq!(recv(&mut c).await, ServerFrame::PeerLeft(b_id));
        assert_eq!(hub.members(&room), vec![c.connection_id]);
    }

    #[tokio::test]
    async fn held_frames_are_released_in_order() {
        let hub = LoopbackHub::new();
        let room = RoomId::from("r");
        let a = hub.connect(&room).await.unwrap();
        let mut b = hub.connect(&room).await.unwrap();

        hub.hold(&room);
        send(&a, &ClientFrame::Update { updates: vec![vec![1]] }).await;
        send(&a, &ClientFrame::Update { updates: vec![vec![2]] }).await;
        hub.wait_for_updates(&room, 2).await;
        assert!(b.inbound.try_recv().is_err());

        hub.release(&room).await;
        for expected in [1, 2] {
            assert_eq!(
                recv(&mut b).await,
                ServerFrame::Update {
                    from: a.connection_id,
                    updates: vec![vec![expected]],
                }
            );
        }
    }

    #[tokio::test]
    async fn disconnect_closes_the_connection() {
        let hub = LoopbackHub::new();
        let room = RoomId::from("r");
        let mut a = hub.connect(&room).await.unwrap();
        let mut b = hub.connect(&room).await.unwrap();

        hub.disconnect(&room, a.connection_id).await;
        assert_eq!(recv(&mut a).await, ServerFrame::Closed);
        assert_eq!(recv(&mut b).await, ServerFrame::PeerLeft(a.connection_id));
    }

    #[tokio::test]
    async fn refused_connections_fail() {
        let hub = LoopbackHub::new();
        hub.fail_next_connect(1);
        let room = RoomId::from("r");
        assert!(hub.connect(&room).await.is_err());
        assert!(hub.connect(&room).await.is_ok());
        assert_eq!(hub.members(&room).len(), 1);
    }
}
