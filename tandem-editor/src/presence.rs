//! Presence channel and broadcaster.
//!
//! The channel tracks every other connection's [`PresenceRecord`] and hands
//! the full peer set to subscribers on each change. The broadcaster owns the
//! local record and decides when a change is worth publishing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use tandem_core::{
    ClientFrame, CodecError, ConnectionId, CursorPosition, LogicalRange, PresenceRecord,
    PresenceUpdate, Rect, User, protocol,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

/// Snapshot of all remote peers, ordered by connection id.
pub type PeerSet = Arc<Vec<PresenceRecord>>;

#[derive(Debug)]
pub struct PresenceChannel {
    local: ConnectionId,
    peers: BTreeMap<ConnectionId, PresenceRecord>,
    sender: Option<watch::Sender<PeerSet>>,
}

impl PresenceChannel {
    /// Starts with the peers reported in the room handshake.
    #[must_use]
    pub fn new(local: ConnectionId, peers: Vec<PresenceRecord>) -> Self {
        let peers: BTreeMap<_, _> = peers
            .into_iter()
            .filter(|record| record.connection_id != local)
            .map(|record| (record.connection_id, record))
            .collect();
        let initial: PeerSet = Arc::new(peers.values().cloned().collect());
        let (sender, _) = watch::channel(initial);
        Self {
            local,
            peers,
            sender: Some(sender),
        }
    }

    /// Encodes the local record as a frame for the transport.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the frame cannot be encoded.
    pub fn publish(&self, record: &PresenceRecord) -> Result<Vec<u8>, Report<CodecError>> {
        protocol::encode(&ClientFrame::Presence(record.clone()))
    }

    /// Subscribers see the full peer set after every change, and observe
    /// closure when the channel closes.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let receiver = match &self.sender {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(self.peers());
                drop(sender);
                receiver
            }
        };
        Subscription { receiver }
    }

    #[must_use]
    pub fn peers(&self) -> PeerSet {
        Arc::new(self.peers.values().cloned().collect())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Records a peer's presence. Returns whether the peer set changed.
    pub fn upsert(&mut self, record: PresenceRecord) -> bool {
        if record.connection_id == self.local || self.is_closed() {
            return false;
        }
        if self.peers.get(&record.connection_id) == Some(&record) {
            return false;
        }
        trace!(peer = %record.connection_id, "peer presence updated");
        self.peers.insert(record.connection_id, record);
        self.notify();
        true
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> bool {
        if self.peers.remove(&connection_id).is_none() {
            return false;
        }
        self.notify();
        true
    }

    pub fn close(&mut self) {
        self.peers.clear();
        self.sender = None;
    }

    fn notify(&self) {
        if let Some(sender) = &self.sender {
            sender.send_replace(self.peers());
        }
    }
}

/// A view of the peer set that follows every change.
#[derive(Debug, Clone)]
pub struct Subscription {
    receiver: watch::Receiver<PeerSet>,
}

impl Subscription {
    #[must_use]
    pub fn current(&self) -> PeerSet {
        self.receiver.borrow().clone()
    }

    /// Waits for the next change. `None` once the channel has closed.
    pub async fn changed(&mut self) -> Option<PeerSet> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

/// Owns the local presence record.
#[derive(Debug)]
pub struct PresenceBroadcaster {
    record: PresenceRecord,
    throttle: Duration,
    last_pointer: Option<Instant>,
    pending_pointer: Option<CursorPosition>,
}

impl PresenceBroadcaster {
    #[must_use]
    pub fn new(connection_id: ConnectionId, user: User, throttle: Duration) -> Self {
        Self {
            record: PresenceRecord::mounted(connection_id, user),
            throttle,
            last_pointer: None,
            pending_pointer: None,
        }
    }

    #[must_use]
    pub fn record(&self) -> &PresenceRecord {
        &self.record
    }

    /// The record announced when the editor mounts: identity only.
    pub fn mount(&mut self) -> PresenceRecord {
        self.pending_pointer = None;
        self.publish(PresenceUpdate {
            cursor: Some(None),
            selection: Some(None),
        })
    }

    /// Merges a partial update and returns the full record to send.
    pub fn publish(&mut self, update: PresenceUpdate) -> PresenceRecord {
        self.record.merge(update);
        self.record.clone()
    }

    /// A pointer move in viewport coordinates. Returns a record to send
    /// unless the move falls inside the throttle window, in which case it is
    /// kept for [`flush_pending`](Self::flush_pending).
    pub fn pointer_moved(
        &mut self,
        x: f64,
        y: f64,
        bounds: &Rect,
        now: Instant,
    ) -> Option<PresenceRecord> {
        let position = CursorPosition::new(x - bounds.left, y - bounds.top);
        if let Some(last) = self.last_pointer
            && now.duration_since(last) < self.throttle
        {
            self.pending_pointer = Some(position);
            return None;
        }
        self.pending_pointer = None;
        self.last_pointer = Some(now);
        Some(self.publish(PresenceUpdate::cursor(Some(position))))
    }

    pub fn pointer_left(&mut self) -> PresenceRecord {
        self.pending_pointer = None;
        self.publish(PresenceUpdate::cursor(None))
    }

    /// Publishes the local selection if it differs from the last one sent.
    pub fn selection_changed(&mut self, selection: Option<&LogicalRange>) -> Option<PresenceRecord> {
        if self.record.selection.as_ref() == selection {
            return None;
        }
        Some(self.publish(PresenceUpdate::selection(selection.cloned())))
    }

    /// Sends a throttled pointer move once its window has passed.
    pub fn flush_pending(&mut self, now: Instant) -> Option<PresenceRecord> {
        let position = self.pending_pointer?;
        if let Some(last) = self.last_pointer
            && now.duration_since(last) < self.throttle
        {
            return None;
        }
        self.pending_pointer = None;
        self.last_pointer = Some(now);
        Some(self.publish(PresenceUpdate::cursor(Some(position))))
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::Point;

    use super::*;

    fn record(id: u64, name: &str) -> PresenceRecord {
        PresenceRecord::mounted(ConnectionId(id), User::new(name, "#123"))
    }

    #[test]
    fn channel_excludes_self() {
        let channel = PresenceChannel::new(ConnectionId(1), vec![record(1, "me"), record(2, "you")]);
        let peers = channel.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].user.name, "you");
    }

    #[tokio::test]
    async fn subscribers_see_full_peer_set_on_change() {
        let mut channel = PresenceChannel::new(ConnectionId(1), vec![record(2, "b")]);
        let mut subscription = channel.subscribe();
        assert_eq!(subscription.current().len(), 1);

        assert!(channel.upsert(record(3, "c")));
        let peers = subscription.changed().await.unwrap();
        assert_eq!(
            peers.iter().map(|r| r.connection_id).collect::<Vec<_>>(),
            vec![ConnectionId(2), ConnectionId(3)]
        );

        assert!(!channel.upsert(record(3, "c")));
        assert!(channel.remove(ConnectionId(2)));
        let peers = subscription.changed().await.unwrap();
        assert_eq!(peers.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_observe_closure() {
        let mut channel = PresenceChannel::new(ConnectionId(1), vec![]);
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();
        channel.close();
        assert!(first.changed().await.is_none());
        assert!(second.changed().await.is_none());
        assert!(channel.subscribe().changed().await.is_none());
        assert!(!channel.upsert(record(2, "late")));
    }

    #[test]
    fn published_frames_decode() {
        let channel = PresenceChannel::new(ConnectionId(1), vec![]);
        let bytes = channel.publish(&record(1, "me")).unwrap();
        let frame: ClientFrame = protocol::decode(&bytes).unwrap();
        assert_eq!(frame, ClientFrame::Presence(record(1, "me")));
    }

    #[test]
    fn every_record_carries_the_user() {
        let user = User::new("Ada", "#f0f").with_id("ada-1");
        let mut broadcaster =
            PresenceBroadcaster::new(ConnectionId(4), user.clone(), Duration::from_millis(50));
        let mounted = broadcaster.mount();
        assert_eq!(mounted.user, user);
        assert_eq!(mounted.cursor, None);
        assert_eq!(mounted.selection, None);

        let left = broadcaster.pointer_left();
        assert_eq!(left.user, user);
    }

    #[test]
    fn pointer_coordinates_are_surface_relative() {
        let mut broadcaster =
            PresenceBroadcaster::new(ConnectionId(1), User::new("a", "b"), Duration::ZERO);
        let bounds = Rect::new(100.0, 40.0, 800.0, 600.0);
        let sent = broadcaster
            .pointer_moved(140.0, 130.0, &bounds, Instant::now())
            .unwrap();
        assert_eq!(sent.cursor, Some(CursorPosition::new(100.0, 30.0)));
    }

    #[test]
    fn pointer_moves_are_throttled_and_flushed() {
        let mut broadcaster = PresenceBroadcaster::new(
            ConnectionId(1),
            User::new("a", "b"),
            Duration::from_millis(50),
        );
        let bounds = Rect::default();
        let start = Instant::now();
        assert!(broadcaster.pointer_moved(1.0, 1.0, &bounds, start).is_some());
        assert!(
            broadcaster
                .pointer_moved(2.0, 2.0, &bounds, start + Duration::from_millis(10))
                .is_none()
        );
        assert!(
            broadcaster
                .flush_pending(start + Duration::from_millis(20))
                .is_none()
        );
        let flushed = broadcaster
            .flush_pending(start + Duration::from_millis(60))
            .unwrap();
        assert_eq!(flushed.cursor, Some(CursorPosition::new(2.0, 2.0)));
        assert!(
            broadcaster
                .flush_pending(start + Duration::from_millis(200))
                .is_none()
        );
    }

    #[test]
    fn selection_is_published_only_on_change() {
        let mut broadcaster =
            PresenceBroadcaster::new(ConnectionId(1), User::new("a", "b"), Duration::ZERO);
        let range = LogicalRange::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 3));
        assert!(broadcaster.selection_changed(Some(&range)).is_some());
        assert!(broadcaster.selection_changed(Some(&range)).is_none());
        let cleared = broadcaster.selection_changed(None).unwrap();
        assert_eq!(cleared.selection, None);
    }

    #[test]
    fn pointer_leave_drops_pending_move() {
        let mut broadcaster = PresenceBroadcaster::new(
            ConnectionId(1),
            User::new("a", "b"),
            Duration::from_millis(50),
        );
        let start = Instant::now();
        broadcaster.pointer_moved(1.0, 1.0, &Rect::default(), start);
        broadcaster.pointer_moved(5.0, 5.0, &Rect::default(), start);
        assert_eq!(broadcaster.pointer_left().cursor, None);
        assert!(
            broadcaster
                .flush_pending(start + Duration::from_secs(1))
                .is_none()
        );
    }
}
