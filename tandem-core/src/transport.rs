//! The replication transport contract.

use std::future::Future;

use error_stack::Report;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{ConnectionId, Handshake, RoomId};

/// An open connection to a room.
///
/// `outbound` carries encoded [`ClientFrame`](crate::protocol::ClientFrame)s,
/// `inbound` encoded [`ServerFrame`](crate::protocol::ServerFrame)s. Frames
/// from one peer arrive in the order that peer sent them.
#[derive(Debug)]
pub struct TransportLink {
    pub connection_id: ConnectionId,
    pub handshake: Handshake,
    pub outbound: mpsc::Sender<Vec<u8>>,
    pub inbound: mpsc::Receiver<Vec<u8>>,
}

pub trait Transport: Send + Sync + 'static {
    /// Join `room`, receiving its current state in the handshake.
    fn connect(
        &self,
        room: &RoomId,
    ) -> impl Future<Output = Result<TransportLink, Report<TransportError>>> + Send;
}
