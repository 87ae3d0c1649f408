//! Collaborative editing core: replication sessions over a [`Transport`],
//! the adapter between an editor tree and its replica, bootstrap seeding,
//! presence and cursor projection, driven by a single actor.
//!
//! [`Transport`]: tandem_core::Transport

#![warn(clippy::pedantic)]

pub mod actor;
pub mod adapter;
pub mod error;
pub mod handle;
pub mod loopback;
pub mod monospace;
pub mod presence;
pub mod projector;
pub mod seeding;
pub mod session;
pub mod translate;
pub mod types;
pub mod yrs_replica;

pub use actor::EditorActor;
pub use adapter::{AdapterStats, ApplyState, Committed, DocumentAdapter, LocalDocument};
pub use error::{AdapterError, EditorError, SessionError};
pub use handle::{EditorHandle, spawn_editor};
pub use loopback::LoopbackHub;
pub use monospace::MonospaceSurface;
pub use presence::{PeerSet, PresenceBroadcaster, PresenceChannel, Subscription};
pub use projector::{CursorProjector, Projection};
pub use seeding::{SeedOutcome, SeedingController};
pub use session::{Session, SessionRegistry};
pub use types::{ConnectionState, EventEmitter, RoomStatus, TracingEmitter};
pub use yrs_replica::YrsReplica;
