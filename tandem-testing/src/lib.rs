//! Test utilities for tandem integration tests.

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tandem_core::{
    Alignment, Block, BlockKind, Document, InitialContent, Leaf, LogicalRange, Marks, Node,
    NodeProps, NodeRef, Operation, OperationBatch, Path, Point, RoomId, SyncConfig, User,
};
use tandem_editor::types::{
    ConnectionStatePayload, CursorsProjectedPayload, DocumentUpdatedPayload,
    PresenceChangedPayload,
};
use tandem_editor::{
    ConnectionState, EditorHandle, EventEmitter, LocalDocument, LoopbackHub, MonospaceSurface,
    PeerSet, RoomStatus, spawn_editor,
};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

/// How long a `wait_*` helper polls before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Safe to call multiple times.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tandem_editor=debug,tandem_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Short intervals so tests don't wait on timers.
#[must_use]
pub fn test_config() -> SyncConfig {
    SyncConfig {
        cursor_refresh: Duration::from_millis(5),
        presence_throttle: Duration::ZERO,
        ..SyncConfig::default()
    }
}

/// Polls `condition` until it holds.
///
/// # Panics
/// Panics if `condition` does not hold within [`WAIT_TIMEOUT`].
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let polled = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone)]
pub enum EditorEvent {
    DocumentUpdated(DocumentUpdatedPayload),
    PresenceChanged(PresenceChangedPayload),
    CursorsProjected(CursorsProjectedPayload),
    ConnectionState(ConnectionStatePayload),
}

/// Forwards every emitted event into a channel.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<EditorEvent>,
}

impl ChannelEmitter {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EditorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: EditorEvent) {
        let _ = self.tx.send(event);
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit_document_updated(&self, payload: &DocumentUpdatedPayload) {
        self.send(EditorEvent::DocumentUpdated(payload.clone()));
    }

    fn emit_presence_changed(&self, payload: &PresenceChangedPayload) {
        self.send(EditorEvent::PresenceChanged(payload.clone()));
    }

    fn emit_cursors_projected(&self, payload: &CursorsProjectedPayload) {
        self.send(EditorEvent::CursorsProjected(payload.clone()));
    }

    fn emit_connection_state(&self, payload: &ConnectionStatePayload) {
        self.send(EditorEvent::ConnectionState(payload.clone()));
    }
}

// =============================================================================
// Peers
// =============================================================================

/// One editor joined to one room through a shared hub.
pub struct TestPeer {
    pub name: String,
    pub room: RoomId,
    pub handle: EditorHandle,
    pub events: mpsc::UnboundedReceiver<EditorEvent>,
}

impl TestPeer {
    /// Spawns an editor without opening any room.
    #[must_use]
    pub fn spawn(hub: &LoopbackHub, room: &RoomId, name: &str, config: SyncConfig) -> Self {
        let (emitter, events) = ChannelEmitter::channel();
        Self {
            name: name.to_owned(),
            room: room.clone(),
            handle: spawn_editor(hub.clone(), config, emitter),
            events,
        }
    }

    /// Spawns an editor and opens `room` with `initial` content.
    ///
    /// # Panics
    /// Panics if the room cannot be opened.
    pub async fn join(
        hub: &LoopbackHub,
        room: &RoomId,
        name: &str,
        initial: impl Into<InitialContent>,
    ) -> Self {
        Self::join_with(hub, room, name, initial, test_config()).await
    }

    /// # Panics
    /// Panics if the room cannot be opened.
    pub async fn join_with(
        hub: &LoopbackHub,
        room: &RoomId,
        name: &str,
        initial: impl Into<InitialContent>,
        config: SyncConfig,
    ) -> Self {
        let peer = Self::spawn(hub, room, name, config);
        peer.handle
            .open_room(room, peer.user(), initial, MonospaceSurface::default())
            .await
            .expect("open room");
        peer
    }

    #[must_use]
    pub fn user(&self) -> User {
        User::new(self.name.clone(), "#336699").with_id(format!("{}-id", self.name))
    }

    /// # Panics
    /// Panics if the room is not open.
    pub async fn document(&self) -> LocalDocument {
        self.handle.document(&self.room).await.expect("document")
    }

    pub async fn text(&self) -> String {
        self.document().await.tree.plain_text()
    }

    /// # Panics
    /// Panics if the room is not open.
    pub async fn status(&self) -> RoomStatus {
        self.handle.status(&self.room).await.expect("status")
    }

    /// # Panics
    /// Panics if the room is not open.
    pub async fn peers(&self) -> PeerSet {
        self.handle.peers(&self.room).await.expect("peers")
    }

    /// # Panics
    /// Panics if the batch is rejected.
    pub async fn apply(&self, operations: Vec<Operation>) {
        self.handle
            .apply(&self.room, OperationBatch::new(operations))
            .await
            .expect("apply batch");
    }

    /// Types `text` at `offset` in the leaf at `path`.
    pub async fn type_text(&self, path: &[usize], offset: usize, text: &str) {
        self.apply(vec![Operation::InsertText {
            path: path.to_vec(),
            offset,
            text: text.to_owned(),
        }])
        .await;
    }

    pub async fn select(&self, anchor: Point, focus: Point) {
        self.apply(vec![Operation::SetSelection {
            selection: Some(LogicalRange::new(anchor, focus)),
        }])
        .await;
    }

    pub async fn wait_for_text(&self, expected: &str) {
        wait_until(&format!("{} to read {expected:?}", self.name), move || async move {
            self.text().await == expected
        })
        .await;
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        wait_until(&format!("{} to be {state:?}", self.name), move || async move {
            self.status().await.state == state
        })
        .await;
    }

    /// Waits until the peer set satisfies `condition` and returns it.
    pub async fn wait_for_peers(&self, condition: impl Fn(&PeerSet) -> bool) -> PeerSet {
        let condition = &condition;
        wait_until(&format!("{}'s peers", self.name), move || async move {
            condition(&self.peers().await)
        })
        .await;
        self.peers().await
    }

    /// Drains events received so far.
    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Waits until every peer reads the same text and returns it.
pub async fn converged(peers: &[TestPeer]) -> String {
    wait_until("peers to converge", move || async move {
        let mut texts = Vec::with_capacity(peers.len());
        for peer in peers {
            texts.push(peer.text().await);
        }
        texts.windows(2).all(|pair| pair[0] == pair[1])
    })
    .await;
    peers[0].text().await
}

/// Waits until every peer holds the same tree and returns it.
pub async fn converged_documents(peers: &[TestPeer]) -> Document {
    wait_until("documents to converge", move || async move {
        let reference = peers[0].document().await.tree;
        for peer in &peers[1..] {
            if peer.document().await.tree != reference {
                return false;
            }
        }
        true
    })
    .await;
    peers[0].document().await.tree
}

/// At least one top-level block, and every block, nested ones included,
/// has a child.
#[must_use]
pub fn well_formed(document: &Document) -> bool {
    fn block_ok(block: &Block) -> bool {
        !block.children.is_empty()
            && block.children.iter().all(|child| match child {
                Node::Block(inner) => block_ok(inner),
                Node::Leaf(_) => true,
            })
    }
    !document.children.is_empty() && document.children.iter().all(block_ok)
}

// =============================================================================
// Random edits
// =============================================================================

const ALPHABET: &[char] = &['a', 'b', 'c', 'x', 'y', 'z', ' ', 'é', '✓'];

type Located<'a> = (Path, NodeRef<'a>);

/// Generates edits that are valid against the document they are built for,
/// covering every content operation the editing surface can emit.
pub struct RandomEditor {
    rng: StdRng,
}

impl RandomEditor {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn word(&mut self) -> String {
        let len = self.rng.random_range(1..=4);
        (0..len)
            .map(|_| ALPHABET[self.rng.random_range(0..ALPHABET.len())])
            .collect()
    }

    fn pick<'n, T>(&mut self, items: &'n [T]) -> Option<&'n T> {
        if items.is_empty() {
            return None;
        }
        Some(&items[self.rng.random_range(0..items.len())])
    }

    /// Every node below the root, depth first, with its path.
    fn nodes(document: &Document) -> Vec<Located<'_>> {
        fn visit<'a>(path: &mut Path, node: NodeRef<'a>, out: &mut Vec<Located<'a>>) {
            out.push((path.clone(), node));
            if let NodeRef::Block(block) = node {
                for (index, child) in block.children.iter().enumerate() {
                    path.push(index);
                    visit(path, child.as_ref(), out);
                    path.pop();
                }
            }
        }
        let mut out = Vec::new();
        for (index, block) in document.children.iter().enumerate() {
            visit(&mut vec![index], NodeRef::Block(block), &mut out);
        }
        out
    }

    fn boundary(&mut self, text: &str) -> usize {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(index, _)| index)
            .chain([text.len()])
            .collect();
        boundaries[self.rng.random_range(0..boundaries.len())]
    }

    /// One operation valid against `document`.
    pub fn next_operation(&mut self, document: &Document) -> Operation {
        let nodes = Self::nodes(document);
        let structural = match self.rng.random_range(0..100) {
            0..10 => Some(self.insert_block(document)),
            10..18 => self.remove(document, &nodes),
            18..26 => self.split(&nodes),
            26..34 => self.merge(document, &nodes),
            34..40 => self.move_block(document),
            40..48 => self.set_props(&nodes),
            _ => None,
        };
        if let Some(operation) = structural {
            return operation;
        }
        let leaves: Vec<(Path, &Leaf)> = nodes
            .iter()
            .filter_map(|(path, node)| match node {
                NodeRef::Leaf(leaf) => Some((path.clone(), *leaf)),
                NodeRef::Block(_) => None,
            })
            .collect();
        match self.edit_text(&leaves) {
            Some(operation) => operation,
            None => self.insert_block(document),
        }
    }

    fn insert_block(&mut self, document: &Document) -> Operation {
        let index = self.rng.random_range(0..=document.children.len());
        Operation::InsertNode {
            path: vec![index],
            node: Node::Block(Block::text(self.word())),
        }
    }

    /// Any node except the only top-level block.
    fn remove(&mut self, document: &Document, nodes: &[Located<'_>]) -> Option<Operation> {
        let candidates: Vec<&Path> = nodes
            .iter()
            .map(|(path, _)| path)
            .filter(|path| path.len() > 1 || document.children.len() > 1)
            .collect();
        let path = self.pick(&candidates)?;
        Some(Operation::RemoveNode {
            path: (*path).clone(),
        })
    }

    fn split(&mut self, nodes: &[Located<'_>]) -> Option<Operation> {
        let (path, node) = self.pick(nodes)?;
        let position = match node {
            NodeRef::Leaf(leaf) => self.boundary(&leaf.text),
            NodeRef::Block(block) => self.rng.random_range(0..=block.children.len()),
        };
        Some(Operation::SplitNode {
            path: path.clone(),
            position,
        })
    }

    /// A node whose previous sibling has the same shape.
    fn merge(&mut self, document: &Document, nodes: &[Located<'_>]) -> Option<Operation> {
        let candidates: Vec<&Path> = nodes
            .iter()
            .filter(|(path, node)| {
                let Some((&last, parent)) = path.split_last() else {
                    return false;
                };
                if last == 0 {
                    return false;
                }
                let mut previous = parent.to_vec();
                previous.push(last - 1);
                matches!(
                    (document.node(&previous), node),
                    (Some(NodeRef::Leaf(_)), NodeRef::Leaf(_))
                        | (Some(NodeRef::Block(_)), NodeRef::Block(_))
                )
            })
            .map(|(path, _)| path)
            .collect();
        let path = self.pick(&candidates)?;
        Some(Operation::MergeNode {
            path: (*path).clone(),
        })
    }

    /// Reorders a top-level block or nests it inside another one.
    fn move_block(&mut self, document: &Document) -> Option<Operation> {
        let count = document.children.len();
        if count < 2 {
            return None;
        }
        let from = self.rng.random_range(0..count);
        // `to` addresses the tree with `from` already removed
        let to = if self.rng.random_bool(0.5) {
            vec![self.rng.random_range(0..count)]
        } else {
            let target = self.rng.random_range(0..count - 1);
            let original = if target >= from { target + 1 } else { target };
            let children = document.children[original].children.len();
            vec![target, self.rng.random_range(0..=children)]
        };
        Some(Operation::MoveNode {
            path: vec![from],
            to,
        })
    }

    fn set_props(&mut self, nodes: &[Located<'_>]) -> Option<Operation> {
        let (path, node) = self.pick(nodes)?;
        let props = match node {
            NodeRef::Block(_) => {
                let kind = match self.rng.random_range(0..4) {
                    0 => BlockKind::Paragraph,
                    1 => BlockKind::Heading {
                        level: self.rng.random_range(1..=3),
                    },
                    2 => BlockKind::Quote,
                    _ => BlockKind::CodeBlock,
                };
                let align = match self.rng.random_range(0..3) {
                    0 => None,
                    1 => Some(Alignment::Center),
                    _ => Some(Alignment::Right),
                };
                NodeProps::Block { kind, align }
            }
            NodeRef::Leaf(_) => NodeProps::Leaf {
                marks: Marks {
                    bold: self.rng.random_bool(0.5),
                    italic: self.rng.random_bool(0.5),
                    ..Marks::default()
                },
            },
        };
        Some(Operation::SetNode {
            path: path.clone(),
            props,
        })
    }

    fn edit_text(&mut self, leaves: &[(Path, &Leaf)]) -> Option<Operation> {
        let (path, leaf) = self.pick(leaves)?;
        let text = leaf.text.as_str();
        if self.rng.random_bool(0.3) && !text.is_empty() {
            let a = self.boundary(text);
            let b = self.boundary(text);
            let (start, end) = (a.min(b), a.max(b));
            if start < end {
                return Some(Operation::RemoveText {
                    path: path.clone(),
                    offset: start,
                    text: text[start..end].to_owned(),
                });
            }
        }
        let offset = self.boundary(text);
        Some(Operation::InsertText {
            path: path.clone(),
            offset,
            text: self.word(),
        })
    }
}
