//! Yrs (Yjs) replica: wraps `yrs::Doc` for the [`ReplicatedDocument`] trait.
//!
//! Layout: a root `blocks` array of maps. A block map holds `kind` (JSON of
//! [`BlockKind`]), an optional `align` and a `children` array; a leaf map
//! holds a `text` Y.Text plus one boolean key per set mark. Empty arrays
//! read as the canonical defaults and are realized lazily before the next
//! local transaction.

use std::fmt;

use error_stack::{Report, ResultExt};
use tandem_core::{
    Alignment, Block, BlockKind, Document, Leaf, Marks, Node, NodeProps, Operation, ReplicaError,
    ReplicatedDocument,
};
use yrs::updates::decoder::Decode;
use yrs::{
    Any, Array, ArrayPrelim, ArrayRef, Doc, GetString, Map, MapPrelim, MapRef, Out, ReadTxn,
    StateVector, Text, TextPrelim, TextRef, Transact, TransactionMut, Update,
};

const BLOCKS: &str = "blocks";
const KIND: &str = "kind";
const ALIGN: &str = "align";
const CHILDREN: &str = "children";
const TEXT: &str = "text";

pub struct YrsReplica {
    doc: Doc,
    blocks: ArrayRef,
    /// Updates produced by local transactions, oldest first.
    pending: Vec<Vec<u8>>,
    /// How many of `pending` the last flush handed out.
    inflight: usize,
    disposed: bool,
}

impl YrsReplica {
    /// New replica with a random client id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client_id(u64::from(rand::random::<u32>()))
    }

    /// yrs 0.25 V2 delete sets truncate client ids to 32 bits, so ids are
    /// masked.
    #[must_use]
    pub fn with_client_id(client_id: u64) -> Self {
        let doc = Doc::with_client_id(client_id & 0xFFFF_FFFF);
        let blocks = doc.get_or_insert_array(BLOCKS);
        Self {
            doc,
            blocks,
            pending: Vec::new(),
            inflight: 0,
            disposed: false,
        }
    }

    /// # Errors
    ///
    /// Returns [`ReplicaError`] if the snapshot bytes cannot be decoded.
    pub fn from_snapshot(snapshot: &[u8], client_id: u64) -> Result<Self, Report<ReplicaError>> {
        let mut replica = Self::with_client_id(client_id);
        replica.apply_update(snapshot)?;
        Ok(replica)
    }

    #[must_use]
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    #[must_use]
    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    fn ensure_live(&self) -> Result<(), Report<ReplicaError>> {
        if self.disposed {
            return Err(Report::new(ReplicaError).attach("replica disposed"));
        }
        Ok(())
    }
}

impl fmt::Debug for YrsReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YrsReplica")
            .field("client_id", &self.doc.client_id())
            .field("pending", &self.pending.len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Default for YrsReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedDocument for YrsReplica {
    fn is_empty(&self) -> bool {
        self.blocks.len(&self.doc.transact()) == 0
    }

    fn materialize(&self) -> Result<Document, Report<ReplicaError>> {
        self.ensure_live()?;
        let txn = self.doc.transact();
        let mut children = Vec::new();
        for out in self.blocks.iter(&txn) {
            match read_node(&txn, out)? {
                Node::Block(block) => children.push(block),
                Node::Leaf(_) => {
                    return Err(Report::new(ReplicaError).attach("leaf at top level"));
                }
            }
        }
        if children.is_empty() {
            return Ok(Document::empty());
        }
        Ok(Document::new(children))
    }

    fn apply_local_operations(
        &mut self,
        operations: &[Operation],
    ) -> Result<(), Report<ReplicaError>> {
        self.ensure_live()?;
        if !operations.iter().any(Operation::is_content) {
            return Ok(());
        }
        let mut txn = self.doc.transact_mut();
        let mut result = realize_defaults(&mut txn, &self.blocks);
        if result.is_ok() {
            for (index, operation) in operations.iter().enumerate() {
                if let Err(err) = apply_operation(&mut txn, &self.blocks, operation) {
                    result = Err(err.attach(format!("operation index: {index}")));
                    break;
                }
            }
        }
        // whatever was integrated must still reach peers
        let update = txn.encode_update_v2();
        drop(txn);
        self.pending.push(update);
        result
    }

    fn apply_update(&mut self, update: &[u8]) -> Result<(), Report<ReplicaError>> {
        self.ensure_live()?;
        let update = Update::decode_v2(update).change_context(ReplicaError)?;
        self.doc
            .transact_mut()
            .apply_update(update)
            .change_context(ReplicaError)?;
        Ok(())
    }

    fn flush(&mut self) -> Option<Vec<Vec<u8>>> {
        if self.pending.is_empty() {
            return None;
        }
        self.inflight = self.pending.len();
        Some(self.pending.clone())
    }

    fn confirm_flush(&mut self) {
        self.pending.drain(..self.inflight.min(self.pending.len()));
        self.inflight = 0;
    }

    fn snapshot(&self) -> Result<Vec<u8>, Report<ReplicaError>> {
        self.ensure_live()?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v2(&StateVector::default()))
    }

    fn dispose(&mut self) -> Result<(), Report<ReplicaError>> {
        self.ensure_live()?;
        self.disposed = true;
        self.pending.clear();
        self.inflight = 0;
        Ok(())
    }
}

fn malformed(what: &'static str) -> Report<ReplicaError> {
    Report::new(ReplicaError).attach(what)
}

fn to_index(index: usize) -> Result<u32, Report<ReplicaError>> {
    u32::try_from(index).change_context(ReplicaError)
}

fn read_node<T: ReadTxn>(txn: &T, out: Out) -> Result<Node, Report<ReplicaError>> {
    let Out::YMap(map) = out else {
        return Err(malformed("node is not a map"));
    };
    if let Some(text) = map.get(txn, TEXT) {
        let Out::YText(text) = text else {
            return Err(malformed("leaf text is not a Y.Text"));
        };
        let mut marks = Marks::default();
        for name in Marks::NAMES {
            if let Some(Out::Any(Any::Bool(true))) = map.get(txn, name) {
                marks.set(name, true);
            }
        }
        return Ok(Node::Leaf(Leaf {
            text: text.get_string(txn),
            marks,
        }));
    }

    let kind = match map.get(txn, KIND) {
        Some(Out::Any(Any::String(kind))) => {
            serde_json::from_str(&kind).change_context(ReplicaError)?
        }
        None => BlockKind::Paragraph,
        Some(_) => return Err(malformed("block kind is not a string")),
    };
    let align = match map.get(txn, ALIGN) {
        Some(Out::Any(Any::String(align))) => Alignment::parse(&align),
        _ => None,
    };
    let mut children = Vec::new();
    match map.get(txn, CHILDREN) {
        Some(Out::YArray(array)) => {
            for child in array.iter(txn) {
                children.push(read_node(txn, child)?);
            }
        }
        None => {}
        Some(_) => return Err(malformed("block children is not an array")),
    }
    if children.is_empty() {
        children.push(Node::Leaf(Leaf::default()));
    }
    Ok(Node::Block(Block {
        kind,
        align,
        children,
    }))
}

fn map_at<T: ReadTxn>(txn: &T, array: &ArrayRef, index: usize) -> Result<MapRef, Report<ReplicaError>> {
    match array.get(txn, to_index(index)?) {
        Some(Out::YMap(map)) => Ok(map),
        Some(_) => Err(malformed("node is not a map")),
        None => Err(malformed("path does not resolve").attach(format!("index: {index}"))),
    }
}

fn children_of<T: ReadTxn>(txn: &T, map: &MapRef) -> Result<ArrayRef, Report<ReplicaError>> {
    match map.get(txn, CHILDREN) {
        Some(Out::YArray(array)) => Ok(array),
        _ => Err(malformed("node has no children")),
    }
}

fn text_of<T: ReadTxn>(txn: &T, map: &MapRef) -> Result<TextRef, Report<ReplicaError>> {
    match map.get(txn, TEXT) {
        Some(Out::YText(text)) => Ok(text),
        _ => Err(malformed("node is not a text leaf")),
    }
}

/// The array holding the children of `parent` (`[]` is the root).
fn array_at<T: ReadTxn>(txn: &T, root: &ArrayRef, parent: &[usize]) -> Result<ArrayRef, Report<ReplicaError>> {
    let mut array = root.clone();
    for &index in parent {
        let map = map_at(txn, &array, index)?;
        array = children_of(txn, &map)?;
    }
    Ok(array)
}

fn split(path: &[usize]) -> Result<(&[usize], usize), Report<ReplicaError>> {
    match path.split_last() {
        Some((index, parent)) => Ok((parent, *index)),
        None => Err(malformed("empty path")),
    }
}

fn node_at<T: ReadTxn>(txn: &T, root: &ArrayRef, path: &[usize]) -> Result<MapRef, Report<ReplicaError>> {
    let (parent, index) = split(path)?;
    map_at(txn, &array_at(txn, root, parent)?, index)
}

fn write_marks(txn: &mut TransactionMut, map: &MapRef, marks: Marks) {
    for name in Marks::NAMES {
        if marks.get(name) {
            map.insert(txn, name, true);
        } else {
            map.remove(txn, name);
        }
    }
}

fn write_block_props(
    txn: &mut TransactionMut,
    map: &MapRef,
    kind: &BlockKind,
    align: Option<Alignment>,
) -> Result<(), Report<ReplicaError>> {
    let kind = serde_json::to_string(kind).change_context(ReplicaError)?;
    map.insert(txn, KIND, kind);
    match align {
        Some(align) => {
            map.insert(txn, ALIGN, align.as_str());
        }
        None => {
            map.remove(txn, ALIGN);
        }
    }
    Ok(())
}

fn insert_node(
    txn: &mut TransactionMut,
    array: &ArrayRef,
    index: usize,
    node: &Node,
) -> Result<(), Report<ReplicaError>> {
    if index > array.len(txn) as usize {
        return Err(malformed("insert index out of range"));
    }
    let map = array.insert(txn, to_index(index)?, MapPrelim::default());
    match node {
        Node::Leaf(leaf) => {
            map.insert(txn, TEXT, TextPrelim::new(leaf.text.as_str()));
            write_marks(txn, &map, leaf.marks);
        }
        Node::Block(block) => {
            write_block_props(txn, &map, &block.kind, block.align)?;
            let children = map.insert(txn, CHILDREN, ArrayPrelim::default());
            for (index, child) in block.children.iter().enumerate() {
                insert_node(txn, &children, index, child)?;
            }
        }
    }
    Ok(())
}

fn remove_node(
    txn: &mut TransactionMut,
    root: &ArrayRef,
    path: &[usize],
) -> Result<Node, Report<ReplicaError>> {
    let (parent, index) = split(path)?;
    let array = array_at(txn, root, parent)?;
    let map = map_at(txn, &array, index)?;
    let node = read_node(txn, Out::YMap(map))?;
    array.remove_range(txn, to_index(index)?, 1);
    Ok(node)
}

/// Inserts the defaults an empty structure reads as: a paragraph for an empty
/// root, an empty leaf for a childless block.
fn realize_defaults(txn: &mut TransactionMut, root: &ArrayRef) -> Result<(), Report<ReplicaError>> {
    if root.len(txn) == 0 {
        return insert_node(txn, root, 0, &Node::Block(Block::paragraph()));
    }
    realize_children(txn, root)
}

fn realize_children(txn: &mut TransactionMut, array: &ArrayRef) -> Result<(), Report<ReplicaError>> {
    let blocks: Vec<ArrayRef> = {
        let read: &TransactionMut = txn;
        array
            .iter(read)
            .filter_map(|out| match out {
                Out::YMap(map) => match map.get(read, CHILDREN) {
                    Some(Out::YArray(children)) => Some(children),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    };
    for children in blocks {
        if children.len(txn) == 0 {
            insert_node(txn, &children, 0, &Node::Leaf(Leaf::default()))?;
        } else {
            realize_children(txn, &children)?;
        }
    }
    Ok(())
}

fn checked_offset(text: &str, offset: usize) -> Result<u32, Report<ReplicaError>> {
    if offset > text.len() || !text.is_char_boundary(offset) {
        return Err(malformed("text offset out of range").attach(format!("offset: {offset}")));
    }
    to_index(offset)
}

fn apply_operation(
    txn: &mut TransactionMut,
    root: &ArrayRef,
    operation: &Operation,
) -> Result<(), Report<ReplicaError>> {
    match operation {
        Operation::InsertNode { path, node } => {
            let (parent, index) = split(path)?;
            let array = array_at(txn, root, parent)?;
            insert_node(txn, &array, index, node)
        }
        Operation::RemoveNode { path } => remove_node(txn, root, path).map(drop),
        Operation::InsertText { path, offset, text } => {
            let target = text_of(txn, &node_at(txn, root, path)?)?;
            let offset = checked_offset(&target.get_string(txn), *offset)?;
            target.insert(txn, offset, text);
            Ok(())
        }
        Operation::RemoveText { path, offset, text } => {
            let target = text_of(txn, &node_at(txn, root, path)?)?;
            let current = target.get_string(txn);
            let start = checked_offset(&current, *offset)?;
            if current.get(*offset..offset + text.len()) != Some(text.as_str()) {
                return Err(malformed("removed text does not match replica"));
            }
            target.remove_range(txn, start, to_index(text.len())?);
            Ok(())
        }
        Operation::SetNode { path, props } => {
            let map = node_at(txn, root, path)?;
            let is_leaf = map.get(txn, TEXT).is_some();
            match props {
                NodeProps::Block { kind, align } if !is_leaf => {
                    write_block_props(txn, &map, kind, *align)
                }
                NodeProps::Leaf { marks } if is_leaf => {
                    write_marks(txn, &map, *marks);
                    Ok(())
                }
                _ => Err(malformed("properties do not match node type")),
            }
        }
        Operation::SplitNode { path, position } => {
            let (parent, index) = split(path)?;
            let array = array_at(txn, root, parent)?;
            let map = map_at(txn, &array, index)?;
            let tail = match read_node(txn, Out::YMap(map.clone()))? {
                Node::Leaf(leaf) => {
                    let start = checked_offset(&leaf.text, *position)?;
                    let rest = leaf.text[*position..].to_owned();
                    text_of(txn, &map)?.remove_range(txn, start, to_index(rest.len())?);
                    Node::Leaf(Leaf {
                        text: rest,
                        marks: leaf.marks,
                    })
                }
                Node::Block(block) => {
                    let children = children_of(txn, &map)?;
                    let stored = children.len(txn) as usize;
                    if *position > stored {
                        return Err(malformed("split position out of range"));
                    }
                    let moved = block.children[*position..stored].to_vec();
                    children.remove_range(txn, to_index(*position)?, to_index(moved.len())?);
                    Node::Block(Block {
                        kind: block.kind,
                        align: block.align,
                        children: moved,
                    })
                }
            };
            insert_node(txn, &array, index + 1, &tail)
        }
        Operation::MergeNode { path } => {
            let (parent, index) = split(path)?;
            if index == 0 {
                return Err(malformed("no previous sibling to merge into"));
            }
            let array = array_at(txn, root, parent)?;
            let previous = map_at(txn, &array, index - 1)?;
            let node = read_node(txn, Out::YMap(map_at(txn, &array, index)?))?;
            match node {
                Node::Leaf(leaf) => {
                    let target = text_of(txn, &previous)?;
                    let end = target.len(txn);
                    target.insert(txn, end, &leaf.text);
                }
                Node::Block(block) => {
                    let target = children_of(txn, &previous)?;
                    for child in &block.children {
                        let end = target.len(txn) as usize;
                        insert_node(txn, &target, end, child)?;
                    }
                }
            }
            array.remove_range(txn, to_index(index)?, 1);
            Ok(())
        }
        Operation::MoveNode { path, to } => {
            let node = remove_node(txn, root, path)?;
            let (parent, index) = split(to)?;
            let array = array_at(txn, root, parent)?;
            insert_node(txn, &array, index, &node)
        }
        Operation::SetSelection { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(a: &mut YrsReplica, b: &mut YrsReplica) {
        if let Some(updates) = a.flush() {
            for update in &updates {
                b.apply_update(update).unwrap();
            }
            a.confirm_flush();
        }
        if let Some(updates) = b.flush() {
            for update in &updates {
                a.apply_update(update).unwrap();
            }
            b.confirm_flush();
        }
    }

    fn insert_text(path: &[usize], offset: usize, text: &str) -> Operation {
        Operation::InsertText {
            path: path.to_vec(),
            offset,
            text: text.into(),
        }
    }

    #[test]
    fn new_replica_is_empty_and_reads_canonical() {
        let replica = YrsReplica::with_client_id(1);
        assert!(replica.is_empty());
        assert!(replica.materialize().unwrap().is_canonical_empty());
        assert!(!replica.snapshot().unwrap().is_empty());
    }

    #[test]
    fn local_edit_realizes_default_paragraph() {
        let mut replica = YrsReplica::with_client_id(1);
        replica
            .apply_local_operations(&[insert_text(&[0, 0], 0, "Hello")])
            .unwrap();
        assert!(!replica.is_empty());
        assert_eq!(
            replica.materialize().unwrap(),
            Document::new(vec![Block::text("Hello")])
        );
    }

    #[test]
    fn structure_round_trips_through_replica() {
        let tree = Document::new(vec![
            Block {
                kind: BlockKind::Heading { level: 2 },
                align: Some(Alignment::Center),
                children: vec![Node::Leaf(Leaf::new("Title").with_marks(Marks {
                    bold: true,
                    ..Marks::default()
                }))],
            },
            Block::new(
                BlockKind::BulletedList,
                vec![Node::Block(Block::new(
                    BlockKind::ListItem,
                    vec![Leaf::new("item").into()],
                ))],
            ),
        ]);
        let mut ops = vec![Operation::RemoveNode { path: vec![0] }];
        ops.extend(tree.children.iter().enumerate().map(|(index, block)| {
            Operation::InsertNode {
                path: vec![index],
                node: Node::Block(block.clone()),
            }
        }));

        let mut replica = YrsReplica::with_client_id(1);
        replica.apply_local_operations(&ops).unwrap();
        assert_eq!(replica.materialize().unwrap(), tree);

        let copy = YrsReplica::from_snapshot(&replica.snapshot().unwrap(), 2).unwrap();
        assert_eq!(copy.materialize().unwrap(), tree);
    }

    #[test]
    fn split_merge_and_move() {
        let mut replica = YrsReplica::with_client_id(1);
        replica
            .apply_local_operations(&[insert_text(&[0, 0], 0, "HelloWorld")])
            .unwrap();
        replica
            .apply_local_operations(&[
                Operation::SplitNode {
                    path: vec![0, 0],
                    position: 5,
                },
                Operation::SplitNode {
                    path: vec![0],
                    position: 1,
                },
            ])
            .unwrap();
        let mut expected = Document::new(vec![Block::text("Hello"), Block::text("World")]);
        assert_eq!(replica.materialize().unwrap(), expected);

        replica
            .apply_local_operations(&[Operation::MoveNode {
                path: vec![0],
                to: vec![1],
            }])
            .unwrap();
        expected.children.swap(0, 1);
        assert_eq!(replica.materialize().unwrap(), expected);

        replica
            .apply_local_operations(&[Operation::MergeNode { path: vec![1] }])
            .unwrap();
        replica
            .apply_local_operations(&[Operation::MergeNode { path: vec![0, 1] }])
            .unwrap();
        assert_eq!(
            replica.materialize().unwrap(),
            Document::new(vec![Block::text("WorldHello")])
        );
    }

    #[test]
    fn concurrent_edits_converge() {
        let mut alice = YrsReplica::with_client_id(1);
        let mut bob = YrsReplica::with_client_id(2);

        alice
            .apply_local_operations(&[insert_text(&[0, 0], 0, "ABC")])
            .unwrap();
        synced(&mut alice, &mut bob);

        alice
            .apply_local_operations(&[insert_text(&[0, 0], 1, "X")])
            .unwrap();
        bob.apply_local_operations(&[insert_text(&[0, 0], 2, "Y")])
            .unwrap();
        synced(&mut alice, &mut bob);

        let a = alice.materialize().unwrap();
        assert_eq!(a, bob.materialize().unwrap());
        let text = a.plain_text();
        for c in ['A', 'B', 'C', 'X', 'Y'] {
            assert!(text.contains(c));
        }
    }

    #[test]
    fn echo_is_idempotent() {
        let mut alice = YrsReplica::with_client_id(12345);
        alice
            .apply_local_operations(&[insert_text(&[0, 0], 0, "Hello")])
            .unwrap();
        let updates = alice.flush().unwrap();
        alice.confirm_flush();
        for update in &updates {
            alice.apply_update(update).unwrap();
        }
        assert_eq!(alice.materialize().unwrap().plain_text(), "Hello");
        assert!(alice.flush().is_none());
    }

    #[test]
    fn unconfirmed_flush_is_retried_with_new_edits() {
        let mut alice = YrsReplica::with_client_id(1);
        let mut bob = YrsReplica::with_client_id(2);

        alice
            .apply_local_operations(&[insert_text(&[0, 0], 0, "hello")])
            .unwrap();
        let lost = alice.flush().unwrap();
        assert_eq!(lost.len(), 1);

        alice
            .apply_local_operations(&[insert_text(&[0, 0], 5, " world")])
            .unwrap();
        let retry = alice.flush().unwrap();
        assert_eq!(retry.len(), 2);
        for update in &retry {
            bob.apply_update(update).unwrap();
        }
        alice.confirm_flush();
        assert!(alice.flush().is_none());
        assert_eq!(bob.materialize().unwrap().plain_text(), "hello world");
    }

    #[test]
    fn remote_updates_are_not_flushed() {
        let mut alice = YrsReplica::with_client_id(1);
        let mut bob = YrsReplica::with_client_id(2);
        alice
            .apply_local_operations(&[insert_text(&[0, 0], 0, "hi")])
            .unwrap();
        synced(&mut alice, &mut bob);
        assert!(bob.flush().is_none());
    }

    #[test]
    fn selection_only_batches_produce_no_update() {
        let mut replica = YrsReplica::with_client_id(1);
        replica
            .apply_local_operations(&[Operation::SetSelection { selection: None }])
            .unwrap();
        assert!(replica.flush().is_none());
        assert!(replica.is_empty());
    }

    #[test]
    fn rejects_garbage_and_mismatched_removal() {
        let mut replica = YrsReplica::with_client_id(1);
        assert!(replica.apply_update(&[0x42, 0x00]).is_err());
        assert!(YrsReplica::from_snapshot(&[], 0).is_err());

        replica
            .apply_local_operations(&[insert_text(&[0, 0], 0, "abc")])
            .unwrap();
        assert!(
            replica
                .apply_local_operations(&[Operation::RemoveText {
                    path: vec![0, 0],
                    offset: 0,
                    text: "zz".into(),
                }])
                .is_err()
        );
    }

    #[test]
    fn emptied_block_reads_with_empty_leaf() {
        let mut replica = YrsReplica::with_client_id(1);
        replica
            .apply_local_operations(&[Operation::RemoveNode { path: vec![0, 0] }])
            .unwrap();
        assert!(replica.materialize().unwrap().is_canonical_empty());

        replica
            .apply_local_operations(&[insert_text(&[0, 0], 0, "x")])
            .unwrap();
        assert_eq!(replica.materialize().unwrap().plain_text(), "x");
    }

    #[test]
    fn disposed_replica_rejects_use() {
        let mut replica = YrsReplica::with_client_id(1);
        replica.dispose().unwrap();
        assert!(replica.materialize().is_err());
        assert!(replica.apply_update(&[]).is_err());
        assert!(replica.dispose().is_err());
    }

    #[test]
    fn client_id_is_masked_to_32_bits() {
        let replica = YrsReplica::with_client_id(0x0000_0001_CAFE_BABE);
        assert_eq!(replica.client_id(), 0xCAFE_BABE);
    }

    /// yrs 0.25: deleting items from a client id wider than 32 bits is lost
    /// in V2 updates; a 32-bit id behaves.
    #[test]
    fn v2_delete_with_32_bit_client_id() {
        let doc = Doc::with_client_id(0xCAFE_BABE);
        let text = doc.get_or_insert_text("doc");
        text.insert(&mut doc.transact_mut(), 0, "Hello");
        let full = doc.transact().encode_diff_v2(&StateVector::default());
        let sv = doc.transact().state_vector();
        text.remove_range(&mut doc.transact_mut(), 0, 5);
        let delete = doc.transact().encode_diff_v2(&sv);

        let peer = Doc::with_client_id(7);
        peer.get_or_insert_text("doc");
        peer.transact_mut()
            .apply_update(Update::decode_v2(&full).unwrap())
            .unwrap();
        peer.transact_mut()
            .apply_update(Update::decode_v2(&delete).unwrap())
            .unwrap();
        assert_eq!(
            peer.get_or_insert_text("doc").get_string(&peer.transact()),
            ""
        );
    }
}
