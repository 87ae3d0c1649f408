//! Editing-surface operation log vocabulary and its application to a
//! [`Document`].

use error_stack::Report;
use serde::{Deserialize, Serialize};

use crate::error::{OperationError, PathContext};
use crate::range::LogicalRange;
use crate::tree::{Alignment, BlockKind, Children, Document, Marks, Node, NodeMut, NodeRef, Path};

/// Properties changed by [`Operation::SetNode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeProps {
    Block {
        kind: BlockKind,
        align: Option<Alignment>,
    },
    Leaf {
        marks: Marks,
    },
}

/// One entry of the editing surface's operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    InsertNode { path: Path, node: Node },
    RemoveNode { path: Path },
    InsertText { path: Path, offset: usize, text: String },
    RemoveText { path: Path, offset: usize, text: String },
    SetNode { path: Path, props: NodeProps },
    /// Splits a leaf's text or a block's children at `position`; the tail
    /// becomes the next sibling.
    SplitNode { path: Path, position: usize },
    /// Merges the node at `path` into its previous sibling.
    MergeNode { path: Path },
    /// `to` addresses the tree after the node has been removed.
    MoveNode { path: Path, to: Path },
    SetSelection { selection: Option<LogicalRange> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Selection,
    Content,
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::SetSelection { .. } => OperationKind::Selection,
            _ => OperationKind::Content,
        }
    }

    #[must_use]
    pub fn is_content(&self) -> bool {
        self.kind() == OperationKind::Content
    }

    /// The path the operation targets, if it has one.
    #[must_use]
    pub fn path(&self) -> Option<&[usize]> {
        match self {
            Operation::InsertNode { path, .. }
            | Operation::RemoveNode { path }
            | Operation::InsertText { path, .. }
            | Operation::RemoveText { path, .. }
            | Operation::SetNode { path, .. }
            | Operation::SplitNode { path, .. }
            | Operation::MergeNode { path }
            | Operation::MoveNode { path, .. } => Some(path),
            Operation::SetSelection { .. } => None,
        }
    }
}

/// An ordered list of operations committed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationBatch {
    operations: Vec<Operation>,
}

impl OperationBatch {
    #[must_use]
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// The batch with selection operations filtered out.
    #[must_use]
    pub fn content_operations(&self) -> Vec<Operation> {
        self.operations
            .iter()
            .filter(|op| op.is_content())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        self.operations.iter().any(Operation::is_content)
    }

    /// The last selection set by this batch, if any.
    ///
    /// `Some(None)` means the batch cleared the selection.
    #[must_use]
    pub fn selection(&self) -> Option<Option<&LogicalRange>> {
        self.operations.iter().rev().find_map(|op| match op {
            Operation::SetSelection { selection } => Some(selection.as_ref()),
            _ => None,
        })
    }
}

impl From<Vec<Operation>> for OperationBatch {
    fn from(operations: Vec<Operation>) -> Self {
        Self::new(operations)
    }
}

impl FromIterator<Operation> for OperationBatch {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a OperationBatch {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

fn invalid(path: &[usize], reason: &'static str) -> Report<OperationError> {
    Report::new(OperationError)
        .attach(reason)
        .attach(PathContext::new(path))
}

fn split_path(path: &[usize]) -> Result<(&[usize], usize), Report<OperationError>> {
    match path.split_last() {
        Some((index, parent)) => Ok((parent, *index)),
        None => Err(invalid(path, "empty path")),
    }
}

fn check_boundary(text: &str, offset: usize, path: &[usize]) -> Result<(), Report<OperationError>> {
    if offset > text.len() {
        return Err(invalid(path, "offset past end of text"));
    }
    if !text.is_char_boundary(offset) {
        return Err(invalid(path, "offset is not on a character boundary"));
    }
    Ok(())
}

impl Document {
    /// Applies a single operation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when a path does not resolve, a node has
    /// the wrong shape for the operation, or a text offset is out of range.
    /// The document is unchanged on error.
    pub fn apply(&mut self, operation: &Operation) -> Result<(), Report<OperationError>> {
        match operation {
            Operation::InsertNode { path, node } => self.insert_node(path, node.clone()),
            Operation::RemoveNode { path } => self.remove_node(path).map(drop),
            Operation::InsertText { path, offset, text } => {
                let leaf = self.leaf_mut(path)?;
                check_boundary(&leaf.text, *offset, path)?;
                leaf.text.insert_str(*offset, text);
                Ok(())
            }
            Operation::RemoveText { path, offset, text } => {
                let leaf = self.leaf_mut(path)?;
                check_boundary(&leaf.text, *offset, path)?;
                let end = offset + text.len();
                if leaf.text.get(*offset..end) != Some(text.as_str()) {
                    return Err(invalid(path, "removed text does not match document"));
                }
                leaf.text.replace_range(*offset..end, "");
                Ok(())
            }
            Operation::SetNode { path, props } => match (self.node_mut(path), props) {
                (Some(NodeMut::Block(block)), NodeProps::Block { kind, align }) => {
                    block.kind = kind.clone();
                    block.align = *align;
                    Ok(())
                }
                (Some(NodeMut::Leaf(leaf)), NodeProps::Leaf { marks }) => {
                    leaf.marks = *marks;
                    Ok(())
                }
                (Some(_), _) => Err(invalid(path, "properties do not match node type")),
                (None, _) => Err(invalid(path, "path does not resolve")),
            },
            Operation::SplitNode { path, position } => self.split_node(path, *position),
            Operation::MergeNode { path } => self.merge_node(path),
            Operation::MoveNode { path, to } => {
                if to.is_empty() {
                    return Err(invalid(to, "empty path"));
                }
                let node = self.remove_node(path)?;
                if let Err(err) = self.insert_node(to, node.clone()) {
                    // restore the original position
                    self.insert_node(path, node)?;
                    return Err(err);
                }
                Ok(())
            }
            Operation::SetSelection { .. } => Ok(()),
        }
    }

    /// Applies every operation or none of them.
    ///
    /// # Errors
    ///
    /// Returns the first [`OperationError`]; the document is restored to its
    /// state before the batch.
    pub fn apply_batch<'a, I>(&mut self, operations: I) -> Result<(), Report<OperationError>>
    where
        I: IntoIterator<Item = &'a Operation>,
    {
        let before = self.clone();
        for (index, operation) in operations.into_iter().enumerate() {
            if let Err(err) = self.apply(operation) {
                *self = before;
                return Err(err.attach(format!("operation index: {index}")));
            }
        }
        Ok(())
    }

    fn leaf_mut(&mut self, path: &[usize]) -> Result<&mut crate::tree::Leaf, Report<OperationError>> {
        match self.node_mut(path) {
            Some(NodeMut::Leaf(leaf)) => Ok(leaf),
            Some(NodeMut::Block(_)) => Err(invalid(path, "expected a text leaf")),
            None => Err(invalid(path, "path does not resolve")),
        }
    }

    fn children_at(&mut self, parent: &[usize]) -> Result<Children<'_>, Report<OperationError>> {
        self.children_mut(parent)
            .ok_or_else(|| invalid(parent, "parent is not a block"))
    }

    fn insert_node(&mut self, path: &[usize], node: Node) -> Result<(), Report<OperationError>> {
        let (parent, index) = split_path(path)?;
        let mut children = self.children_at(parent)?;
        if index > children.len() {
            return Err(invalid(path, "insert index out of range"));
        }
        children
            .insert(index, node)
            .map_err(|_| invalid(path, "top level only holds blocks"))
    }

    fn remove_node(&mut self, path: &[usize]) -> Result<Node, Report<OperationError>> {
        let (parent, index) = split_path(path)?;
        self.children_at(parent)?
            .remove(index)
            .ok_or_else(|| invalid(path, "path does not resolve"))
    }

    fn split_node(&mut self, path: &[usize], position: usize) -> Result<(), Report<OperationError>> {
        let (parent, index) = split_path(path)?;
        let tail = match self.node_mut(path) {
            Some(NodeMut::Leaf(leaf)) => {
                check_boundary(&leaf.text, position, path)?;
                let text = leaf.text.split_off(position);
                Node::Leaf(crate::tree::Leaf {
                    text,
                    marks: leaf.marks,
                })
            }
            Some(NodeMut::Block(block)) => {
                if position > block.children.len() {
                    return Err(invalid(path, "split position out of range"));
                }
                let children = block.children.split_off(position);
                Node::Block(crate::tree::Block {
                    kind: block.kind.clone(),
                    align: block.align,
                    children,
                })
            }
            None => return Err(invalid(path, "path does not resolve")),
        };
        self.children_at(parent)?
            .insert(index + 1, tail)
            .map_err(|_| invalid(path, "top level only holds blocks"))
    }

    fn merge_node(&mut self, path: &[usize]) -> Result<(), Report<OperationError>> {
        let (parent, index) = split_path(path)?;
        if index == 0 {
            return Err(invalid(path, "no previous sibling to merge into"));
        }
        let mut previous = path.to_vec();
        previous[path.len() - 1] = index - 1;
        let compatible = matches!(
            (self.node(&previous), self.node(path)),
            (Some(NodeRef::Leaf(_)), Some(NodeRef::Leaf(_)))
                | (Some(NodeRef::Block(_)), Some(NodeRef::Block(_)))
        );
        if !compatible {
            return Err(invalid(path, "merge requires siblings of the same type"));
        }
        let node = self
            .children_at(parent)?
            .remove(index)
            .ok_or_else(|| invalid(path, "path does not resolve"))?;
        match (self.node_mut(&previous), node) {
            (Some(NodeMut::Leaf(target)), Node::Leaf(leaf)) => target.text.push_str(&leaf.text),
            (Some(NodeMut::Block(target)), Node::Block(block)) => {
                target.children.extend(block.children);
            }
            _ => unreachable!("sibling shapes checked above"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Point;
    use crate::tree::{Block, Leaf};

    fn doc() -> Document {
        Document::new(vec![Block::text("Hello"), Block::text("World")])
    }

    #[test]
    fn insert_and_remove_text() {
        let mut doc = doc();
        doc.apply(&Operation::InsertText {
            path: vec![0, 0],
            offset: 5,
            text: ", there".into(),
        })
        .unwrap();
        assert_eq!(doc.leaf(&[0, 0]).unwrap().text, "Hello, there");

        doc.apply(&Operation::RemoveText {
            path: vec![0, 0],
            offset: 0,
            text: "Hello".into(),
        })
        .unwrap();
        assert_eq!(doc.leaf(&[0, 0]).unwrap().text, ", there");
    }

    #[test]
    fn remove_text_must_match() {
        let mut doc = doc();
        let err = doc
            .apply(&Operation::RemoveText {
                path: vec![0, 0],
                offset: 0,
                text: "Help".into(),
            })
            .unwrap_err();
        assert!(format!("{err:?}").contains("does not match"));
        assert_eq!(doc.leaf(&[0, 0]).unwrap().text, "Hello");
    }

    #[test]
    fn text_offsets_respect_char_boundaries() {
        let mut doc = Document::new(vec![Block::text("héllo")]);
        assert!(
            doc.apply(&Operation::InsertText {
                path: vec![0, 0],
                offset: 2,
                text: "x".into(),
            })
            .is_err()
        );
        doc.apply(&Operation::InsertText {
            path: vec![0, 0],
            offset: 3,
            text: "x".into(),
        })
        .unwrap();
        assert_eq!(doc.leaf(&[0, 0]).unwrap().text, "héxllo");
    }

    #[test]
    fn split_and_merge_leaf() {
        let mut doc = doc();
        doc.apply(&Operation::SplitNode {
            path: vec![0, 0],
            position: 2,
        })
        .unwrap();
        assert_eq!(doc.leaf(&[0, 0]).unwrap().text, "He");
        assert_eq!(doc.leaf(&[0, 1]).unwrap().text, "llo");

        doc.apply(&Operation::MergeNode { path: vec![0, 1] }).unwrap();
        assert_eq!(doc.children[0], Block::text("Hello"));
    }

    #[test]
    fn split_and_merge_block() {
        let mut doc = Document::new(vec![Block::new(
            BlockKind::Quote,
            vec![Leaf::new("a").into(), Leaf::new("b").into()],
        )]);
        doc.apply(&Operation::SplitNode {
            path: vec![0],
            position: 1,
        })
        .unwrap();
        assert_eq!(doc.children.len(), 2);
        assert_eq!(doc.children[1].kind, BlockKind::Quote);
        assert_eq!(doc.leaf(&[1, 0]).unwrap().text, "b");

        doc.apply(&Operation::MergeNode { path: vec![1] }).unwrap();
        assert_eq!(doc.children.len(), 1);
        assert_eq!(doc.children[0].children.len(), 2);
    }

    #[test]
    fn merge_rejects_mismatched_siblings() {
        let mut doc = Document::new(vec![Block::new(
            BlockKind::Paragraph,
            vec![Leaf::new("a").into(), Block::text("b").into()],
        )]);
        assert!(doc.apply(&Operation::MergeNode { path: vec![0, 1] }).is_err());
        assert!(doc.apply(&Operation::MergeNode { path: vec![0, 0] }).is_err());
    }

    #[test]
    fn move_node_addresses_tree_after_removal() {
        let mut doc = Document::new(vec![Block::text("a"), Block::text("b"), Block::text("c")]);
        doc.apply(&Operation::MoveNode {
            path: vec![0],
            to: vec![2],
        })
        .unwrap();
        assert_eq!(doc.plain_text(), "b\nc\na");
    }

    #[test]
    fn failed_move_leaves_document_unchanged() {
        let mut doc = doc();
        let before = doc.clone();
        assert!(
            doc.apply(&Operation::MoveNode {
                path: vec![0],
                to: vec![5],
            })
            .is_err()
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn set_node_checks_node_type() {
        let mut doc = doc();
        doc.apply(&Operation::SetNode {
            path: vec![0],
            props: NodeProps::Block {
                kind: BlockKind::Heading { level: 1 },
                align: Some(Alignment::Center),
            },
        })
        .unwrap();
        assert_eq!(doc.children[0].kind, BlockKind::Heading { level: 1 });
        assert!(
            doc.apply(&Operation::SetNode {
                path: vec![0],
                props: NodeProps::Leaf {
                    marks: Marks::default(),
                },
            })
            .is_err()
        );
    }

    #[test]
    fn batch_is_atomic() {
        let mut doc = doc();
        let before = doc.clone();
        let batch = OperationBatch::from(vec![
            Operation::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "X".into(),
            },
            Operation::RemoveNode { path: vec![7] },
        ]);
        assert!(doc.apply_batch(&batch).is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn selection_operations_are_filtered() {
        let range = LogicalRange::collapsed(Point::new(vec![0, 0], 1));
        let batch = OperationBatch::from(vec![
            Operation::SetSelection {
                selection: Some(range.clone()),
            },
            Operation::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "X".into(),
            },
        ]);
        assert_eq!(batch.content_operations().len(), 1);
        assert!(batch.has_content());
        assert_eq!(batch.selection(), Some(Some(&range)));

        let selection_only = OperationBatch::from(vec![Operation::SetSelection { selection: None }]);
        assert!(!selection_only.has_content());
        assert_eq!(selection_only.selection(), Some(None));
    }

    #[test]
    fn leaves_cannot_be_inserted_at_top_level() {
        let mut doc = doc();
        assert!(
            doc.apply(&Operation::InsertNode {
                path: vec![0],
                node: Node::Leaf(Leaf::new("x")),
            })
            .is_err()
        );
    }
}
