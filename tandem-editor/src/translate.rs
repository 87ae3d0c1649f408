//! Tree diff: the operations that turn one document into another.
//!
//! Used to translate a merged replica state into local editor operations.
//! Unchanged prefixes and suffixes of every child list are kept, so edits
//! elsewhere in the tree leave local nodes (and paths into them) alone.

use tandem_core::{Document, Leaf, Node, NodeProps, NodeRef, Operation, Path};

/// Operations that transform `from` into `to`, in apply order.
#[must_use]
pub fn diff(from: &Document, to: &Document) -> Vec<Operation> {
    let old: Vec<NodeRef<'_>> = from.children.iter().map(NodeRef::Block).collect();
    let new: Vec<NodeRef<'_>> = to.children.iter().map(NodeRef::Block).collect();
    let mut ops = Vec::new();
    diff_children(&mut Vec::new(), &old, &new, &mut ops);
    ops
}

fn diff_children(path: &mut Path, old: &[NodeRef<'_>], new: &[NodeRef<'_>], ops: &mut Vec<Operation>) {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    let paired = old_mid.len().min(new_mid.len());

    for (offset, (a, b)) in old_mid.iter().zip(new_mid).enumerate() {
        path.push(prefix + offset);
        diff_node(path, *a, *b, ops);
        path.pop();
    }

    let at = prefix + paired;
    for _ in paired..old_mid.len() {
        ops.push(Operation::RemoveNode {
            path: child(path, at),
        });
    }
    for (offset, node) in new_mid[paired..].iter().enumerate() {
        ops.push(Operation::InsertNode {
            path: child(path, at + offset),
            node: node.to_node(),
        });
    }
}

fn child(parent: &[usize], index: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(index);
    path
}

fn diff_node(path: &mut Path, old: NodeRef<'_>, new: NodeRef<'_>, ops: &mut Vec<Operation>) {
    if old == new {
        return;
    }
    match (old, new) {
        (NodeRef::Leaf(a), NodeRef::Leaf(b)) => diff_leaf(path, a, b, ops),
        (NodeRef::Block(a), NodeRef::Block(b)) => {
            if a.kind != b.kind || a.align != b.align {
                ops.push(Operation::SetNode {
                    path: path.clone(),
                    props: NodeProps::Block {
                        kind: b.kind.clone(),
                        align: b.align,
                    },
                });
            }
            let old: Vec<NodeRef<'_>> = a.children.iter().map(Node::as_ref).collect();
            let new: Vec<NodeRef<'_>> = b.children.iter().map(Node::as_ref).collect();
            diff_children(path, &old, &new, ops);
        }
        _ => {
            ops.push(Operation::RemoveNode { path: path.clone() });
            ops.push(Operation::InsertNode {
                path: path.clone(),
                node: new.to_node(),
            });
        }
    }
}

fn diff_leaf(path: &Path, old: &Leaf, new: &Leaf, ops: &mut Vec<Operation>) {
    if old.marks != new.marks {
        ops.push(Operation::SetNode {
            path: path.clone(),
            props: NodeProps::Leaf { marks: new.marks },
        });
    }
    let (a, b) = (old.text.as_str(), new.text.as_str());
    let prefix = common_prefix(a, b);
    let suffix = common_suffix(&a[prefix..], &b[prefix..]);
    let removed = &a[prefix..a.len() - suffix];
    let inserted = &b[prefix..b.len() - suffix];
    if !removed.is_empty() {
        ops.push(Operation::RemoveText {
            path: path.clone(),
            offset: prefix,
            text: removed.to_owned(),
        });
    }
    if !inserted.is_empty() {
        ops.push(Operation::InsertText {
            path: path.clone(),
            offset: prefix,
            text: inserted.to_owned(),
        });
    }
}

/// Byte length of the longest common prefix, on a char boundary.
fn common_prefix(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

#[cfg(test)]
mod tests {
    use tandem_core::{Block, BlockKind, Marks};

    use super::*;

    fn check(from: &Document, to: &Document) -> Vec<Operation> {
        let ops = diff(from, to);
        let mut patched = from.clone();
        patched.apply_batch(&ops).unwrap();
        assert_eq!(&patched, to);
        ops
    }

    #[test]
    fn identical_documents_need_nothing() {
        let doc = Document::new(vec![Block::text("same")]);
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn text_change_is_minimal() {
        let from = Document::new(vec![Block::text("Hello world")]);
        let to = Document::new(vec![Block::text("Hello brave world")]);
        let ops = check(&from, &to);
        assert_eq!(
            ops,
            vec![Operation::InsertText {
                path: vec![0, 0],
                offset: 6,
                text: "brave ".into(),
            }]
        );
    }

    #[test]
    fn multibyte_text_diffs_stay_on_boundaries() {
        let from = Document::new(vec![Block::text("naïve café")]);
        let to = Document::new(vec![Block::text("naïf café ☕")]);
        check(&from, &to);

        let from = Document::new(vec![Block::text("ééé")]);
        let to = Document::new(vec![Block::text("éé")]);
        check(&from, &to);
    }

    #[test]
    fn blocks_are_inserted_and_removed() {
        let from = Document::new(vec![Block::text("a"), Block::text("b"), Block::text("c")]);
        let to = Document::new(vec![Block::text("a"), Block::text("c")]);
        let ops = check(&from, &to);
        assert_eq!(ops, vec![Operation::RemoveNode { path: vec![1] }]);

        let ops = check(&to, &from);
        assert_eq!(
            ops,
            vec![Operation::InsertNode {
                path: vec![1],
                node: Node::Block(Block::text("b")),
            }]
        );
    }

    #[test]
    fn kind_and_mark_changes_use_set_node() {
        let from = Document::new(vec![Block::text("Title")]);
        let to = Document::new(vec![Block::new(
            BlockKind::Heading { level: 1 },
            vec![Leaf::new("Title")
                .with_marks(Marks {
                    italic: true,
                    ..Marks::default()
                })
                .into()],
        )]);
        let ops = check(&from, &to);
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| matches!(op, Operation::SetNode { .. })));
    }

    #[test]
    fn mismatched_node_types_are_replaced() {
        let from = Document::new(vec![Block::new(
            BlockKind::Quote,
            vec![Leaf::new("x").into()],
        )]);
        let to = Document::new(vec![Block::new(
            BlockKind::Quote,
            vec![Block::text("x").into()],
        )]);
        check(&from, &to);
    }

    #[test]
    fn whole_document_replacement() {
        let from = Document::empty();
        let to = Document::new(vec![
            Block::text("Hello"),
            Block::new(BlockKind::CodeBlock, vec![Leaf::new("fn main() {}").into()]),
        ]);
        check(&from, &to);
        check(&to, &from);
    }
}
