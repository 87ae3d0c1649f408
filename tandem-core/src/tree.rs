//! Document tree: an ordered forest of [`Block`]s whose children are nested
//! blocks or [`Leaf`] text runs.
//!
//! Invariant: every block has at least one child, and an empty document is
//! exactly one paragraph holding one empty leaf ([`Document::empty`]).
//! [`Document::repair_operations`] computes the inserts that restore it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

/// Child-index path from the document root to a node.
pub type Path = Vec<usize>;

/// Formatting marks carried by a leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub code: bool,
}

impl Marks {
    /// Mark names in storage order.
    pub const NAMES: [&'static str; 5] = ["bold", "italic", "underline", "strikethrough", "code"];

    #[must_use]
    pub fn get(&self, name: &str) -> bool {
        match name {
            "bold" => self.bold,
            "italic" => self.italic,
            "underline" => self.underline,
            "strikethrough" => self.strikethrough,
            "code" => self.code,
            _ => false,
        }
    }

    pub fn set(&mut self, name: &str, value: bool) {
        match name {
            "bold" => self.bold = value,
            "italic" => self.italic = value,
            "underline" => self.underline = value,
            "strikethrough" => self.strikethrough = value,
            "code" => self.code = value,
            _ => {}
        }
    }
}

/// Block type tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlockKind {
    #[default]
    Paragraph,
    Heading {
        level: u8,
    },
    Quote,
    ListItem,
    BulletedList,
    NumberedList,
    CodeBlock,
    Image {
        url: String,
    },
}

impl BlockKind {
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Paragraph)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "center" => Some(Self::Center),
            "right" => Some(Self::Right),
            "justify" => Some(Self::Justify),
            _ => None,
        }
    }
}

/// A text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub text: String,
    #[serde(default, flatten)]
    pub marks: Marks,
}

impl Leaf {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    #[must_use]
    pub fn with_marks(mut self, marks: Marks) -> Self {
        self.marks = marks;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub align: Option<Alignment>,
    pub children: Vec<Node>,
}

impl Block {
    #[must_use]
    pub fn new(kind: BlockKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            align: None,
            children,
        }
    }

    /// The default block: a paragraph with one empty leaf.
    #[must_use]
    pub fn paragraph() -> Self {
        Self::new(BlockKind::Paragraph, vec![Node::Leaf(Leaf::default())])
    }

    /// A paragraph holding a single unformatted leaf.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, vec![Node::Leaf(Leaf::new(text))])
    }

    /// Concatenated text of every leaf below this block.
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn is_meaningful(&self) -> bool {
        !self.kind.is_default()
            || self.children.iter().any(|child| match child {
                Node::Block(block) => block.is_meaningful(),
                Node::Leaf(leaf) => !leaf.text.trim().is_empty(),
            })
    }
}

fn collect_text(children: &[Node], out: &mut String) {
    for child in children {
        match child {
            Node::Block(block) => collect_text(&block.children, out),
            Node::Leaf(leaf) => out.push_str(&leaf.text),
        }
    }
}

/// Child of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Block(Block),
    Leaf(Leaf),
}

impl Node {
    #[must_use]
    pub fn as_ref(&self) -> NodeRef<'_> {
        match self {
            Node::Block(block) => NodeRef::Block(block),
            Node::Leaf(leaf) => NodeRef::Leaf(leaf),
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

impl From<Leaf> for Node {
    fn from(leaf: Leaf) -> Self {
        Node::Leaf(leaf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef<'a> {
    Block(&'a Block),
    Leaf(&'a Leaf),
}

impl NodeRef<'_> {
    #[must_use]
    pub fn to_node(self) -> Node {
        match self {
            NodeRef::Block(block) => Node::Block(block.clone()),
            NodeRef::Leaf(leaf) => Node::Leaf(leaf.clone()),
        }
    }
}

#[derive(Debug)]
pub enum NodeMut<'a> {
    Block(&'a mut Block),
    Leaf(&'a mut Leaf),
}

/// The document tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub children: Vec<Block>,
}

impl Document {
    #[must_use]
    pub fn new(children: Vec<Block>) -> Self {
        Self { children }
    }

    /// The canonical empty document.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(vec![Block::paragraph()])
    }

    /// `true` for the canonical empty document.
    #[must_use]
    pub fn is_canonical_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Some block carries non-whitespace text or a non-default kind.
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        self.children.iter().any(Block::is_meaningful)
    }

    #[must_use]
    pub fn plain_text(&self) -> String {
        self.children
            .iter()
            .map(Block::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn node(&self, path: &[usize]) -> Option<NodeRef<'_>> {
        let (first, rest) = path.split_first()?;
        block_node(self.children.get(*first)?, rest)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<NodeMut<'_>> {
        let (first, rest) = path.split_first()?;
        block_node_mut(self.children.get_mut(*first)?, rest)
    }

    #[must_use]
    pub fn leaf(&self, path: &[usize]) -> Option<&Leaf> {
        match self.node(path)? {
            NodeRef::Leaf(leaf) => Some(leaf),
            NodeRef::Block(_) => None,
        }
    }

    #[must_use]
    pub fn block(&self, path: &[usize]) -> Option<&Block> {
        match self.node(path)? {
            NodeRef::Block(block) => Some(block),
            NodeRef::Leaf(_) => None,
        }
    }

    /// Mutable access to the child list under `parent` (`[]` is the root).
    pub fn children_mut(&mut self, parent: &[usize]) -> Option<Children<'_>> {
        if parent.is_empty() {
            return Some(Children::Root(&mut self.children));
        }
        match self.node_mut(parent)? {
            NodeMut::Block(block) => Some(Children::Block(&mut block.children)),
            NodeMut::Leaf(_) => None,
        }
    }

    /// Inserts needed to restore the structural invariant, in apply order.
    ///
    /// An empty document gets a default paragraph at `[0]`; a block without
    /// children gets an empty leaf at its first slot.
    #[must_use]
    pub fn repair_operations(&self) -> Vec<Operation> {
        if self.children.is_empty() {
            return vec![Operation::InsertNode {
                path: vec![0],
                node: Node::Block(Block::paragraph()),
            }];
        }
        let mut ops = Vec::new();
        for (index, block) in self.children.iter().enumerate() {
            collect_repairs(block, &mut vec![index], &mut ops);
        }
        ops
    }
}

fn collect_repairs(block: &Block, path: &mut Path, ops: &mut Vec<Operation>) {
    if block.children.is_empty() {
        let mut leaf_path = path.clone();
        leaf_path.push(0);
        ops.push(Operation::InsertNode {
            path: leaf_path,
            node: Node::Leaf(Leaf::default()),
        });
        return;
    }
    for (index, child) in block.children.iter().enumerate() {
        if let Node::Block(child) = child {
            path.push(index);
            collect_repairs(child, path, ops);
            path.pop();
        }
    }
}

fn block_node<'a>(block: &'a Block, path: &[usize]) -> Option<NodeRef<'a>> {
    let Some((index, rest)) = path.split_first() else {
        return Some(NodeRef::Block(block));
    };
    match block.children.get(*index)? {
        Node::Block(child) => block_node(child, rest),
        Node::Leaf(leaf) => rest.is_empty().then_some(NodeRef::Leaf(leaf)),
    }
}

fn block_node_mut<'a>(block: &'a mut Block, path: &[usize]) -> Option<NodeMut<'a>> {
    let Some((index, rest)) = path.split_first() else {
        return Some(NodeMut::Block(block));
    };
    match block.children.get_mut(*index)? {
        Node::Block(child) => block_node_mut(child, rest),
        Node::Leaf(leaf) => rest.is_empty().then_some(NodeMut::Leaf(leaf)),
    }
}

/// A mutable child list: the root holds only blocks.
#[derive(Debug)]
pub enum Children<'a> {
    Root(&'a mut Vec<Block>),
    Block(&'a mut Vec<Node>),
}

impl Children<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Children::Root(blocks) => blocks.len(),
            Children::Block(nodes) => nodes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<NodeRef<'_>> {
        match self {
            Children::Root(blocks) => blocks.get(index).map(NodeRef::Block),
            Children::Block(nodes) => nodes.get(index).map(Node::as_ref),
        }
    }

    /// Inserts `node` at `index`. The root rejects leaves and hands them back.
    pub fn insert(&mut self, index: usize, node: Node) -> Result<(), Node> {
        if index > self.len() {
            return Err(node);
        }
        match (self, node) {
            (Children::Root(blocks), Node::Block(block)) => blocks.insert(index, block),
            (Children::Root(_), leaf @ Node::Leaf(_)) => return Err(leaf),
            (Children::Block(nodes), node) => nodes.insert(index, node),
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Node> {
        if index >= self.len() {
            return None;
        }
        Some(match self {
            Children::Root(blocks) => Node::Block(blocks.remove(index)),
            Children::Block(nodes) => nodes.remove(index),
        })
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain_text())
    }
}
