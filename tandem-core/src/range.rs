//! Logical positions in a document tree.

use serde::{Deserialize, Serialize};

use crate::operation::Operation;
use crate::tree::{Document, Path};

/// A position inside a text leaf. `offset` counts UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub path: Path,
    pub offset: usize,
}

impl Point {
    #[must_use]
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    /// Whether the point addresses a leaf and lands on a character boundary.
    #[must_use]
    pub fn is_valid_in(&self, document: &Document) -> bool {
        document
            .leaf(&self.path)
            .is_some_and(|leaf| leaf.text.is_char_boundary(self.offset))
    }

    /// Moves the point across a content operation applied before it.
    ///
    /// Returns `None` when the point no longer has a sensible location.
    #[must_use]
    pub fn transform(&self, operation: &Operation) -> Option<Point> {
        let mut point = self.clone();
        match operation {
            Operation::InsertText { path, offset, text } if *path == point.path => {
                if *offset < point.offset {
                    point.offset += text.len();
                }
            }
            Operation::RemoveText { path, offset, text } if *path == point.path => {
                let end = offset + text.len();
                if point.offset >= end {
                    point.offset -= text.len();
                } else if point.offset > *offset {
                    point.offset = *offset;
                }
            }
            Operation::InsertNode { path, .. } => {
                if let Some((slot, index)) = sibling_index(&mut point.path, path)
                    && *slot >= index
                {
                    *slot += 1;
                }
            }
            Operation::RemoveNode { path } => {
                if point.path.starts_with(path) {
                    return None;
                }
                if let Some((slot, index)) = sibling_index(&mut point.path, path)
                    && *slot > index
                {
                    *slot -= 1;
                }
            }
            Operation::SplitNode { path, position } if *path == point.path => {
                if point.offset >= *position {
                    point.offset -= position;
                    if let Some(last) = point.path.last_mut() {
                        *last += 1;
                    }
                }
            }
            // structural edits elsewhere keep the point; validity is checked
            // against the resulting document
            Operation::SetSelection { .. }
            | Operation::SetNode { .. }
            | Operation::InsertText { .. }
            | Operation::RemoveText { .. }
            | Operation::SplitNode { .. }
            | Operation::MergeNode { .. }
            | Operation::MoveNode { .. } => {}
        }
        Some(point)
    }
}

/// Index of `point` at the depth of `changed`, when both share a parent.
fn sibling_index<'a>(point: &'a mut Path, changed: &[usize]) -> Option<(&'a mut usize, usize)> {
    let (&index, parent) = changed.split_last()?;
    if point.len() > parent.len() && point.starts_with(parent) {
        Some((&mut point[parent.len()], index))
    } else {
        None
    }
}

/// A selection in the document: `anchor` is where it started, `focus` where
/// it ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalRange {
    pub anchor: Point,
    pub focus: Point,
}

impl LogicalRange {
    #[must_use]
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    #[must_use]
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// The earlier of anchor and focus in document order.
    #[must_use]
    pub fn start(&self) -> &Point {
        if self.anchor <= self.focus {
            &self.anchor
        } else {
            &self.focus
        }
    }

    #[must_use]
    pub fn end(&self) -> &Point {
        if self.anchor <= self.focus {
            &self.focus
        } else {
            &self.anchor
        }
    }

    #[must_use]
    pub fn is_valid_in(&self, document: &Document) -> bool {
        self.anchor.is_valid_in(document) && self.focus.is_valid_in(document)
    }

    /// Carries the range across the content operations of a batch, then
    /// checks it against the resulting document.
    #[must_use]
    pub fn transform<'a, I>(&self, operations: I, document: &Document) -> Option<LogicalRange>
    where
        I: IntoIterator<Item = &'a Operation>,
    {
        let mut range = self.clone();
        for operation in operations {
            range = LogicalRange {
                anchor: range.anchor.transform(operation)?,
                focus: range.focus.transform(operation)?,
            };
        }
        range.is_valid_in(document).then_some(range)
    }
}
