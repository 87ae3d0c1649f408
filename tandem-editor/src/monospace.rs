//! A fixed-pitch layout model: each top-level block is one line of
//! equal-width characters.

use error_stack::Report;
use tandem_core::{Block, Document, LogicalRange, Node, Point, RangeError, Rect, SurfaceGeometry};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceSurface {
    bounds: Rect,
    char_width: f64,
    line_height: f64,
}

impl MonospaceSurface {
    #[must_use]
    pub fn new(bounds: Rect, char_width: f64, line_height: f64) -> Self {
        Self {
            bounds,
            char_width,
            line_height,
        }
    }

    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    #[allow(clippy::cast_precision_loss)]
    fn rect(&self, line: usize, from: usize, to: usize) -> Rect {
        Rect::new(
            self.bounds.top + line as f64 * self.line_height,
            self.bounds.left + from as f64 * self.char_width,
            (to - from) as f64 * self.char_width,
            self.line_height,
        )
    }
}

impl Default for MonospaceSurface {
    fn default() -> Self {
        Self::new(Rect::new(0.0, 0.0, 800.0, 600.0), 8.0, 16.0)
    }
}

/// Line and character column of `point`.
fn locate(document: &Document, point: &Point) -> Option<(usize, usize)> {
    let line = *point.path.first()?;
    let block = document.children.get(line)?;
    let leaf = document.leaf(&point.path)?;
    let before = leaf.text.get(..point.offset)?.chars().count();
    let mut column = 0;
    let found = columns_before(block, &point.path[1..], &mut column);
    found.then_some((line, column + before))
}

/// Adds the characters of every leaf preceding `path` within `block`.
fn columns_before(block: &Block, path: &[usize], column: &mut usize) -> bool {
    let Some((&index, rest)) = path.split_first() else {
        return false;
    };
    let Some(target) = block.children.get(index) else {
        return false;
    };
    for child in &block.children[..index] {
        *column += match child {
            Node::Leaf(leaf) => leaf.text.chars().count(),
            Node::Block(inner) => inner.plain_text().chars().count(),
        };
    }
    match target {
        Node::Leaf(_) => rest.is_empty(),
        Node::Block(inner) => columns_before(inner, rest, column),
    }
}

impl SurfaceGeometry for MonospaceSurface {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn range_rects(
        &self,
        document: &Document,
        range: &LogicalRange,
    ) -> Result<Vec<Rect>, Report<RangeError>> {
        let resolve = |point: &Point| {
            locate(document, point).ok_or_else(|| {
                Report::new(RangeError).attach(format!("point: {:?}@{}", point.path, point.offset))
            })
        };
        let (start_line, start_col) = resolve(range.start())?;
        let (end_line, end_col) = resolve(range.end())?;

        if start_line == end_line {
            return Ok(vec![self.rect(start_line, start_col, end_col.max(start_col))]);
        }
        let mut rects = Vec::with_capacity(end_line - start_line + 1);
        for line in start_line..=end_line {
            let width = document.children[line].plain_text().chars().count();
            let (from, to) = match line {
                l if l == start_line => (start_col, width.max(start_col)),
                l if l == end_line => (0, end_col),
                _ => (0, width),
            };
            rects.push(self.rect(line, from, to));
        }
        Ok(rects)
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::{BlockKind, Leaf};

    use super::*;

    fn surface() -> MonospaceSurface {
        MonospaceSurface::new(Rect::new(0.0, 0.0, 400.0, 300.0), 10.0, 20.0)
    }

    #[test]
    fn multi_line_selection_spans_lines() {
        let doc = Document::new(vec![
            Block::text("abc"),
            Block::text("defgh"),
            Block::text("ij"),
        ]);
        let range = LogicalRange::new(Point::new(vec![2, 0], 1), Point::new(vec![0, 0], 2));
        let rects = surface().range_rects(&doc, &range).unwrap();
        assert_eq!(
            rects,
            vec![
                Rect::new(0.0, 20.0, 10.0, 20.0),
                Rect::new(20.0, 0.0, 50.0, 20.0),
                Rect::new(40.0, 0.0, 10.0, 20.0),
            ]
        );
    }

    #[test]
    fn columns_count_preceding_leaves_and_chars() {
        let doc = Document::new(vec![Block::new(
            BlockKind::Paragraph,
            vec![Leaf::new("ab").into(), Leaf::new("éé").into()],
        )]);
        let range = LogicalRange::new(Point::new(vec![0, 0], 1), Point::new(vec![0, 1], 2));
        let rects = surface().range_rects(&doc, &range).unwrap();
        assert_eq!(rects, vec![Rect::new(0.0, 10.0, 20.0, 20.0)]);
    }

    #[test]
    fn unresolvable_points_are_errors() {
        let doc = Document::new(vec![Block::text("é")]);
        let mid_char = LogicalRange::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 1));
        assert!(surface().range_rects(&doc, &mid_char).is_err());
        let missing = LogicalRange::new(Point::new(vec![0, 0], 0), Point::new(vec![3, 0], 0));
        assert!(surface().range_rects(&doc, &missing).is_err());
    }
}
