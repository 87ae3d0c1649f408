//! Editing-surface geometry.

use error_stack::Report;
use serde::{Deserialize, Serialize};

use crate::error::RangeError;
use crate::range::LogicalRange;
use crate::tree::Document;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// This rectangle relative to `origin`'s top-left corner.
    #[must_use]
    pub fn relative_to(&self, origin: &Rect) -> Rect {
        Rect {
            top: self.top - origin.top,
            left: self.left - origin.left,
            ..*self
        }
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

/// Layout queries against the rendered editing surface. Rectangles are in
/// viewport coordinates.
pub trait SurfaceGeometry: Send + 'static {
    fn bounds(&self) -> Rect;

    /// Rectangles covering `range`, one per visual line.
    fn range_rects(
        &self,
        document: &Document,
        range: &LogicalRange,
    ) -> Result<Vec<Rect>, Report<RangeError>>;
}
