//! Presence records exchanged between peers in a room.

use serde::{Deserialize, Serialize};

use crate::protocol::ConnectionId;
use crate::range::LogicalRange;

/// Identity shown next to a peer's cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub color: String,
    pub id: Option<String>,
}

impl User {
    #[must_use]
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            id: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Pointer position relative to the editing surface's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl CursorPosition {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub connection_id: ConnectionId,
    pub user: User,
    pub cursor: Option<CursorPosition>,
    pub selection: Option<LogicalRange>,
}

impl PresenceRecord {
    /// The record published on mount: identity only.
    #[must_use]
    pub fn mounted(connection_id: ConnectionId, user: User) -> Self {
        Self {
            connection_id,
            user,
            cursor: None,
            selection: None,
        }
    }

    /// Merges `update` in place. Returns whether anything changed.
    pub fn merge(&mut self, update: PresenceUpdate) -> bool {
        let mut changed = false;
        if let Some(cursor) = update.cursor
            && self.cursor != cursor
        {
            self.cursor = cursor;
            changed = true;
        }
        if let Some(selection) = update.selection
            && self.selection != selection
        {
            self.selection = selection;
            changed = true;
        }
        changed
    }
}

/// A partial presence change. The outer `Option` is "field present in the
/// update"; the inner one is the new value, `None` meaning cleared.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(clippy::option_option)]
pub struct PresenceUpdate {
    pub cursor: Option<Option<CursorPosition>>,
    pub selection: Option<Option<LogicalRange>>,
}

impl PresenceUpdate {
    #[must_use]
    pub fn cursor(cursor: Option<CursorPosition>) -> Self {
        Self {
            cursor: Some(cursor),
            selection: None,
        }
    }

    #[must_use]
    pub fn selection(selection: Option<LogicalRange>) -> Self {
        Self {
            cursor: None,
            selection: Some(selection),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursor.is_none() && self.selection.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Point;

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut record = PresenceRecord::mounted(ConnectionId(7), User::new("Ada", "#f00"));
        assert!(record.merge(PresenceUpdate::cursor(Some(CursorPosition::new(4.0, 2.0)))));

        let range = LogicalRange::collapsed(Point::new(vec![0, 0], 0));
        assert!(record.merge(PresenceUpdate::selection(Some(range.clone()))));
        assert_eq!(record.cursor, Some(CursorPosition::new(4.0, 2.0)));
        assert_eq!(record.selection, Some(range));
        assert_eq!(record.user.name, "Ada");

        assert!(record.merge(PresenceUpdate::cursor(None)));
        assert_eq!(record.cursor, None);
        assert!(record.selection.is_some());
    }

    #[test]
    fn merging_same_value_reports_no_change() {
        let mut record = PresenceRecord::mounted(ConnectionId(1), User::new("Bo", "blue"));
        assert!(!record.merge(PresenceUpdate::cursor(None)));
        assert!(!record.merge(PresenceUpdate::default()));
    }
}
