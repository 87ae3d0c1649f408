//! Cursor projection: resolves peers' presence into surface-relative
//! overlays.

use tandem_core::{ConnectionId, CursorPosition, Document, PresenceRecord, Rect, SurfaceGeometry, User};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedCursor {
    pub connection_id: ConnectionId,
    pub user: User,
    pub position: CursorPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedSelection {
    pub connection_id: ConnectionId,
    pub user: User,
    /// Rectangles relative to the surface's top-left corner.
    pub rects: Vec<Rect>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub cursors: Vec<ProjectedCursor>,
    pub selections: Vec<ProjectedSelection>,
}

/// Remembers the last projection and reports only changes.
#[derive(Debug, Default)]
pub struct CursorProjector {
    last: Option<Projection>,
}

impl CursorProjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One projection pass over `peers`.
    ///
    /// Cursors are already surface-relative and pass through. Non-collapsed
    /// selections are laid out by the surface and re-based onto its origin;
    /// ranges the surface cannot resolve are skipped for this pass.
    #[must_use]
    pub fn project<S: SurfaceGeometry + ?Sized>(
        peers: &[PresenceRecord],
        document: &Document,
        surface: &S,
    ) -> Projection {
        let bounds = surface.bounds();
        let mut projection = Projection::default();
        for peer in peers {
            if let Some(position) = peer.cursor {
                projection.cursors.push(ProjectedCursor {
                    connection_id: peer.connection_id,
                    user: peer.user.clone(),
                    position,
                });
            }
            let Some(range) = peer.selection.as_ref().filter(|range| !range.is_collapsed()) else {
                continue;
            };
            match surface.range_rects(document, range) {
                Ok(rects) => projection.selections.push(ProjectedSelection {
                    connection_id: peer.connection_id,
                    user: peer.user.clone(),
                    rects: rects.iter().map(|rect| rect.relative_to(&bounds)).collect(),
                }),
                Err(err) => {
                    debug!(peer = %peer.connection_id, ?err, "dropping unresolvable selection");
                }
            }
        }
        projection
    }

    /// Runs a pass; `Some` only if the result differs from the previous pass.
    pub fn refresh<S: SurfaceGeometry + ?Sized>(
        &mut self,
        peers: &[PresenceRecord],
        document: &Document,
        surface: &S,
    ) -> Option<Projection> {
        let projection = Self::project(peers, document, surface);
        if self.last.as_ref() == Some(&projection) {
            return None;
        }
        self.last = Some(projection.clone());
        Some(projection)
    }

    #[must_use]
    pub fn last(&self) -> Option<&Projection> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::{Block, LogicalRange, Point};

    use super::*;
    use crate::monospace::MonospaceSurface;

    fn surface() -> MonospaceSurface {
        MonospaceSurface::new(Rect::new(100.0, 50.0, 800.0, 600.0), 10.0, 20.0)
    }

    fn peer(id: u64) -> PresenceRecord {
        PresenceRecord::mounted(ConnectionId(id), User::new(format!("peer{id}"), "#abc"))
    }

    fn doc() -> Document {
        Document::new(vec![Block::text("Hello"), Block::text("World")])
    }

    #[test]
    fn cursors_pass_through() {
        let mut p = peer(2);
        p.cursor = Some(CursorPosition::new(12.0, 7.5));
        let projection = CursorProjector::project(&[p], &doc(), &surface());
        assert_eq!(projection.cursors.len(), 1);
        assert_eq!(projection.cursors[0].position, CursorPosition::new(12.0, 7.5));
        assert_eq!(projection.cursors[0].user.name, "peer2");
        assert!(projection.selections.is_empty());
    }

    #[test]
    fn selections_are_rebased_onto_surface() {
        let mut p = peer(2);
        p.selection = Some(LogicalRange::new(
            Point::new(vec![0, 0], 1),
            Point::new(vec![0, 0], 4),
        ));
        let projection = CursorProjector::project(&[p], &doc(), &surface());
        assert_eq!(
            projection.selections[0].rects,
            vec![Rect::new(0.0, 10.0, 30.0, 20.0)]
        );
    }

    #[test]
    fn collapsed_and_stale_selections_are_skipped() {
        let mut collapsed = peer(2);
        collapsed.selection = Some(LogicalRange::collapsed(Point::new(vec![0, 0], 1)));
        let mut stale = peer(3);
        stale.selection = Some(LogicalRange::new(
            Point::new(vec![0, 0], 0),
            Point::new(vec![9, 0], 1),
        ));
        let projection = CursorProjector::project(&[collapsed, stale], &doc(), &surface());
        assert!(projection.selections.is_empty());
    }

    #[test]
    fn refresh_reports_only_changes() {
        let mut projector = CursorProjector::new();
        let mut p = peer(2);
        p.cursor = Some(CursorPosition::new(1.0, 1.0));
        let peers = vec![p];
        assert!(projector.refresh(&peers, &doc(), &surface()).is_some());
        assert!(projector.refresh(&peers, &doc(), &surface()).is_none());

        assert_eq!(
            projector.refresh(&[], &doc(), &surface()),
            Some(Projection::default())
        );
        assert!(projector.refresh(&[], &doc(), &surface()).is_none());
    }
}
