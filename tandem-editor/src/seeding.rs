//! Bootstrap seeding: writes a joining client's initial content into an
//! empty replica, at most once per binding.

use error_stack::{Report, ResultExt};
use tandem_core::{
    Document, EmptinessPolicy, Node, Operation, OperationBatch, OperationContext,
    ReplicatedDocument,
};
use tracing::{debug, info};

use crate::adapter::DocumentAdapter;
use crate::error::{AdapterError, NotBound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The initial content was written into the replica.
    Seeded,
    /// The replica already had content; nothing was written.
    ReplicaHasContent,
    /// The replica was empty but the initial content carries nothing.
    NothingToSeed,
    /// Seeding already ran for this binding.
    AlreadyComplete,
}

#[derive(Debug, Default)]
pub struct SeedingController {
    policy: EmptinessPolicy,
    complete: bool,
}

impl SeedingController {
    #[must_use]
    pub fn new(policy: EmptinessPolicy) -> Self {
        Self {
            policy,
            complete: false,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Starts over for a fresh binding.
    pub fn reset(&mut self) {
        self.complete = false;
    }

    /// Seeds `initial` into the adapter's replica if the replica is empty.
    ///
    /// Completion is recorded before anything is written, so a failed seed
    /// is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] if the adapter is unbound or the seed batch
    /// cannot be committed.
    pub fn seed_if_empty<R: ReplicatedDocument>(
        &mut self,
        adapter: &mut DocumentAdapter<R>,
        initial: &Document,
    ) -> Result<SeedOutcome, Report<AdapterError>> {
        if self.complete {
            return Ok(SeedOutcome::AlreadyComplete);
        }
        let replica = adapter
            .replica()
            .ok_or_else(|| Report::new(AdapterError).attach(NotBound))?;
        let empty = match self.policy {
            EmptinessPolicy::Strict => replica.is_empty(),
            EmptinessPolicy::IgnoreBlank => {
                replica.is_empty()
                    || !replica
                        .materialize()
                        .change_context(AdapterError)?
                        .is_meaningful()
            }
        };
        self.complete = true;

        if !empty {
            debug!("replica has content, not seeding");
            return Ok(SeedOutcome::ReplicaHasContent);
        }
        if !initial.is_meaningful() {
            debug!("initial content is blank, nothing to seed");
            return Ok(SeedOutcome::NothingToSeed);
        }

        let current = adapter.document().map_or(0, |doc| doc.children.len());
        let batch = replace_batch(current, initial);
        adapter
            .apply_local(&batch)
            .attach(OperationContext::SEEDING)?;
        info!(blocks = initial.children.len(), "seeded replica with initial content");
        Ok(SeedOutcome::Seeded)
    }
}

/// Removes `current` top-level blocks, then inserts copies of `initial`'s.
fn replace_batch(current: usize, initial: &Document) -> OperationBatch {
    let removals = (0..current).map(|_| Operation::RemoveNode { path: vec![0] });
    let inserts = initial
        .children
        .iter()
        .enumerate()
        .map(|(index, block)| Operation::InsertNode {
            path: vec![index],
            node: Node::Block(block.clone()),
        });
    removals.chain(inserts).collect()
}

#[cfg(test)]
mod tests {
    use tandem_core::{Block, BlockKind, Leaf};

    use super::*;
    use crate::adapter::LocalDocument;
    use crate::yrs_replica::YrsReplica;

    fn adapter_with(replica: YrsReplica) -> DocumentAdapter<YrsReplica> {
        let mut adapter = DocumentAdapter::new();
        adapter.bind(LocalDocument::default(), replica);
        adapter
    }

    fn hello() -> Document {
        Document::new(vec![Block::text("Hello")])
    }

    #[test]
    fn seeds_empty_replica_once() {
        let mut adapter = adapter_with(YrsReplica::with_client_id(1));
        let mut seeding = SeedingController::default();

        assert_eq!(
            seeding.seed_if_empty(&mut adapter, &hello()).unwrap(),
            SeedOutcome::Seeded
        );
        assert_eq!(adapter.document().unwrap(), &hello());
        assert_eq!(adapter.replica().unwrap().materialize().unwrap(), hello());
        assert_eq!(adapter.stats().forwarded, 1);

        assert_eq!(
            seeding.seed_if_empty(&mut adapter, &hello()).unwrap(),
            SeedOutcome::AlreadyComplete
        );
        assert_eq!(adapter.stats().forwarded, 1);
    }

    #[test]
    fn never_overwrites_existing_content() {
        let mut source = YrsReplica::with_client_id(1);
        source
            .apply_local_operations(&[Operation::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "Existing".into(),
            }])
            .unwrap();
        let replica = YrsReplica::from_snapshot(&source.snapshot().unwrap(), 2).unwrap();
        let mut adapter = adapter_with(replica);
        let mut seeding = SeedingController::default();

        assert_eq!(
            seeding.seed_if_empty(&mut adapter, &hello()).unwrap(),
            SeedOutcome::ReplicaHasContent
        );
        assert_eq!(adapter.document().unwrap().plain_text(), "Existing");
        assert!(seeding.is_complete());
    }

    #[test]
    fn blank_initial_content_is_not_seeded() {
        let mut adapter = adapter_with(YrsReplica::with_client_id(1));
        let mut seeding = SeedingController::default();
        let blank = Document::new(vec![Block::text("  \n ")]);

        assert_eq!(
            seeding.seed_if_empty(&mut adapter, &blank).unwrap(),
            SeedOutcome::NothingToSeed
        );
        assert!(adapter.replica().unwrap().is_empty());
        assert_eq!(adapter.stats().forwarded, 0);
    }

    #[test]
    fn non_default_kind_counts_as_content() {
        let mut adapter = adapter_with(YrsReplica::with_client_id(1));
        let mut seeding = SeedingController::default();
        let rule = Document::new(vec![Block::new(
            BlockKind::Image {
                url: "https://example.com/a.png".into(),
            },
            vec![Leaf::default().into()],
        )]);
        assert_eq!(
            seeding.seed_if_empty(&mut adapter, &rule).unwrap(),
            SeedOutcome::Seeded
        );
    }

    #[test]
    fn ignore_blank_policy_reseeds_blank_replica() {
        let mut source = YrsReplica::with_client_id(1);
        source
            .apply_local_operations(&[Operation::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "   ".into(),
            }])
            .unwrap();
        let snapshot = source.snapshot().unwrap();

        let mut strict = adapter_with(YrsReplica::from_snapshot(&snapshot, 2).unwrap());
        assert_eq!(
            SeedingController::new(EmptinessPolicy::Strict)
                .seed_if_empty(&mut strict, &hello())
                .unwrap(),
            SeedOutcome::ReplicaHasContent
        );

        let mut lenient = adapter_with(YrsReplica::from_snapshot(&snapshot, 3).unwrap());
        assert_eq!(
            SeedingController::new(EmptinessPolicy::IgnoreBlank)
                .seed_if_empty(&mut lenient, &hello())
                .unwrap(),
            SeedOutcome::Seeded
        );
        assert_eq!(lenient.document().unwrap(), &hello());
    }

    #[test]
    fn reset_allows_seeding_a_new_binding() {
        let mut seeding = SeedingController::default();
        let mut first = adapter_with(YrsReplica::with_client_id(1));
        seeding.seed_if_empty(&mut first, &hello()).unwrap();

        seeding.reset();
        let mut second = adapter_with(YrsReplica::with_client_id(2));
        assert_eq!(
            seeding.seed_if_empty(&mut second, &hello()).unwrap(),
            SeedOutcome::Seeded
        );
    }
}
