//! Document adapter: keeps the local editor tree and the replica in step.
//!
//! Local batches are committed to the tree, then their content operations
//! are forwarded into the replica. Remote updates are merged into the
//! replica, diffed against the tree and committed while the adapter is in
//! [`ApplyState::ApplyingRemote`], which is the only state that suppresses
//! forwarding.

use error_stack::{Report, ResultExt};
use tandem_core::{
    Document, LogicalRange, OperationBatch, OperationContext, ReplicaError, ReplicatedDocument,
};
use tracing::{debug, warn};

use crate::error::{AdapterError, NotBound};
use crate::translate;

/// The editing surface's state: its tree and the local selection.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDocument {
    pub tree: Document,
    pub selection: Option<LogicalRange>,
}

impl LocalDocument {
    #[must_use]
    pub fn new(tree: Document) -> Self {
        Self {
            tree,
            selection: None,
        }
    }
}

impl Default for LocalDocument {
    fn default() -> Self {
        Self::new(Document::empty())
    }
}

/// Whether the adapter is replaying a remote change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApplyState {
    #[default]
    Idle,
    ApplyingRemote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    /// Batches forwarded into the replica.
    pub forwarded: u64,
    /// Remote updates translated into local batches.
    pub remote_batches: u64,
    /// Commits that needed a structural repair.
    pub repairs: u64,
}

/// What a commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Committed {
    pub content_changed: bool,
    pub selection_changed: bool,
    pub forwarded: bool,
    pub repaired: bool,
}

/// A local document paired with its replica.
#[derive(Debug)]
pub struct Binding<R> {
    pub local: LocalDocument,
    pub replica: R,
}

#[derive(Debug)]
pub struct DocumentAdapter<R> {
    binding: Option<Binding<R>>,
    state: ApplyState,
    stats: AdapterStats,
}

impl<R> Default for DocumentAdapter<R> {
    fn default() -> Self {
        Self {
            binding: None,
            state: ApplyState::Idle,
            stats: AdapterStats::default(),
        }
    }
}

impl<R: ReplicatedDocument> DocumentAdapter<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `local` to `replica`, replacing the tree with the replica's
    /// content. Returns the previous binding, which is unbound first.
    pub fn bind(&mut self, local: LocalDocument, replica: R) -> Option<Binding<R>> {
        let previous = self.unbind();
        self.binding = Some(Binding { local, replica });
        if let Err(err) = self.reconcile() {
            warn!(?err, "initial reconcile with replica failed");
        }
        previous
    }

    /// Stops forwarding and hands back the tree and replica.
    pub fn unbind(&mut self) -> Option<Binding<R>> {
        self.state = ApplyState::Idle;
        self.binding.take()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    #[must_use]
    pub fn state(&self) -> ApplyState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> AdapterStats {
        self.stats
    }

    /// Current local tree, if bound.
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        self.binding.as_ref().map(|binding| &binding.local.tree)
    }

    #[must_use]
    pub fn selection(&self) -> Option<&LogicalRange> {
        self.binding.as_ref()?.local.selection.as_ref()
    }

    #[must_use]
    pub fn replica(&self) -> Option<&R> {
        self.binding.as_ref().map(|binding| &binding.replica)
    }

    pub fn replica_mut(&mut self) -> Option<&mut R> {
        self.binding.as_mut().map(|binding| &mut binding.replica)
    }

    /// Commits a batch from the editing surface.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] if not bound or the batch does not apply to
    /// the local tree; the tree is unchanged in that case. If the replica
    /// rejects the batch, the tree is reset to what the replica holds and
    /// an error is returned.
    pub fn apply_local(&mut self, batch: &OperationBatch) -> Result<Committed, Report<AdapterError>> {
        let before = match &self.binding {
            Some(binding) if batch.has_content() => Some(binding.local.clone()),
            _ => None,
        };
        match self.commit(batch) {
            Err(err) if err.contains::<ReplicaError>() => {
                if let (Some(binding), Some(before)) = (self.binding.as_mut(), before) {
                    binding.local = before;
                }
                if let Err(reload) = self.reconcile() {
                    warn!(?reload, "reloading from replica failed");
                }
                Err(err)
            }
            result => result,
        }
    }

    /// Merges a remote update and replays it on the local tree without
    /// forwarding it back.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] if not bound or the replica rejects the
    /// update.
    pub fn apply_remote(&mut self, update: &[u8]) -> Result<Committed, Report<AdapterError>> {
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| Report::new(AdapterError).attach(NotBound))?;
        binding
            .replica
            .apply_update(update)
            .change_context(AdapterError)
            .attach(OperationContext::APPLYING_REMOTE)?;
        self.reconcile()
    }

    /// Brings the local tree in line with the replica's materialized state.
    fn reconcile(&mut self) -> Result<Committed, Report<AdapterError>> {
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| Report::new(AdapterError).attach(NotBound))?;
        let target = binding
            .replica
            .materialize()
            .change_context(AdapterError)?;
        let ops = translate::diff(&binding.local.tree, &target);
        if ops.is_empty() {
            return Ok(Committed::default());
        }

        self.state = ApplyState::ApplyingRemote;
        let result = self.commit(&OperationBatch::new(ops));
        self.state = ApplyState::Idle;
        self.stats.remote_batches += 1;

        match result {
            Ok(committed) => Ok(committed),
            Err(err) => {
                warn!(?err, "remote translation failed, reloading from replica");
                let Some(binding) = self.binding.as_mut() else {
                    return Err(err);
                };
                binding.local.tree = target;
                if binding
                    .local
                    .selection
                    .as_ref()
                    .is_some_and(|range| !range.is_valid_in(&binding.local.tree))
                {
                    binding.local.selection = None;
                }
                Ok(Committed {
                    content_changed: true,
                    selection_changed: true,
                    forwarded: false,
                    repaired: false,
                })
            }
        }
    }

    fn commit(&mut self, batch: &OperationBatch) -> Result<Committed, Report<AdapterError>> {
        let state = self.state;
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| Report::new(AdapterError).attach(NotBound))?;
        binding
            .local
            .tree
            .apply_batch(batch)
            .change_context(AdapterError)?;

        let content = batch.content_operations();
        let mut forwarded = false;
        if !content.is_empty() && state == ApplyState::Idle {
            if let Err(err) = binding.replica.apply_local_operations(&content) {
                warn!(?err, "{}", OperationContext::FORWARDING_LOCAL);
                return Err(err
                    .change_context(AdapterError)
                    .attach(OperationContext::FORWARDING_LOCAL));
            }
            forwarded = true;
            self.stats.forwarded += 1;
        }

        let repairs = binding.local.tree.repair_operations();
        let repaired = !repairs.is_empty();
        if repaired {
            debug!(count = repairs.len(), "repairing document structure");
            binding
                .local
                .tree
                .apply_batch(&repairs)
                .change_context(AdapterError)?;
            self.stats.repairs += 1;
        }

        let previous = binding.local.selection.clone();
        let tree = &binding.local.tree;
        binding.local.selection = match batch.selection() {
            Some(selection) => selection.filter(|range| range.is_valid_in(tree)).cloned(),
            None => previous
                .as_ref()
                .and_then(|range| range.transform(content.iter().chain(&repairs), tree)),
        };

        Ok(Committed {
            content_changed: !content.is_empty() || repaired,
            selection_changed: binding.local.selection != previous,
            forwarded,
            repaired,
        })
    }
}
