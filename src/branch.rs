//! Branches: mutable cursors into the commit graph.
//!
//! A branch owns exactly one mutable thing, its head. Applying an edit
//! creates a child commit and advances the head; forking shares the head at
//! that instant and diverges thereafter; rebasing re-roots the branch's own
//! commits on top of another branch's head. Every head is registered in the
//! shared [`CommitGraph`], which both keeps the chain alive and makes the
//! branch visible to the trunk eviction liveness scan.
//!
//! Rebasing works commit by commit, preserving each commit's revision. A
//! commit whose revision already appears on the target path is elided — it
//! is the branch's already-sequenced prefix, and re-applying it would double
//! its effect. The remaining commits are rebased over an evolving context
//! shift; the final shift is exactly the net delta between the old and new
//! head states, which is what the `Replace` notification carries.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::events::{BranchEvent, ChangeDelta, EventSink};
use crate::graph::{CommitGraph, CommitId, HeadId};
use crate::rebaser::ChangeRebaser;
use crate::types::{RevisionId, SessionId};

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// A mutable cursor into the shared commit graph.
///
/// Dropping a branch releases its hold on the commit chain; explicit
/// [`Branch::dispose`] does the same and additionally makes any further use
/// a fatal programmer error.
#[derive(Debug)]
pub struct Branch<C, R> {
    graph: Rc<RefCell<CommitGraph<C>>>,
    rebaser: Rc<R>,
    session: SessionId,
    head: CommitId,
    head_handle: Option<HeadId>,
    events: EventSink<BranchEvent<C>>,
}

impl<C, R> Branch<C, R>
where
    C: Clone,
    R: ChangeRebaser<Change = C>,
{
    /// Create a branch at `head`, registering it in the graph's head table.
    ///
    /// `session` is stamped on every commit this branch mints; `events`
    /// receives this branch's notifications (keep a clone to drain).
    pub fn new(
        graph: Rc<RefCell<CommitGraph<C>>>,
        rebaser: Rc<R>,
        session: SessionId,
        head: CommitId,
        events: EventSink<BranchEvent<C>>,
    ) -> Self {
        let head_handle = graph.borrow_mut().register_head(head);
        Self {
            graph,
            rebaser,
            session,
            head,
            head_handle: Some(head_handle),
            events,
        }
    }

    /// The current head commit.
    ///
    /// # Panics
    /// Panics if the branch is disposed.
    #[must_use]
    pub fn head(&self) -> CommitId {
        self.assert_live();
        self.head
    }

    /// The revision of the current head commit.
    ///
    /// # Panics
    /// Panics if the branch is disposed.
    #[must_use]
    pub fn head_revision(&self) -> RevisionId {
        self.assert_live();
        self.graph.borrow().revision(self.head).clone()
    }

    /// The session this branch stamps on new commits.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The event sink this branch emits into.
    #[must_use]
    pub fn events(&self) -> &EventSink<BranchEvent<C>> {
        &self.events
    }

    /// Returns `true` once the branch has been disposed.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.head_handle.is_none()
    }

    /// Apply `change` as a new commit on top of the head.
    ///
    /// Emits [`BranchEvent::AfterChange`] with an `Append` delta and returns
    /// the new commit's handle.
    ///
    /// # Panics
    /// Panics if the branch is disposed.
    pub fn apply(&mut self, change: C, revision: RevisionId) -> CommitId {
        self.assert_live();
        let handle = self.head_handle.expect("live branch has a head handle");
        let new_head = {
            let mut graph = self.graph.borrow_mut();
            let id = graph.create(
                Some(self.head),
                revision.clone(),
                self.session.clone(),
                change.clone(),
            );
            graph.move_head(handle, id);
            id
        };
        self.head = new_head;
        self.events
            .emit(BranchEvent::AfterChange(ChangeDelta::Append {
                revision,
                change,
            }));
        new_head
    }

    /// Fork a new, independent branch at the current head.
    ///
    /// The fork gets its own event sink and its own head registration;
    /// subsequent edits on either branch do not affect the other.
    ///
    /// # Panics
    /// Panics if the branch is disposed.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.assert_live();
        Self::new(
            Rc::clone(&self.graph),
            Rc::clone(&self.rebaser),
            self.session.clone(),
            self.head,
            EventSink::new(),
        )
    }

    /// Rebase this branch onto another branch's head.
    ///
    /// See [`Branch::rebase_onto_commit`].
    ///
    /// # Panics
    /// Panics if either branch is disposed.
    pub fn rebase_onto(&mut self, other: &Self) {
        other.assert_live();
        self.rebase_onto_commit(other.head);
    }

    /// Rebase this branch onto an arbitrary commit.
    ///
    /// A no-op when `onto` is already an ancestor of (or equal to) the
    /// head. Otherwise the branch's own commits since the common ancestor
    /// are re-rooted on top of `onto`: commits whose revisions already
    /// appear on the target path are elided (reported via
    /// `AncestryTrimmed`), the rest are rebased one by one with their
    /// revisions preserved. Emits `AfterChange` with a `Replace` delta
    /// carrying the net change from the old head state to the new one.
    ///
    /// # Panics
    /// Panics if the branch is disposed, or if `onto` shares no ancestry
    /// with the head (a violated graph invariant).
    pub fn rebase_onto_commit(&mut self, onto: CommitId) {
        self.assert_live();
        let handle = self.head_handle.expect("live branch has a head handle");

        let (new_head, elided, net) = {
            let mut graph = self.graph.borrow_mut();
            if graph.is_ancestor(onto, self.head) {
                return;
            }
            let ancestor = graph
                .common_ancestor(self.head, onto)
                .unwrap_or_else(|| panic!("rebase target {onto} shares no ancestry with branch"));
            let src_path = graph.path_between(ancestor, self.head);
            let target_path = graph.path_between(ancestor, onto);

            let target_changes: Vec<C> =
                target_path.iter().map(|&id| graph.change(id).clone()).collect();
            let target_revisions: HashSet<RevisionId> = target_path
                .iter()
                .map(|&id| graph.revision(id).clone())
                .collect();

            // `shift` maps the context before the next source commit to the
            // context at the tip of the rebased chain.
            let mut shift = self.rebaser.compose(&target_changes);
            let mut new_head = onto;
            let mut elided = Vec::new();

            for id in src_path {
                let change = graph.change(id).clone();
                let revision = graph.revision(id).clone();
                let session = graph.session(id).clone();
                let inverse = self.rebaser.invert(&change);
                if target_revisions.contains(&revision) {
                    // Already sequenced into the target; its effect is part
                    // of `shift` and must not be re-applied.
                    shift = self.rebaser.compose(&[inverse, shift]);
                    elided.push(revision);
                } else {
                    let rebased = self.rebaser.rebase(&change, &shift);
                    shift = self.rebaser.compose(&[inverse, shift, rebased.clone()]);
                    new_head = graph.create(Some(new_head), revision, session, rebased);
                }
            }

            graph.move_head(handle, new_head);
            (new_head, elided, shift)
        };

        tracing::debug!(
            elided = elided.len(),
            "rebased branch of session {}",
            self.session
        );

        self.head = new_head;
        if !elided.is_empty() {
            self.events
                .emit(BranchEvent::AncestryTrimmed { revisions: elided });
        }
        let revision = self.graph.borrow().revision(new_head).clone();
        self.events
            .emit(BranchEvent::AfterChange(ChangeDelta::Replace {
                revision,
                net,
            }));
    }

    /// Mark the branch inert and release its hold on the commit chain.
    ///
    /// Any subsequent operation on this branch panics. Dropping an
    /// undisposed branch releases the same resources without the
    /// use-after-dispose guard.
    ///
    /// # Panics
    /// Panics if the branch is already disposed.
    pub fn dispose(&mut self) {
        self.assert_live();
        let handle = self.head_handle.take().expect("live branch has a head handle");
        self.graph.borrow_mut().drop_head(handle);
    }

    fn assert_live(&self) {
        assert!(
            self.head_handle.is_some(),
            "operation on disposed branch (session '{}')",
            self.session
        );
    }

    pub(crate) fn graph(&self) -> &Rc<RefCell<CommitGraph<C>>> {
        &self.graph
    }

    pub(crate) fn rebaser(&self) -> &Rc<R> {
        &self.rebaser
    }

    /// Move the head directly to an existing commit without rebasing.
    ///
    /// Used by the manager when an already-correct commit (a fast-forwarded
    /// local commit or a freshly-rebased peer commit) becomes the new
    /// anchor. No events are emitted: the observable state is unchanged.
    pub(crate) fn set_head(&mut self, commit: CommitId) {
        self.assert_live();
        let handle = self.head_handle.expect("live branch has a head handle");
        self.graph.borrow_mut().move_head(handle, commit);
        self.head = commit;
    }
}

impl<C, R> Drop for Branch<C, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.head_handle.take() {
            self.graph.borrow_mut().drop_head(handle);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
