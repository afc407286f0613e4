//! Transaction stack: grouping edits for squash-or-rollback.
//!
//! A [`Transactor`] wraps a base branch. While a transaction is open, edits
//! land on a forked *active branch*; the base branch only changes when the
//! outermost frame commits, at which point the transaction's commits are
//! either squashed into a single composed commit or replayed individually.
//! Aborting a frame restores the state at the frame's start by applying the
//! composed inverse of the frame's commits, newest first.
//!
//! Frames are explicit records (start head plus an optional on-pop cleanup)
//! rather than closures over mutable state, so commit/abort ordering is
//! inspectable and re-entrancy is a type-level non-issue.

use crate::branch::Branch;
use crate::events::{BranchEvent, ChangeDelta, EventSink};
use crate::graph::CommitId;
use crate::rebaser::ChangeRebaser;
use crate::types::RevisionId;

/// Cleanup hook returned by an on-start callback, run when its frame pops.
pub type OnPop = Box<dyn FnOnce()>;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One open transaction frame.
struct Frame {
    /// Head of the active branch when the frame opened.
    start_head: CommitId,
    /// Cleanup to run when the frame pops (commit or abort).
    on_pop: Option<OnPop>,
}

// ---------------------------------------------------------------------------
// Transactor
// ---------------------------------------------------------------------------

/// A stack of nested transaction frames over a base branch.
pub struct Transactor<C, R>
where
    C: Clone,
    R: ChangeRebaser<Change = C>,
{
    base: Branch<C, R>,
    /// Present exactly while at least one frame is open.
    active: Option<Branch<C, R>>,
    frames: Vec<Frame>,
    squash_on_commit: bool,
}

impl<C, R> Transactor<C, R>
where
    C: Clone,
    R: ChangeRebaser<Change = C>,
{
    /// Wrap `base`. When `squash_on_commit` is set, the outermost commit
    /// composes the transaction's edits into one commit on the base branch;
    /// otherwise they are replayed individually.
    #[must_use]
    pub const fn new(base: Branch<C, R>, squash_on_commit: bool) -> Self {
        Self {
            base,
            active: None,
            frames: Vec::new(),
            squash_on_commit,
        }
    }

    /// Number of open frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.frames.is_empty()
    }

    /// The base branch (unchanged while a transaction is open).
    #[must_use]
    pub const fn base(&self) -> &Branch<C, R> {
        &self.base
    }

    /// The active branch's event sink, while a transaction is open.
    ///
    /// Subscribers use this to tell the transaction's provisional events
    /// apart from the base branch's.
    #[must_use]
    pub fn active_events(&self) -> Option<&EventSink<BranchEvent<C>>> {
        self.active.as_ref().map(Branch::events)
    }

    /// The branch edits currently land on: the active branch while a
    /// transaction is open, the base branch otherwise.
    #[must_use]
    pub fn branch(&self) -> &Branch<C, R> {
        self.active.as_ref().unwrap_or(&self.base)
    }

    /// Open a new frame with no on-pop cleanup.
    pub fn start(&mut self) {
        self.start_with(|_| None);
    }

    /// Open a new frame, invoking `on_start` with the branch edits will
    /// land on; the returned cleanup (if any) runs when this frame pops.
    pub fn start_with(&mut self, on_start: impl FnOnce(&Branch<C, R>) -> Option<OnPop>) {
        if self.active.is_none() {
            self.active = Some(self.base.fork());
        }
        let active = self.active.as_ref().expect("just ensured an active branch");
        let start_head = active.head();
        let on_pop = on_start(active);
        self.frames.push(Frame { start_head, on_pop });
        self.base.events().emit(BranchEvent::TransactionStarted);
    }

    /// Apply an edit. Inside a transaction it lands on the active branch;
    /// outside, directly on the base branch.
    ///
    /// # Panics
    /// Panics if the underlying branch is disposed.
    pub fn apply(&mut self, change: C, revision: RevisionId) -> CommitId {
        match self.active.as_mut() {
            Some(active) => active.apply(change, revision),
            None => self.base.apply(change, revision),
        }
    }

    /// Commit the innermost frame. When the outermost frame commits, the
    /// transaction's edits move to the base branch — squashed into one
    /// composed commit or replayed individually — and the intermediate
    /// commits are discarded.
    ///
    /// # Panics
    /// Panics if no transaction is open.
    pub fn commit(&mut self) {
        let frame = self
            .frames
            .pop()
            .unwrap_or_else(|| panic!("commit() with no open transaction"));
        self.base.events().emit(BranchEvent::TransactionCommitting);
        if let Some(on_pop) = frame.on_pop {
            on_pop();
        }
        if !self.frames.is_empty() {
            return;
        }

        let active = self.active.take().expect("open frame implies active branch");
        let (changes, revisions) = {
            let graph = active.graph().borrow();
            let span = graph.path_between(self.base.head(), active.head());
            let changes: Vec<C> = span.iter().map(|&id| graph.change(id).clone()).collect();
            let revisions: Vec<RevisionId> =
                span.iter().map(|&id| graph.revision(id).clone()).collect();
            (changes, revisions)
        };

        if changes.is_empty() {
            return;
        }
        if self.squash_on_commit {
            let composed = self.base.rebaser().compose(&changes);
            let revision = revisions.last().expect("non-empty span").clone();
            self.base.apply(composed, revision);
        } else {
            for (change, revision) in changes.into_iter().zip(revisions) {
                self.base.apply(change, revision);
            }
        }
        // `active` drops here, freeing the unsquashed intermediates.
    }

    /// Abort the innermost frame, restoring the state at its start.
    ///
    /// The composed inverse of the frame's commits (newest first) is emitted
    /// as the active branch's `Replace` delta so view layers can unwind.
    ///
    /// # Panics
    /// Panics if no transaction is open.
    pub fn abort(&mut self) {
        let frame = self
            .frames
            .pop()
            .unwrap_or_else(|| panic!("abort() with no open transaction"));
        self.base.events().emit(BranchEvent::TransactionAborting);

        let active = self.active.as_mut().expect("open frame implies active branch");
        let rollback = {
            let graph = active.graph().borrow();
            let span = graph.path_between(frame.start_head, active.head());
            if span.is_empty() {
                None
            } else {
                let rebaser = active.rebaser();
                let inverses: Vec<C> = span
                    .iter()
                    .rev()
                    .map(|&id| rebaser.invert(graph.change(id)))
                    .collect();
                Some((
                    rebaser.compose(&inverses),
                    graph.revision(frame.start_head).clone(),
                ))
            }
        };
        if let Some((net, revision)) = rollback {
            active
                .events()
                .emit(BranchEvent::AfterChange(ChangeDelta::Replace {
                    revision,
                    net,
                }));
            active.set_head(frame.start_head);
        }
        if let Some(on_pop) = frame.on_pop {
            on_pop();
        }
        if self.frames.is_empty() {
            self.active = None;
        }
    }

    /// Abort every remaining frame, innermost first, and return the base
    /// branch.
    pub fn dispose(mut self) -> Branch<C, R> {
        while self.in_transaction() {
            self.abort();
        }
        self.base
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
