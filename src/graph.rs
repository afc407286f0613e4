//! Arena-backed commit graph with explicit reference counting.
//!
//! Commits form a tree: many children may share a parent, each commit has
//! exactly one parent (or none for a root). Nodes live in an arena keyed by
//! [`CommitId`] handles that are minted monotonically and never reused. A
//! node is kept alive by its reference count: one reference per child node,
//! per registered branch head, and per explicit [`CommitGraph::retain`].
//! When the count reaches zero the node is freed and the reference it held
//! on its parent is released, cascading up the chain until a still-referenced
//! ancestor stops it.
//!
//! Nodes are never mutated after creation, with one graph-internal
//! exception: [`CommitGraph::detach_parent`] severs a node's parent link
//! when history older than that node is evicted.
//!
//! All ancestry queries are O(depth): they walk parent links only.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::{RevisionId, SessionId};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Handle to a commit node in the arena. Never reused once freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(u64);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Handle to a registered branch head. Each live branch registers exactly
/// one; the registration holds a reference on the head commit and makes the
/// branch enumerable for the eviction liveness scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadId(u64);

// ---------------------------------------------------------------------------
// CommitNode
// ---------------------------------------------------------------------------

/// A single commit: an opaque change plus identity and ancestry.
#[derive(Debug)]
struct CommitNode<C> {
    revision: RevisionId,
    session: SessionId,
    change: C,
    parent: Option<CommitId>,
    ref_count: usize,
}

// ---------------------------------------------------------------------------
// CommitGraph
// ---------------------------------------------------------------------------

/// The shared commit arena. One instance underlies the trunk, the local
/// branch, every peer branch, and every fork.
#[derive(Debug)]
pub struct CommitGraph<C> {
    nodes: HashMap<u64, CommitNode<C>>,
    heads: HashMap<u64, CommitId>,
    next_commit: u64,
    next_head: u64,
}

impl<C> Default for CommitGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommitGraph<C> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            heads: HashMap::new(),
            next_commit: 0,
            next_head: 0,
        }
    }

    /// Number of live commit nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no commit nodes are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: CommitId) -> bool {
        self.nodes.contains_key(&id.0)
    }

    // -- construction --

    /// Allocate a new commit as a child of `parent` (or a root when `None`).
    ///
    /// The new node starts with a reference count of zero; callers keep it
    /// alive by registering a head at it, retaining it, or creating a child.
    /// The parent gains one reference.
    pub fn create(
        &mut self,
        parent: Option<CommitId>,
        revision: RevisionId,
        session: SessionId,
        change: C,
    ) -> CommitId {
        if let Some(p) = parent {
            self.node_mut(p).ref_count += 1;
        }
        let id = CommitId(self.next_commit);
        self.next_commit += 1;
        self.nodes.insert(
            id.0,
            CommitNode {
                revision,
                session,
                change,
                parent,
                ref_count: 0,
            },
        );
        id
    }

    // -- accessors (panic on stale handles: using a freed commit is a bug) --

    /// The revision of `id`.
    ///
    /// # Panics
    /// Panics if `id` has been freed.
    #[must_use]
    pub fn revision(&self, id: CommitId) -> &RevisionId {
        &self.node(id).revision
    }

    /// The authoring session of `id`.
    ///
    /// # Panics
    /// Panics if `id` has been freed.
    #[must_use]
    pub fn session(&self, id: CommitId) -> &SessionId {
        &self.node(id).session
    }

    /// The change carried by `id`.
    ///
    /// # Panics
    /// Panics if `id` has been freed.
    #[must_use]
    pub fn change(&self, id: CommitId) -> &C {
        &self.node(id).change
    }

    /// The parent of `id`, if any.
    ///
    /// # Panics
    /// Panics if `id` has been freed.
    #[must_use]
    pub fn parent(&self, id: CommitId) -> Option<CommitId> {
        self.node(id).parent
    }

    /// The current reference count of `id` (children + heads + retains).
    ///
    /// # Panics
    /// Panics if `id` has been freed.
    #[must_use]
    pub fn ref_count(&self, id: CommitId) -> usize {
        self.node(id).ref_count
    }

    fn node(&self, id: CommitId) -> &CommitNode<C> {
        self.nodes
            .get(&id.0)
            .unwrap_or_else(|| panic!("commit {id} is not in the arena (freed or never created)"))
    }

    fn node_mut(&mut self, id: CommitId) -> &mut CommitNode<C> {
        self.nodes
            .get_mut(&id.0)
            .unwrap_or_else(|| panic!("commit {id} is not in the arena (freed or never created)"))
    }

    // -- reference counting --

    /// Add an explicit reference to `id`.
    ///
    /// # Panics
    /// Panics if `id` has been freed.
    pub fn retain(&mut self, id: CommitId) {
        self.node_mut(id).ref_count += 1;
    }

    /// Drop a reference to `id`, freeing it (and cascading up its ancestry)
    /// if the count reaches zero.
    ///
    /// # Panics
    /// Panics if `id` has been freed or has no outstanding references.
    pub fn release(&mut self, id: CommitId) {
        let node = self.node_mut(id);
        assert!(node.ref_count > 0, "release of unreferenced commit {id}");
        node.ref_count -= 1;
        if node.ref_count == 0 {
            self.free(id);
        }
    }

    fn free(&mut self, id: CommitId) {
        let node = self
            .nodes
            .remove(&id.0)
            .unwrap_or_else(|| panic!("commit {id} freed twice"));
        if let Some(parent) = node.parent {
            self.release(parent);
        }
    }

    /// Sever the parent link of `id`, releasing the reference it held.
    ///
    /// This is the eviction primitive: once trunk history older than `id` is
    /// dropped, `id` becomes a root and its no-longer-referenced ancestors
    /// are freed.
    ///
    /// # Panics
    /// Panics if `id` has been freed.
    pub fn detach_parent(&mut self, id: CommitId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.release(parent);
        }
    }

    // -- head registry --

    /// Register a branch head at `commit`, holding a reference on it.
    pub fn register_head(&mut self, commit: CommitId) -> HeadId {
        self.retain(commit);
        let head = HeadId(self.next_head);
        self.next_head += 1;
        self.heads.insert(head.0, commit);
        head
    }

    /// Move a registered head to `commit`, retaining the new target before
    /// releasing the old one.
    ///
    /// # Panics
    /// Panics if `head` is not registered.
    pub fn move_head(&mut self, head: HeadId, commit: CommitId) {
        let old = *self
            .heads
            .get(&head.0)
            .unwrap_or_else(|| panic!("unregistered head handle"));
        if old == commit {
            return;
        }
        self.retain(commit);
        self.heads.insert(head.0, commit);
        self.release(old);
    }

    /// The commit a registered head currently points at.
    ///
    /// # Panics
    /// Panics if `head` is not registered.
    #[must_use]
    pub fn head_commit(&self, head: HeadId) -> CommitId {
        *self
            .heads
            .get(&head.0)
            .unwrap_or_else(|| panic!("unregistered head handle"))
    }

    /// Deregister a head, releasing its reference.
    ///
    /// # Panics
    /// Panics if `head` is not registered.
    pub fn drop_head(&mut self, head: HeadId) {
        let commit = self
            .heads
            .remove(&head.0)
            .unwrap_or_else(|| panic!("unregistered head handle"));
        self.release(commit);
    }

    /// Iterate over all registered heads. Used by the eviction liveness
    /// scan to find the oldest trunk commit any live branch still roots on.
    pub fn heads(&self) -> impl Iterator<Item = CommitId> + '_ {
        self.heads.values().copied()
    }

    // -- ancestry queries (all O(depth)) --

    /// Walk parent links from `from` until `predicate` matches, collecting
    /// the traversed path.
    ///
    /// Returns the matching ancestor and the commits strictly between it and
    /// `from` inclusive of `from`, ordered oldest first — exactly the span
    /// whose changes compose into the delta from the ancestor to `from`.
    /// Returns `None` if no ancestor matches.
    ///
    /// # Panics
    /// Panics if `from` has been freed.
    pub fn find_ancestor(
        &self,
        from: CommitId,
        mut predicate: impl FnMut(CommitId) -> bool,
    ) -> Option<(CommitId, Vec<CommitId>)> {
        let mut path = Vec::new();
        let mut cursor = from;
        loop {
            if predicate(cursor) {
                path.reverse();
                return Some((cursor, path));
            }
            path.push(cursor);
            cursor = self.parent(cursor)?;
        }
    }

    /// Returns `true` if `ancestor` is an ancestor of (or equal to)
    /// `descendant`.
    ///
    /// # Panics
    /// Panics if `descendant` has been freed.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: CommitId, descendant: CommitId) -> bool {
        self.find_ancestor(descendant, |c| c == ancestor).is_some()
    }

    /// The nearest common ancestor of `a` and `b`, if they share one.
    ///
    /// # Panics
    /// Panics if `a` or `b` has been freed.
    #[must_use]
    pub fn common_ancestor(&self, a: CommitId, b: CommitId) -> Option<CommitId> {
        let mut seen = HashSet::new();
        let mut cursor = Some(a);
        while let Some(c) = cursor {
            seen.insert(c);
            cursor = self.parent(c);
        }
        let (found, _) = self.find_ancestor(b, |c| seen.contains(&c))?;
        Some(found)
    }

    /// The commits strictly after `ancestor` up to and including
    /// `descendant`, oldest first. Empty when the two are equal.
    ///
    /// # Panics
    /// Panics if `ancestor` is not an ancestor of `descendant`, or if either
    /// has been freed.
    #[must_use]
    pub fn path_between(&self, ancestor: CommitId, descendant: CommitId) -> Vec<CommitId> {
        let (_, path) = self
            .find_ancestor(descendant, |c| c == ancestor)
            .unwrap_or_else(|| panic!("{ancestor} is not an ancestor of {descendant}"));
        path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
