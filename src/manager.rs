//! The edit manager: trunk sequencing, peer rebasing, and eviction.
//!
//! One manager per editing session. It owns the trunk (the canonical chain
//! of sequenced commits every peer agrees on), the local branch (optimistic
//! edits not yet confirmed by the ordering authority), and one shadow branch
//! per remote session reconstructing that peer's local state — the machinery
//! that lets a future commit from the same peer be rebased relative to what
//! the peer actually saw, not what the trunk looks like now.
//!
//! Sequencing is single-threaded and synchronous: one inbound sequenced
//! change or one local edit at a time, no blocking, no internal parallelism.
//! Convergence across peers is delegated entirely to the rebase algebra.
//!
//! Trunk history is bounded: once every peer has observed a prefix
//! ([`EditManager::advance_minimum_sequence_number`]), the prefix is evicted
//! unless some live branch still roots inside it, in which case eviction is
//! deferred until that branch is rebased forward or disposed.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use crate::branch::Branch;
use crate::error::{ProtocolError, SummaryError};
use crate::events::{BranchEvent, EventSink, TrunkEvent};
use crate::graph::{CommitGraph, CommitId};
use crate::rebaser::ChangeRebaser;
use crate::summary::{CommitData, EditSummary, PeerBranchData, TrunkCommitData, TrunkOrigin};
use crate::types::{RevisionId, SequenceNumber, SessionId};

// ---------------------------------------------------------------------------
// TrunkEntry
// ---------------------------------------------------------------------------

/// One retained sequenced commit.
#[derive(Debug)]
struct TrunkEntry {
    commit: CommitId,
    revision: RevisionId,
    session: SessionId,
    seq: SequenceNumber,
}

// ---------------------------------------------------------------------------
// EditManager
// ---------------------------------------------------------------------------

/// Coordinator for one editing session: trunk, local branch, peer branches.
#[derive(Debug)]
pub struct EditManager<C, R>
where
    C: Clone,
    R: ChangeRebaser<Change = C>,
{
    graph: Rc<RefCell<CommitGraph<C>>>,
    rebaser: Rc<R>,
    local_session: SessionId,
    events: EventSink<TrunkEvent<C>>,
    /// Retained sequenced commits, oldest first.
    trunk: VecDeque<TrunkEntry>,
    /// Every retained trunk node (base anchor included) to its position.
    trunk_index: HashMap<CommitId, SequenceNumber>,
    /// The newest evicted commit (or the document origin): peer references
    /// at exactly this position still resolve, but its change is gone.
    base_anchor: CommitId,
    base_seq: SequenceNumber,
    /// Tip of the trunk; equals `base_anchor` while no entries are retained.
    tip: CommitId,
    local: Branch<C, R>,
    peers: BTreeMap<SessionId, Branch<C, R>>,
    /// Highest minimum sequence number observed so far.
    min_seq: SequenceNumber,
}

impl<C, R> EditManager<C, R>
where
    C: Clone,
    R: ChangeRebaser<Change = C>,
{
    /// The revision stamped on a freshly-created document origin.
    ///
    /// Caller-minted revisions must not collide with it.
    #[must_use]
    pub fn origin_revision() -> RevisionId {
        RevisionId::new("origin").expect("static origin revision is valid")
    }

    /// Create a manager for a new, empty document.
    ///
    /// `local_events` receives the local branch's notifications (appends
    /// from local edits, replace deltas from rebases); `trunk_events`
    /// receives per-sequenced-commit and eviction notifications.
    pub fn new(
        rebaser: R,
        local_session: SessionId,
        local_events: EventSink<BranchEvent<C>>,
        trunk_events: EventSink<TrunkEvent<C>>,
    ) -> Self {
        let rebaser = Rc::new(rebaser);
        let graph = Rc::new(RefCell::new(CommitGraph::new()));
        let origin = {
            let mut g = graph.borrow_mut();
            let origin = g.create(
                None,
                Self::origin_revision(),
                local_session.clone(),
                rebaser.empty(),
            );
            g.retain(origin); // base anchor
            g.retain(origin); // trunk tip
            origin
        };
        let local = Branch::new(
            Rc::clone(&graph),
            Rc::clone(&rebaser),
            local_session.clone(),
            origin,
            local_events,
        );
        let mut trunk_index = HashMap::new();
        trunk_index.insert(origin, SequenceNumber::ZERO);
        Self {
            graph,
            rebaser,
            local_session,
            events: trunk_events,
            trunk: VecDeque::new(),
            trunk_index,
            base_anchor: origin,
            base_seq: SequenceNumber::ZERO,
            tip: origin,
            local,
            peers: BTreeMap::new(),
            min_seq: SequenceNumber::ZERO,
        }
    }

    // -- accessors --

    /// The session this manager edits as.
    #[must_use]
    pub const fn local_session(&self) -> &SessionId {
        &self.local_session
    }

    /// The trunk event sink.
    #[must_use]
    pub const fn events(&self) -> &EventSink<TrunkEvent<C>> {
        &self.events
    }

    /// The local branch. Apply optimistic edits through
    /// [`Self::local_branch_mut`].
    #[must_use]
    pub const fn local_branch(&self) -> &Branch<C, R> {
        &self.local
    }

    /// Mutable access to the local branch for applying local edits.
    pub const fn local_branch_mut(&mut self) -> &mut Branch<C, R> {
        &mut self.local
    }

    /// Fork the local branch into an independent, liveness-tracked view.
    ///
    /// While the fork is alive, trunk history it roots on is exempt from
    /// eviction.
    #[must_use]
    pub fn fork_local(&self) -> Branch<C, R> {
        self.local.fork()
    }

    /// Number of retained trunk commits.
    #[must_use]
    pub fn trunk_length(&self) -> usize {
        self.trunk.len()
    }

    /// The sequence number of the trunk tip (the base anchor's when no
    /// entries are retained).
    #[must_use]
    pub fn trunk_tip_sequence_number(&self) -> SequenceNumber {
        self.trunk.back().map_or(self.base_seq, |e| e.seq)
    }

    /// The trunk tip commit handle. After a fast-forward this is the very
    /// commit the local branch applied.
    #[must_use]
    pub const fn trunk_tip_commit(&self) -> CommitId {
        self.tip
    }

    /// The highest minimum sequence number observed so far.
    #[must_use]
    pub const fn minimum_sequence_number(&self) -> SequenceNumber {
        self.min_seq
    }

    /// The changes of all retained trunk commits, oldest first.
    #[must_use]
    pub fn trunk_changes(&self) -> Vec<C> {
        let graph = self.graph.borrow();
        self.trunk
            .iter()
            .map(|entry| graph.change(entry.commit).clone())
            .collect()
    }

    /// The revisions of all retained trunk commits, oldest first.
    #[must_use]
    pub fn trunk_revisions(&self) -> Vec<RevisionId> {
        self.trunk.iter().map(|entry| entry.revision.clone()).collect()
    }

    /// Outstanding local commits (applied but not yet sequenced), oldest
    /// first, in their current rebased form.
    #[must_use]
    pub fn local_commits(&self) -> Vec<CommitData<C>> {
        let graph = self.graph.borrow();
        graph
            .path_between(self.tip, self.local.head())
            .into_iter()
            .map(|id| CommitData {
                revision: graph.revision(id).clone(),
                session_id: graph.session(id).clone(),
                change: graph.change(id).clone(),
            })
            .collect()
    }

    /// The maximum count of not-yet-trunk commits across the local branch
    /// and every peer branch. Callers use this to bound the quadratic worst
    /// case of rebase work.
    #[must_use]
    pub fn longest_branch_length(&self) -> usize {
        let graph = self.graph.borrow();
        let branch_len = |head: CommitId| {
            let (_, path) = graph
                .find_ancestor(head, |c| self.trunk_index.contains_key(&c))
                .expect("every live branch descends from retained trunk history");
            path.len()
        };
        let local = branch_len(self.local.head());
        self.peers
            .values()
            .map(|peer| branch_len(peer.head()))
            .fold(local, usize::max)
    }

    // -- sequencing --

    /// Ingest one sequenced change from the ordering authority.
    ///
    /// `seq` is the position the authority assigned; `ref_seq` is the trunk
    /// position the author had observed when it produced the change (only
    /// consulted for peer-authored commits).
    ///
    /// Locally-authored commits fast-forward: the already-applied local
    /// commit is reused as the new trunk tip. Peer commits are rebased over
    /// the trunk span the author had not seen, recorded on the peer's
    /// shadow branch, and appended; the local branch is then re-rooted on
    /// the new tip so outstanding local edits stay on top of all known
    /// history.
    ///
    /// # Errors
    /// - [`ProtocolError::SequenceRegression`] if `seq` precedes the tip.
    /// - [`ProtocolError::ReferenceEvicted`] if `ref_seq` names evicted
    ///   history.
    /// - [`ProtocolError::LocalCommitOutOfOrder`] if a local commit is
    ///   confirmed out of submission order.
    pub fn add_sequenced_change(
        &mut self,
        commit: CommitData<C>,
        seq: SequenceNumber,
        ref_seq: SequenceNumber,
    ) -> Result<(), ProtocolError> {
        let tip_seq = self.trunk_tip_sequence_number();
        if seq < tip_seq {
            return Err(ProtocolError::SequenceRegression {
                delivered: seq,
                trunk_tip: tip_seq,
            });
        }
        if commit.session_id == self.local_session {
            self.sequence_local(commit, seq)
        } else {
            self.sequence_peer(commit, seq, ref_seq)
        }
    }

    /// A confirmation of one of our own optimistic edits. The local branch
    /// keeps itself rebased onto the trunk tip, so its oldest outstanding
    /// commit is always a direct child of the tip carrying the correctly
    /// rebased change — sequencing it is a pure fast-forward.
    fn sequence_local(
        &mut self,
        commit: CommitData<C>,
        seq: SequenceNumber,
    ) -> Result<(), ProtocolError> {
        let oldest = {
            let graph = self.graph.borrow();
            graph
                .path_between(self.tip, self.local.head())
                .first()
                .copied()
        };
        let Some(oldest) = oldest else {
            return Err(ProtocolError::LocalCommitOutOfOrder {
                delivered: commit.revision,
                expected: "no outstanding local commits".to_owned(),
            });
        };
        let (revision, change) = {
            let graph = self.graph.borrow();
            (graph.revision(oldest).clone(), graph.change(oldest).clone())
        };
        if revision != commit.revision {
            return Err(ProtocolError::LocalCommitOutOfOrder {
                delivered: commit.revision,
                expected: revision.to_string(),
            });
        }
        self.push_trunk(oldest, revision, self.local_session.clone(), seq, change);
        // The local branch already descends through the new tip; remaining
        // outstanding commits sit exactly where they should.
        Ok(())
    }

    /// A peer-authored commit: rebase it over the trunk span the author had
    /// not observed, using the peer's shadow branch so edits stacked on the
    /// peer's own unconfirmed work land correctly.
    fn sequence_peer(
        &mut self,
        commit: CommitData<C>,
        seq: SequenceNumber,
        ref_seq: SequenceNumber,
    ) -> Result<(), ProtocolError> {
        if ref_seq < self.base_seq {
            return Err(ProtocolError::ReferenceEvicted {
                reference: ref_seq,
                oldest_retained: self.base_seq,
            });
        }
        let base = self.trunk_commit_at(ref_seq);
        let tip = self.tip;

        let mut peer = self.peers.remove(&commit.session_id).unwrap_or_else(|| {
            tracing::debug!("creating shadow branch for session {}", commit.session_id);
            Branch::new(
                Rc::clone(&self.graph),
                Rc::clone(&self.rebaser),
                commit.session_id.clone(),
                base,
                EventSink::new(),
            )
        });

        // The peer has observed everything at or before `ref_seq`; commits
        // of its branch sequenced inside that span are elided here.
        peer.rebase_onto_commit(base);

        let node = if peer.head() == base {
            // No outstanding peer edits: rebase directly over the unseen
            // trunk span.
            let over = {
                let graph = self.graph.borrow();
                let span: Vec<C> = graph
                    .path_between(base, tip)
                    .iter()
                    .map(|&id| graph.change(id).clone())
                    .collect();
                self.rebaser.compose(&span)
            };
            let rebased = self.rebaser.rebase(&commit.change, &over);
            let node = self.graph.borrow_mut().create(
                Some(tip),
                commit.revision.clone(),
                commit.session_id.clone(),
                rebased,
            );
            peer.set_head(node);
            node
        } else {
            // The peer stacked this edit on its own unconfirmed work:
            // record the original change in the peer's context, then let
            // the branch rebase contextualize it against the full trunk.
            peer.apply(commit.change.clone(), commit.revision.clone());
            peer.rebase_onto_commit(tip);
            peer.head()
        };

        // Shadow branches have no subscribers; drop their bookkeeping
        // events instead of letting them accumulate.
        let _ = peer.events().drain();
        self.peers.insert(commit.session_id.clone(), peer);

        let change = self.graph.borrow().change(node).clone();
        self.push_trunk(node, commit.revision, commit.session_id, seq, change);

        // Outstanding local edits ride on top of all known history.
        self.local.rebase_onto_commit(node);
        Ok(())
    }

    /// Adopt `node` (already a child of the current tip) as the new trunk
    /// tip and notify consumers.
    fn push_trunk(
        &mut self,
        node: CommitId,
        revision: RevisionId,
        session: SessionId,
        seq: SequenceNumber,
        change: C,
    ) {
        self.trunk.push_back(TrunkEntry {
            commit: node,
            revision: revision.clone(),
            session: session.clone(),
            seq,
        });
        self.trunk_index.insert(node, seq);
        {
            let mut graph = self.graph.borrow_mut();
            graph.retain(node);
            graph.release(self.tip);
        }
        self.tip = node;
        self.events.emit(TrunkEvent::Appended {
            revision,
            session,
            sequence_number: seq,
            change,
        });
    }

    /// The retained trunk commit a reference sequence number resolves to:
    /// the newest entry at or before `ref_seq`, or the base anchor.
    fn trunk_commit_at(&self, ref_seq: SequenceNumber) -> CommitId {
        let idx = self.trunk.partition_point(|entry| entry.seq <= ref_seq);
        if idx == 0 {
            self.base_anchor
        } else {
            self.trunk[idx - 1].commit
        }
    }

    // -- eviction --

    /// Record that every peer has observed all trunk commits at or before
    /// `msn`, and evict the trunk prefix no live branch still roots inside.
    ///
    /// The scan is positional: a prefix `[0..=k]` is evictable only when
    /// every registered branch head (local, peer, and any undisposed fork)
    /// roots at entry `k` or later — a branch rooted at the base anchor
    /// pins everything. Eviction blocked by a lagging branch is deferred,
    /// not lost: the observed `msn` is remembered and the prefix goes on a
    /// later call once the branch moves forward or is disposed.
    ///
    /// Returns the number of trunk commits evicted.
    pub fn advance_minimum_sequence_number(&mut self, msn: SequenceNumber) -> usize {
        let tip_seq = self.trunk_tip_sequence_number();
        let msn = if msn > tip_seq {
            tracing::warn!(
                "minimum sequence number {msn} is ahead of the trunk tip {tip_seq}; clamping"
            );
            tip_seq
        } else {
            msn
        };
        if msn > self.min_seq {
            self.min_seq = msn;
        }

        let Some(cut) = self.evictable_prefix() else {
            return 0;
        };

        let mut revisions = Vec::with_capacity(cut + 1);
        let mut anchor = self.base_anchor;
        let mut anchor_seq = self.base_seq;
        for _ in 0..=cut {
            let entry = self.trunk.pop_front().expect("prefix bounded by length");
            self.trunk_index.remove(&entry.commit);
            revisions.push(entry.revision);
            anchor = entry.commit;
            anchor_seq = entry.seq;
        }

        {
            let mut graph = self.graph.borrow_mut();
            graph.retain(anchor);
            graph.release(self.base_anchor);
            graph.detach_parent(anchor);
        }
        self.trunk_index.remove(&self.base_anchor);
        self.trunk_index.insert(anchor, anchor_seq);
        self.base_anchor = anchor;
        self.base_seq = anchor_seq;
        if self.trunk.is_empty() {
            // The anchor is also the tip now; both retains land on it.
            debug_assert_eq!(self.tip, anchor);
        }

        tracing::debug!(evicted = revisions.len(), "trunk history evicted");
        let count = revisions.len();
        self.events.emit(TrunkEvent::AncestryTrimmed { revisions });
        count
    }

    /// The largest evictable prefix `[0..=k]` under the observed minimum
    /// sequence number and the liveness of registered branch heads, if any.
    fn evictable_prefix(&self) -> Option<usize> {
        // Prefix allowed by the minimum sequence number alone.
        let by_msn = self.trunk.partition_point(|entry| entry.seq <= self.min_seq);
        if by_msn == 0 {
            return None;
        }
        let candidate = by_msn - 1;

        // Tighten by liveness: find the oldest position any branch roots at.
        let graph = self.graph.borrow();
        let mut pin: Option<usize> = None;
        for head in graph.heads() {
            let (root, _) = graph
                .find_ancestor(head, |c| self.trunk_index.contains_key(&c))
                .expect("every live branch descends from retained trunk history");
            if root == self.base_anchor {
                return None; // pins the whole retained prefix
            }
            let position = self
                .trunk
                .iter()
                .position(|entry| entry.commit == root)
                .expect("trunk-indexed node is a retained entry");
            pin = Some(pin.map_or(position, |p| p.min(position)));
        }
        Some(pin.map_or(candidate, |p| p.min(candidate)))
    }

    // -- summaries --

    /// Capture the manager's state for persistence or exchange.
    #[must_use]
    pub fn summarize(&self) -> EditSummary<C> {
        let graph = self.graph.borrow();
        let origin = TrunkOrigin {
            revision: graph.revision(self.base_anchor).clone(),
            sequence_number: self.base_seq,
        };
        let trunk = self
            .trunk
            .iter()
            .map(|entry| TrunkCommitData {
                revision: entry.revision.clone(),
                session_id: entry.session.clone(),
                change: graph.change(entry.commit).clone(),
                sequence_number: entry.seq,
            })
            .collect();
        let peer_local_branches = self
            .peers
            .iter()
            .map(|(session, branch)| {
                let (root, path) = graph
                    .find_ancestor(branch.head(), |c| self.trunk_index.contains_key(&c))
                    .expect("peer branch descends from retained trunk history");
                let commits = path
                    .into_iter()
                    .map(|id| CommitData {
                        revision: graph.revision(id).clone(),
                        session_id: graph.session(id).clone(),
                        change: graph.change(id).clone(),
                    })
                    .collect();
                (
                    session.clone(),
                    PeerBranchData {
                        base: graph.revision(root).clone(),
                        commits,
                    },
                )
            })
            .collect();
        EditSummary {
            origin,
            trunk,
            peer_local_branches,
        }
    }

    /// Rehydrate a manager from previously captured state.
    ///
    /// The summary is structurally validated first. After loading, the
    /// local branch sits empty at the trunk head.
    ///
    /// # Errors
    /// Returns a [`SummaryError`] if the summary fails validation.
    pub fn load(
        summary: EditSummary<C>,
        rebaser: R,
        local_session: SessionId,
        local_events: EventSink<BranchEvent<C>>,
        trunk_events: EventSink<TrunkEvent<C>>,
    ) -> Result<Self, SummaryError> {
        summary.validate()?;
        let rebaser = Rc::new(rebaser);
        let graph = Rc::new(RefCell::new(CommitGraph::new()));

        let mut trunk = VecDeque::with_capacity(summary.trunk.len());
        let mut trunk_index = HashMap::new();
        let mut by_revision: HashMap<RevisionId, CommitId> = HashMap::new();
        let (origin_node, tip) = {
            let mut g = graph.borrow_mut();
            let origin_node = g.create(
                None,
                summary.origin.revision.clone(),
                local_session.clone(),
                rebaser.empty(),
            );
            g.retain(origin_node); // base anchor
            trunk_index.insert(origin_node, summary.origin.sequence_number);
            by_revision.insert(summary.origin.revision.clone(), origin_node);

            let mut tip = origin_node;
            for entry in summary.trunk {
                let node = g.create(
                    Some(tip),
                    entry.revision.clone(),
                    entry.session_id.clone(),
                    entry.change,
                );
                trunk_index.insert(node, entry.sequence_number);
                by_revision.insert(entry.revision.clone(), node);
                trunk.push_back(TrunkEntry {
                    commit: node,
                    revision: entry.revision,
                    session: entry.session_id,
                    seq: entry.sequence_number,
                });
                tip = node;
            }
            g.retain(tip); // trunk tip
            (origin_node, tip)
        };

        let mut peers = BTreeMap::new();
        for (session, data) in summary.peer_local_branches {
            let base = by_revision[&data.base];
            let mut branch = Branch::new(
                Rc::clone(&graph),
                Rc::clone(&rebaser),
                session.clone(),
                base,
                EventSink::new(),
            );
            for commit in data.commits {
                branch.apply(commit.change, commit.revision);
            }
            let _ = branch.events().drain();
            peers.insert(session, branch);
        }

        let local = Branch::new(
            Rc::clone(&graph),
            Rc::clone(&rebaser),
            local_session.clone(),
            tip,
            local_events,
        );

        Ok(Self {
            graph,
            rebaser,
            local_session,
            events: trunk_events,
            trunk,
            trunk_index,
            base_anchor: origin_node,
            base_seq: summary.origin.sequence_number,
            tip,
            local,
            peers,
            min_seq: summary.origin.sequence_number,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::rebaser::CounterRebaser;

    use super::*;

    type Manager = EditManager<i64, CounterRebaser>;

    fn rev(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    fn sess(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    fn manager(session: &str) -> Manager {
        EditManager::new(
            CounterRebaser,
            sess(session),
            EventSink::new(),
            EventSink::new(),
        )
    }

    fn data(session: &str, revision: &str, change: i64) -> CommitData<i64> {
        CommitData {
            revision: rev(revision),
            session_id: sess(session),
            change,
        }
    }

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber(n)
    }

    #[test]
    fn new_manager_is_empty() {
        let m = manager("alice");
        assert_eq!(m.trunk_length(), 0);
        assert_eq!(m.trunk_tip_sequence_number(), SequenceNumber::ZERO);
        assert!(m.local_commits().is_empty());
        assert_eq!(m.longest_branch_length(), 0);
    }

    #[test]
    fn local_edit_is_immediately_visible() {
        let mut m = manager("alice");
        m.local_branch_mut().apply(5, rev("alice:1"));
        let outstanding = m.local_commits();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].change, 5);
        assert_eq!(m.trunk_length(), 0, "not sequenced yet");
    }

    #[test]
    fn own_commit_fast_forwards_to_reference_identical_tip() {
        let mut m = manager("alice");
        let applied = m.local_branch_mut().apply(5, rev("alice:1"));
        m.add_sequenced_change(data("alice", "alice:1", 5), seq(1), seq(0))
            .unwrap();
        assert_eq!(
            m.trunk_tip_commit(),
            applied,
            "fast-forward reuses the local commit, not a rebased copy"
        );
        assert_eq!(m.trunk_length(), 1);
        assert!(m.local_commits().is_empty());
    }

    #[test]
    fn own_commit_out_of_order_is_protocol_error() {
        let mut m = manager("alice");
        m.local_branch_mut().apply(1, rev("alice:1"));
        m.local_branch_mut().apply(2, rev("alice:2"));
        let err = m
            .add_sequenced_change(data("alice", "alice:2", 2), seq(1), seq(0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::LocalCommitOutOfOrder { .. }));
    }

    #[test]
    fn own_commit_without_outstanding_is_protocol_error() {
        let mut m = manager("alice");
        let err = m
            .add_sequenced_change(data("alice", "alice:1", 1), seq(1), seq(0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::LocalCommitOutOfOrder { .. }));
    }

    #[test]
    fn sequence_regression_is_protocol_error() {
        let mut m = manager("alice");
        m.add_sequenced_change(data("bob", "bob:1", 1), seq(3), seq(0))
            .unwrap();
        let err = m
            .add_sequenced_change(data("bob", "bob:2", 1), seq(2), seq(0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::SequenceRegression { .. }));
    }

    #[test]
    fn peer_commit_rebases_over_unseen_trunk_span() {
        // Two local commits sequenced at 1 and 2; a peer commit referencing
        // 0 must be rebased over compose([c1, c2]) before landing at 3.
        let mut m = manager("alice");
        m.local_branch_mut().apply(10, rev("alice:1"));
        m.add_sequenced_change(data("alice", "alice:1", 10), seq(1), seq(0))
            .unwrap();
        m.local_branch_mut().apply(20, rev("alice:2"));
        m.add_sequenced_change(data("alice", "alice:2", 20), seq(2), seq(1))
            .unwrap();

        let trunk_events = m.events().clone();
        let _ = trunk_events.drain();
        m.add_sequenced_change(data("bob", "bob:1", 7), seq(3), seq(0))
            .unwrap();

        assert_eq!(m.trunk_length(), 3);
        assert_eq!(m.trunk_changes(), vec![10, 20, 7]);
        let events = trunk_events.drain();
        assert!(matches!(
            &events[0],
            TrunkEvent::Appended { sequence_number: SequenceNumber(3), change: 7, .. }
        ));
    }

    #[test]
    fn peer_commit_reroots_outstanding_local_edits() {
        let mut m = manager("alice");
        m.local_branch_mut().apply(100, rev("alice:1"));
        m.add_sequenced_change(data("bob", "bob:1", 7), seq(1), seq(0))
            .unwrap();

        let outstanding = m.local_commits();
        assert_eq!(outstanding.len(), 1, "local edit still outstanding");
        assert_eq!(outstanding[0].revision, rev("alice:1"));
        // The outstanding commit now sits on top of bob's trunk commit.
        let graph = m.local_branch().graph().borrow();
        let head = m.local_branch().head();
        assert_eq!(graph.parent(head), Some(m.trunk_tip_commit()));
    }

    #[test]
    fn own_commit_after_interleaved_peer_still_fast_forwards() {
        let mut m = manager("alice");
        m.local_branch_mut().apply(100, rev("alice:1"));
        m.add_sequenced_change(data("bob", "bob:1", 7), seq(1), seq(0))
            .unwrap();
        // alice:1 was rebased onto bob's commit by the local branch; its
        // rebased node is what the trunk adopts.
        let rebased_head = m.local_branch().head();
        m.add_sequenced_change(data("alice", "alice:1", 100), seq(2), seq(0))
            .unwrap();
        assert_eq!(m.trunk_tip_commit(), rebased_head);
        assert!(m.local_commits().is_empty());
        assert_eq!(m.trunk_changes(), vec![7, 100]);
    }

    #[test]
    fn peer_stacked_edits_use_shadow_branch_context() {
        // Bob authors bob:1 then bob:2, both referencing 0 — bob:2 was
        // stacked on bob:1 locally. The engine must not double-apply bob:1
        // when contextualizing bob:2.
        let mut m = manager("alice");
        m.add_sequenced_change(data("bob", "bob:1", 7), seq(1), seq(0))
            .unwrap();
        m.add_sequenced_change(data("bob", "bob:2", 5), seq(2), seq(0))
            .unwrap();
        assert_eq!(m.trunk_changes(), vec![7, 5]);
        assert_eq!(m.longest_branch_length(), 0);
    }

    #[test]
    fn peer_reference_to_evicted_history_is_protocol_error() {
        let mut m = manager("alice");
        for i in 1..=4 {
            m.add_sequenced_change(
                data("bob", &format!("bob:{i}"), 1),
                seq(i),
                seq(i - 1),
            )
            .unwrap();
        }
        m.advance_minimum_sequence_number(seq(3));
        assert_eq!(m.minimum_sequence_number(), seq(3));
        let err = m
            .add_sequenced_change(data("carol", "carol:1", 2), seq(5), seq(1))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ReferenceEvicted { .. }));
    }

    #[test]
    fn peer_reference_at_eviction_boundary_resolves() {
        let mut m = manager("alice");
        for i in 1..=4 {
            m.add_sequenced_change(
                data("bob", &format!("bob:{i}"), 1),
                seq(i),
                seq(i - 1),
            )
            .unwrap();
        }
        m.advance_minimum_sequence_number(seq(3));
        m.add_sequenced_change(data("carol", "carol:1", 2), seq(5), seq(3))
            .unwrap();
        assert_eq!(m.trunk_tip_sequence_number(), seq(5));
    }

    #[test]
    fn eviction_boundary_scenarios() {
        // Trunk commits 1..10, each sequenced at its own number.
        let mut m = manager("alice");
        for i in 1..=10 {
            m.local_branch_mut().apply(1, rev(&format!("alice:{i}")));
            m.add_sequenced_change(
                data("alice", &format!("alice:{i}"), 1),
                seq(i),
                seq(i - 1),
            )
            .unwrap();
        }
        assert_eq!(m.trunk_length(), 10);

        assert_eq!(m.advance_minimum_sequence_number(seq(5)), 5);
        assert_eq!(m.trunk_length(), 5, "advance(5) leaves exactly five");

        assert_eq!(m.advance_minimum_sequence_number(seq(10)), 5);
        assert_eq!(m.trunk_length(), 0, "advance(10) leaves zero");
    }

    #[test]
    fn eviction_emits_trimmed_revisions() {
        let mut m = manager("alice");
        for i in 1..=3 {
            m.add_sequenced_change(
                data("bob", &format!("bob:{i}"), 1),
                seq(i),
                seq(i - 1),
            )
            .unwrap();
        }
        let events = m.events().clone();
        let _ = events.drain();
        m.advance_minimum_sequence_number(seq(2));
        let drained = events.drain();
        assert_eq!(
            drained,
            vec![TrunkEvent::AncestryTrimmed {
                revisions: vec![rev("bob:1"), rev("bob:2")],
            }]
        );
    }

    #[test]
    fn live_fork_defers_eviction_until_disposed() {
        let mut m = manager("alice");
        let fork = m.fork_local(); // roots at the origin
        for i in 1..=3 {
            m.add_sequenced_change(
                data("bob", &format!("bob:{i}"), 1),
                seq(i),
                seq(i - 1),
            )
            .unwrap();
        }

        assert_eq!(
            m.advance_minimum_sequence_number(seq(3)),
            0,
            "fork rooted at origin pins all retained history"
        );
        assert_eq!(m.trunk_length(), 3);

        drop(fork);
        assert_eq!(
            m.advance_minimum_sequence_number(seq(3)),
            3,
            "deferred eviction completes once the fork is gone"
        );
        assert_eq!(m.trunk_length(), 0);
    }

    #[test]
    fn rebasing_fork_forward_unblocks_eviction() {
        let mut m = manager("alice");
        let mut fork = m.fork_local();
        for i in 1..=3 {
            m.add_sequenced_change(
                data("bob", &format!("bob:{i}"), 1),
                seq(i),
                seq(i - 1),
            )
            .unwrap();
        }
        assert_eq!(m.advance_minimum_sequence_number(seq(2)), 0);

        fork.rebase_onto_commit(m.trunk_tip_commit());
        assert_eq!(
            m.advance_minimum_sequence_number(seq(2)),
            2,
            "fork moved forward; the remembered msn applies"
        );
        assert_eq!(m.trunk_length(), 1);
        drop(fork);
    }

    #[test]
    fn eviction_respects_lagging_peer_branch() {
        let mut m = manager("alice");
        // bob's shadow branch comes to rest at entry 1 after bob:1; carol's
        // commits advance the trunk past it.
        m.add_sequenced_change(data("bob", "bob:1", 1), seq(1), seq(0))
            .unwrap();
        m.add_sequenced_change(data("carol", "carol:1", 4), seq(2), seq(1))
            .unwrap();
        m.add_sequenced_change(data("carol", "carol:2", 6), seq(3), seq(2))
            .unwrap();

        // All three are covered by the msn, but bob's branch roots at the
        // first entry: only that entry may go (it becomes the anchor).
        assert_eq!(m.advance_minimum_sequence_number(seq(3)), 1);
        assert_eq!(m.trunk_length(), 2);

        // A fresh bob commit referencing 3 moves his branch to the tip;
        // the remembered msn finishes the deferred eviction.
        m.add_sequenced_change(data("bob", "bob:2", 8), seq(4), seq(3))
            .unwrap();
        assert_eq!(m.advance_minimum_sequence_number(seq(3)), 2);
        assert_eq!(m.trunk_length(), 1);
    }

    #[test]
    fn trunk_changes_and_revisions_in_order() {
        let mut m = manager("alice");
        m.add_sequenced_change(data("bob", "bob:1", 1), seq(1), seq(0))
            .unwrap();
        m.add_sequenced_change(data("carol", "carol:1", 2), seq(2), seq(1))
            .unwrap();
        assert_eq!(m.trunk_changes(), vec![1, 2]);
        assert_eq!(m.trunk_revisions(), vec![rev("bob:1"), rev("carol:1")]);
    }

    #[test]
    fn longest_branch_length_tracks_local_and_peers() {
        let mut m = manager("alice");
        m.local_branch_mut().apply(1, rev("alice:1"));
        m.local_branch_mut().apply(1, rev("alice:2"));
        assert_eq!(m.longest_branch_length(), 2);

        // Sequencing bob:1 re-roots the local edits; both stay outstanding.
        m.add_sequenced_change(data("bob", "bob:1", 1), seq(1), seq(0))
            .unwrap();
        assert_eq!(m.longest_branch_length(), 2);
    }

    #[test]
    fn equal_sequence_numbers_apply_in_presentation_order() {
        let mut m = manager("alice");
        m.add_sequenced_change(data("bob", "bob:1", 1), seq(1), seq(0))
            .unwrap();
        m.add_sequenced_change(data("carol", "carol:1", 2), seq(1), seq(0))
            .unwrap();
        assert_eq!(m.trunk_revisions(), vec![rev("bob:1"), rev("carol:1")]);
        assert_eq!(m.trunk_tip_sequence_number(), seq(1));
    }

    // -- summaries --

    #[test]
    fn summary_round_trip_preserves_trunk_and_peers() {
        let mut m = manager("alice");
        m.add_sequenced_change(data("bob", "bob:1", 7), seq(1), seq(0))
            .unwrap();
        m.add_sequenced_change(data("bob", "bob:2", 5), seq(2), seq(0))
            .unwrap();
        m.add_sequenced_change(data("carol", "carol:1", 3), seq(3), seq(2))
            .unwrap();

        let summary = m.summarize();
        summary.validate().unwrap();

        let loaded = Manager::load(
            summary.clone(),
            CounterRebaser,
            sess("alice"),
            EventSink::new(),
            EventSink::new(),
        )
        .unwrap();
        assert_eq!(loaded.trunk_changes(), m.trunk_changes());
        assert_eq!(loaded.trunk_revisions(), m.trunk_revisions());
        assert_eq!(loaded.summarize(), summary, "summarize is stable under load");
        assert!(loaded.local_commits().is_empty());
    }

    #[test]
    fn loaded_manager_continues_sequencing() {
        let mut m = manager("alice");
        m.add_sequenced_change(data("bob", "bob:1", 7), seq(1), seq(0))
            .unwrap();
        let summary = m.summarize();

        let mut loaded = Manager::load(
            summary,
            CounterRebaser,
            sess("alice"),
            EventSink::new(),
            EventSink::new(),
        )
        .unwrap();
        // bob stacks bob:2 on bob:1, still referencing 0; the rehydrated
        // shadow branch supplies the context.
        loaded
            .add_sequenced_change(data("bob", "bob:2", 5), seq(2), seq(0))
            .unwrap();
        assert_eq!(loaded.trunk_changes(), vec![7, 5]);
    }

    #[test]
    fn summary_after_eviction_anchors_at_boundary() {
        let mut m = manager("alice");
        for i in 1..=4 {
            m.add_sequenced_change(
                data("bob", &format!("bob:{i}"), 1),
                seq(i),
                seq(i - 1),
            )
            .unwrap();
        }
        m.advance_minimum_sequence_number(seq(4));
        let summary = m.summarize();
        assert_eq!(summary.origin.sequence_number, seq(4));
        assert_eq!(summary.origin.revision, rev("bob:4"));
        assert!(summary.trunk.is_empty());

        let loaded = Manager::load(
            summary,
            CounterRebaser,
            sess("alice"),
            EventSink::new(),
            EventSink::new(),
        )
        .unwrap();
        assert_eq!(loaded.trunk_tip_sequence_number(), seq(4));
    }

    #[test]
    fn load_rejects_malformed_summary() {
        let mut m = manager("alice");
        m.add_sequenced_change(data("bob", "bob:1", 7), seq(1), seq(0))
            .unwrap();
        let mut summary = m.summarize();
        summary
            .peer_local_branches
            .get_mut(&sess("bob"))
            .expect("bob has a shadow branch")
            .base = rev("ghost");
        // bob's shadow branch exists but roots nowhere known.
        let err = Manager::load(
            summary,
            CounterRebaser,
            sess("alice"),
            EventSink::new(),
            EventSink::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SummaryError::UnknownBase { .. }));
    }
}
