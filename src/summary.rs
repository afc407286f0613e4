//! Summary data model — the persisted/exchanged form of manager state.
//!
//! A summary carries the retained trunk, the trunk origin (the base anchor
//! commits and peer branches root on), and each peer's outstanding commits
//! with their *original* changes. Parent links are never stored; they are
//! reconstructed at load time, and an extraneous cross-reference field is a
//! format error (`deny_unknown_fields`).
//!
//! JSON rules match the op-log conventions used across this codebase:
//! sorted map keys (`BTreeMap`), field order fixed by struct declaration,
//! serialize twice → identical bytes.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::SummaryError;
use crate::types::{RevisionId, SequenceNumber, SessionId};

// ---------------------------------------------------------------------------
// CommitData
// ---------------------------------------------------------------------------

/// A commit as carried by the delivery protocol and by peer branches in a
/// summary: identity plus the opaque change, nothing else.
///
/// `revision` and `session_id` are both mandatory; a summary entry missing
/// either does not deserialize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitData<C> {
    /// Unique revision of the commit.
    pub revision: RevisionId,
    /// Authoring session.
    pub session_id: SessionId,
    /// The opaque change payload.
    pub change: C,
}

// ---------------------------------------------------------------------------
// TrunkCommitData
// ---------------------------------------------------------------------------

/// A sequenced trunk commit in a summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrunkCommitData<C> {
    /// Unique revision of the commit.
    pub revision: RevisionId,
    /// Authoring session.
    pub session_id: SessionId,
    /// The change as it landed on the trunk (already rebased).
    pub change: C,
    /// Position assigned by the ordering authority.
    pub sequence_number: SequenceNumber,
}

// ---------------------------------------------------------------------------
// TrunkOrigin
// ---------------------------------------------------------------------------

/// The trunk base anchor: the newest commit evicted from the trunk (or the
/// document origin if nothing was ever evicted). Its change is gone; only
/// its identity and position survive, so that peer branches rooted exactly
/// at the eviction boundary still resolve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrunkOrigin {
    /// Revision of the anchor commit.
    pub revision: RevisionId,
    /// Its trunk position.
    pub sequence_number: SequenceNumber,
}

// ---------------------------------------------------------------------------
// PeerBranchData
// ---------------------------------------------------------------------------

/// One peer's reconstructed local branch: where it roots on the trunk and
/// its commits (original, unrebased changes) in application order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerBranchData<C> {
    /// Revision of the trunk commit (or origin) the branch roots on.
    pub base: RevisionId,
    /// The branch's commits, oldest first.
    pub commits: Vec<CommitData<C>>,
}

// ---------------------------------------------------------------------------
// EditSummary
// ---------------------------------------------------------------------------

/// Complete manager state for persistence or exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditSummary<C> {
    /// The trunk base anchor.
    pub origin: TrunkOrigin,
    /// Retained trunk commits, oldest first.
    pub trunk: Vec<TrunkCommitData<C>>,
    /// Peer branches keyed by session. `BTreeMap` keeps the JSON form
    /// deterministic.
    pub peer_local_branches: BTreeMap<SessionId, PeerBranchData<C>>,
}

impl<C> EditSummary<C> {
    /// Structurally validate the summary.
    ///
    /// Checks, in order: trunk sequence numbers are non-decreasing starting
    /// from the origin; no revision (origin, trunk, or peer commit) appears
    /// twice; every peer base names the origin or a trunk revision.
    ///
    /// # Errors
    /// Returns the first [`SummaryError`] found.
    pub fn validate(&self) -> Result<(), SummaryError> {
        let mut previous = self.origin.sequence_number;
        for entry in &self.trunk {
            if entry.sequence_number < previous {
                return Err(SummaryError::UnorderedTrunk {
                    previous,
                    following: entry.sequence_number,
                });
            }
            previous = entry.sequence_number;
        }

        let mut seen: HashSet<&RevisionId> = HashSet::new();
        seen.insert(&self.origin.revision);
        for revision in self
            .trunk
            .iter()
            .map(|entry| &entry.revision)
            .chain(
                self.peer_local_branches
                    .values()
                    .flat_map(|branch| branch.commits.iter().map(|c| &c.revision)),
            )
        {
            if !seen.insert(revision) {
                return Err(SummaryError::DuplicateRevision {
                    revision: revision.clone(),
                });
            }
        }

        let trunk_revisions: HashSet<&RevisionId> =
            self.trunk.iter().map(|entry| &entry.revision).collect();
        for (session, branch) in &self.peer_local_branches {
            if branch.base != self.origin.revision && !trunk_revisions.contains(&branch.base) {
                return Err(SummaryError::UnknownBase {
                    session: session.clone(),
                    base: branch.base.clone(),
                });
            }
        }
        Ok(())
    }
}

impl<C: Serialize> EditSummary<C> {
    /// Serialize to canonical JSON bytes (deterministic: two calls with the
    /// same summary produce identical bytes).
    ///
    /// # Errors
    /// Returns an error if the change type fails to serialize.
    pub fn to_json(&self) -> Result<Vec<u8>, SummaryError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<C: DeserializeOwned> EditSummary<C> {
    /// Deserialize and structurally validate a summary.
    ///
    /// # Errors
    /// Returns an error if the bytes are not valid JSON for this shape
    /// (unknown fields included) or if [`EditSummary::validate`] fails.
    pub fn from_json(bytes: &[u8]) -> Result<Self, SummaryError> {
        let summary: Self = serde_json::from_slice(bytes)?;
        summary.validate()?;
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
