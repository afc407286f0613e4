//! trellis — convergence engine for a collaborative, tree-structured
//! document store.
//!
//! The crate reconciles edits produced concurrently by multiple
//! collaborators into a single, deterministic, linear history every
//! participant eventually agrees on, without a central lock and without
//! blocking local edits on the network. It is generic over the document's
//! change type: the host supplies a [`ChangeRebaser`] (compose / invert /
//! rebase) and the engine never looks inside a change.
//!
//! Layering, leaves first:
//!
//! - [`graph`] — arena commit graph with explicit reference counting
//! - [`branch`] — mutable cursors: apply, fork, rebase, dispose
//! - [`transaction`] — nested squash-or-rollback frames over a branch
//! - [`manager`] — trunk sequencing, peer shadow branches, eviction
//! - [`summary`] — the persisted/exchanged form of manager state

pub mod branch;
pub mod error;
pub mod events;
pub mod graph;
pub mod manager;
pub mod rebaser;
pub mod summary;
pub mod transaction;
pub mod types;

pub use branch::Branch;
pub use error::{ProtocolError, SummaryError};
pub use events::{BranchEvent, ChangeDelta, EventSink, TrunkEvent};
pub use graph::{CommitGraph, CommitId};
pub use manager::EditManager;
pub use rebaser::{ChangeRebaser, CounterRebaser};
pub use summary::{CommitData, EditSummary, PeerBranchData, TrunkCommitData, TrunkOrigin};
pub use transaction::{OnPop, Transactor};
pub use types::{RevisionId, SequenceNumber, SessionId, ValidationError};
