//! Error types for the convergence engine.
//!
//! Two families, matching the engine's failure taxonomy:
//!
//! - [`ProtocolError`] — an inbound sequenced change referenced history the
//!   manager does not (or no longer) retain, or arrived out of protocol
//!   order. Fatal to the call and never silently recovered: it indicates a
//!   desynchronized peer or a storage bug upstream.
//! - [`SummaryError`] — persisted summary data failed structural
//!   validation at load time. Rejected, not repaired.
//!
//! Programmer-usage errors (operating on a disposed branch, popping an
//! empty transaction stack) are panics, not variants here — they are bugs
//! in the calling code, intended to surface during development.

use thiserror::Error;

use crate::types::{RevisionId, SequenceNumber, SessionId, ValidationError};

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// A violation of the sequencing protocol by an inbound change.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A sequence number lower than the current trunk tip was delivered.
    #[error(
        "sequence number {delivered} regresses behind the trunk tip {trunk_tip}; \
         the ordering authority must deliver non-decreasing positions"
    )]
    SequenceRegression {
        /// The sequence number carried by the offending change.
        delivered: SequenceNumber,
        /// The trunk tip at the time of delivery.
        trunk_tip: SequenceNumber,
    },

    /// A reference sequence number below the retained trunk base.
    #[error(
        "reference sequence number {reference} precedes retained history \
         (oldest retained base is {oldest_retained}); the peer is desynchronized"
    )]
    ReferenceEvicted {
        /// The reference the peer claimed to have observed.
        reference: SequenceNumber,
        /// The oldest trunk position still retained.
        oldest_retained: SequenceNumber,
    },

    /// A locally-authored commit was sequenced out of submission order.
    #[error(
        "sequenced local commit {delivered} does not match the oldest \
         outstanding local commit ({expected}); local edits must be \
         confirmed in FIFO order"
    )]
    LocalCommitOutOfOrder {
        /// The revision the authority sequenced.
        delivered: RevisionId,
        /// The revision the manager expected to see confirmed next, or a
        /// description of why none was outstanding.
        expected: String,
    },
}

// ---------------------------------------------------------------------------
// SummaryError
// ---------------------------------------------------------------------------

/// A structural defect in loaded summary data.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// A peer branch names a base revision that is not on the summary trunk.
    #[error("peer branch for session '{session}' is based on revision '{base}', which is not a trunk revision in the summary")]
    UnknownBase {
        /// The peer whose branch is malformed.
        session: SessionId,
        /// The base revision that failed to resolve.
        base: RevisionId,
    },

    /// The same revision appears more than once across the summary.
    #[error("revision '{revision}' appears more than once in the summary")]
    DuplicateRevision {
        /// The repeated revision.
        revision: RevisionId,
    },

    /// Trunk sequence numbers are not non-decreasing.
    #[error(
        "trunk sequence numbers must be non-decreasing: {previous} is followed by {following}"
    )]
    UnorderedTrunk {
        /// The earlier entry's sequence number.
        previous: SequenceNumber,
        /// The out-of-order successor.
        following: SequenceNumber,
    },

    /// An identifier in the summary failed validation.
    #[error("malformed identifier in summary: {0}")]
    Identifier(#[from] ValidationError),

    /// The summary bytes were not valid JSON for the expected shape
    /// (including unknown fields, which are rejected rather than ignored).
    #[error("summary is not structurally valid: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_regression_message() {
        let err = ProtocolError::SequenceRegression {
            delivered: SequenceNumber(3),
            trunk_tip: SequenceNumber(7),
        };
        let msg = format!("{err}");
        assert!(msg.contains('3'));
        assert!(msg.contains('7'));
        assert!(msg.contains("non-decreasing"));
    }

    #[test]
    fn reference_evicted_message() {
        let err = ProtocolError::ReferenceEvicted {
            reference: SequenceNumber(1),
            oldest_retained: SequenceNumber(5),
        };
        let msg = format!("{err}");
        assert!(msg.contains("precedes retained history"));
        assert!(msg.contains("desynchronized"));
    }

    #[test]
    fn local_out_of_order_message() {
        let err = ProtocolError::LocalCommitOutOfOrder {
            delivered: RevisionId::new("local:5").unwrap(),
            expected: "local:3".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("local:5"));
        assert!(msg.contains("local:3"));
        assert!(msg.contains("FIFO"));
    }

    #[test]
    fn unknown_base_message() {
        let err = SummaryError::UnknownBase {
            session: SessionId::new("peer-1").unwrap(),
            base: RevisionId::new("ghost").unwrap(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("peer-1"));
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn duplicate_revision_message() {
        let err = SummaryError::DuplicateRevision {
            revision: RevisionId::new("twice").unwrap(),
        };
        assert!(format!("{err}").contains("twice"));
    }

    #[test]
    fn unordered_trunk_message() {
        let err = SummaryError::UnorderedTrunk {
            previous: SequenceNumber(4),
            following: SequenceNumber(2),
        };
        let msg = format!("{err}");
        assert!(msg.contains('4'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn summary_error_from_validation_error() {
        let bad = RevisionId::new("").unwrap_err();
        let err: SummaryError = bad.into();
        assert!(matches!(err, SummaryError::Identifier(_)));
    }
}
