//! Change notifications for branches and the trunk.
//!
//! Consumers (the tree/view layer) observe the engine through explicit,
//! poll-based event queues rather than callback registries: an [`EventSink`]
//! handle is passed into a branch or manager at construction, and the
//! consumer keeps a clone to drain. Single-threaded by design — the engine
//! processes one edit or one sequenced change at a time.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::types::{RevisionId, SequenceNumber, SessionId};

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// The structured delta carried by an `AfterChange` notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeDelta<C> {
    /// One new commit was appended on top of the previous head.
    Append {
        /// Revision of the new commit.
        revision: RevisionId,
        /// The change it carries.
        change: C,
    },
    /// The head was replaced wholesale (a rebase or an abort). `net` maps
    /// the previous head state to the new head state.
    Replace {
        /// Revision of the new head commit.
        revision: RevisionId,
        /// Composed change from the old head state to the new one.
        net: C,
    },
}

// ---------------------------------------------------------------------------
// BranchEvent
// ---------------------------------------------------------------------------

/// Events emitted by a single branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchEvent<C> {
    /// The branch head changed; the delta describes how.
    AfterChange(ChangeDelta<C>),
    /// Commits were removed from the branch's retained ancestry.
    AncestryTrimmed {
        /// Revisions no longer reachable through this branch.
        revisions: Vec<RevisionId>,
    },
    /// A transaction opened on this branch.
    TransactionStarted,
    /// The outermost transaction frame is about to commit.
    TransactionCommitting,
    /// A transaction frame is about to roll back.
    TransactionAborting,
}

// ---------------------------------------------------------------------------
// TrunkEvent
// ---------------------------------------------------------------------------

/// Events emitted by the edit manager as the trunk advances or shrinks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrunkEvent<C> {
    /// A sequenced commit was accepted onto the trunk.
    Appended {
        /// Revision of the accepted commit.
        revision: RevisionId,
        /// Session that authored it.
        session: SessionId,
        /// Position assigned by the ordering authority.
        sequence_number: SequenceNumber,
        /// The (possibly rebased) change as it landed on the trunk.
        change: C,
    },
    /// Trunk history was evicted.
    AncestryTrimmed {
        /// Revisions of the evicted trunk commits, oldest first.
        revisions: Vec<RevisionId>,
    },
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// A clonable handle over a single-threaded event queue.
///
/// The producer side (branch or manager) and the consumer side share the
/// same queue; [`EventSink::drain`] returns buffered events in emission
/// order.
#[derive(Debug)]
pub struct EventSink<T> {
    queue: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<T> Default for EventSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventSink<T> {
    /// Create a new, empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Append an event to the queue.
    pub fn emit(&self, event: T) {
        self.queue.borrow_mut().push_back(event);
    }

    /// Remove and return all buffered events, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Returns `true` if no events are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_in_emission_order() {
        let sink = EventSink::new();
        sink.emit(1);
        sink.emit(2);
        sink.emit(3);
        assert_eq!(sink.drain(), vec![1, 2, 3]);
        assert!(sink.is_empty());
    }

    #[test]
    fn clones_share_the_queue() {
        let producer = EventSink::new();
        let consumer = producer.clone();
        producer.emit("a");
        assert_eq!(consumer.len(), 1);
        assert_eq!(consumer.drain(), vec!["a"]);
        assert!(producer.is_empty());
    }

    #[test]
    fn drain_on_empty_is_empty() {
        let sink: EventSink<u8> = EventSink::new();
        assert!(sink.drain().is_empty());
    }
}
