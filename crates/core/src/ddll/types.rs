//! Modes, actions and outcomes of the DDLL protocol.
#![warn(missing_docs)]

use serde::Deserialize;
use serde::Serialize;

use crate::message::Message;
use crate::ring::Link;

/// Protocol mode of a ring position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Mode {
    /// Not on the ring.
    Out,
    /// Waiting for the answer to an insertion `SetR`.
    Ins,
    /// Insertion was rejected; a retry is pending.
    InsWait,
    /// On the ring.
    In,
    /// Waiting for the answer to a deletion `SetR`.
    Del,
    /// Deletion was rejected or interrupted; a retry is pending.
    DelWait,
    /// Deleted, waiting for pending references to be released.
    Grace,
}

impl Mode {
    /// Whether a node in this mode accepts `SetR` and counts as a ring member.
    pub fn is_member(&self) -> bool {
        matches!(self, Mode::In | Mode::DelWait)
    }

    /// Whether the node occupies a ring position, including the transient modes.
    pub fn is_linked(&self) -> bool {
        matches!(self, Mode::In | Mode::Del | Mode::DelWait)
    }
}

/// State of the link repair sub-machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FixState {
    /// Idle.
    Waiting,
    /// Searching for a live left neighbor.
    Checking,
    /// Repair `SetR` sent; the left neighbor's right link changes too.
    FixingBoth,
    /// Repair `SetR` sent; only the local left link changes.
    FixingLeftOnly,
}

/// What woke an insert, delete or repair waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The `SetR` was accepted.
    Ack,
    /// The `SetR` was rejected; carries the receiver's actual right link.
    Nak(Option<Link>),
    /// The ring shrank to this node alone while it was deleting.
    Collapsed,
    /// Deleted; references are still pending.
    Grace,
    /// The left link changed under a deletion; retry with the new left.
    Retry,
}

/// Result of an insertion attempt at one insertion point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The node is on the ring.
    Inserted,
    /// The attempt failed; a better insertion point may be known.
    Failed(Option<(Link, Link)>),
}

/// Follow-up work produced while the node state was locked.
/// The node runs these after the lock is released.
#[derive(Debug, Clone)]
pub enum DdllAction {
    /// Nothing to do.
    None,
    /// Send a one-way message to a node.
    Send(Link, Message),
    /// The left link changed.
    LeftChanged {
        /// The previous left link.
        old: Option<Link>,
        /// The current left link.
        new: Link,
    },
    /// The right link changed.
    RightChanged {
        /// The previous right link.
        old: Option<Link>,
        /// The current right link.
        new: Link,
    },
    /// The node left the ring.
    Departed,
    /// The left link looks broken; run the repair sub-machine.
    Fix,
    /// Several actions.
    MultiActions(Vec<DdllAction>),
}

impl DdllAction {
    /// Returns `true` if the action is a [DdllAction::None] value.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Vec<DdllAction>> for DdllAction {
    fn from(acts: Vec<DdllAction>) -> Self {
        let mut acts: Vec<DdllAction> = acts.into_iter().filter(|a| !a.is_none()).collect();
        match acts.len() {
            0 => Self::None,
            1 => acts.remove(0),
            _ => Self::MultiActions(acts),
        }
    }
}
