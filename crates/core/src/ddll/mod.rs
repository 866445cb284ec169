//! Distributed doubly-linked list: the membership protocol of the ring.
//!
//! A node joins by asking its future left neighbor to redirect its right link
//! (`SetR`), and the old right neighbor learns its new left link through `SetL`.
//! Deletion runs the same exchange in reverse. `UnrefL` releases the reference a
//! node keeps while a `SetL` sent on its behalf is in flight, so a deleted node
//! stays reachable until nobody can route to it anymore.
//!
//! [DdllNode] implements the state transitions; the async drivers that wait for
//! replies, retry and repair live in [crate::node].

mod node;
mod types;

pub use node::DdllNode;
pub use node::DdllState;
pub use node::FixPlan;
pub use node::PendingRequest;
pub use types::DdllAction;
pub use types::FixState;
pub use types::InsertOutcome;
pub use types::Mode;
pub use types::WaitOutcome;

use crate::error::Result;
use crate::ring::Link;

/// Read-only view of a ring position, used by the routing layer.
pub trait RingView: Send + Sync {
    /// The link of this node.
    fn me(&self) -> &Link;
    /// Current mode.
    fn mode(&self) -> Result<Mode>;
    /// Current left link.
    fn left(&self) -> Result<Option<Link>>;
    /// Current right link.
    fn right(&self) -> Result<Option<Link>>;
    /// Left-side neighbors, nearest first.
    fn left_neighbors(&self) -> Result<Vec<Link>>;
}

impl RingView for DdllNode {
    fn me(&self) -> &Link {
        DdllNode::me(self)
    }

    fn mode(&self) -> Result<Mode> {
        DdllNode::mode(self)
    }

    fn left(&self) -> Result<Option<Link>> {
        DdllNode::left(self)
    }

    fn right(&self) -> Result<Option<Link>> {
        DdllNode::right(self)
    }

    fn left_neighbors(&self) -> Result<Vec<Link>> {
        self.neighbors()
    }
}
