//! Left-side backups of a ring node.
//!
//! The set is handed down the ring: a node tells its right neighbor which nodes sit on
//! the left of that neighbor ([NeighborSet::compute_ns_for_right]), so every node knows
//! a few nodes beyond its immediate left. Link repair walks this set to find a live left
//! neighbor when the current one fails.

use crate::ring::Link;
use crate::ring::SortRing;

/// A bounded sequence of left-side links, nearest left neighbor first.
#[derive(Debug, Clone)]
pub struct NeighborSet {
    me: Link,
    max: usize,
    neighbors: Vec<Link>,
    /// The set last propagated to a right neighbor.
    sent: Option<(Link, Vec<Link>)>,
}

impl NeighborSet {
    pub fn new(me: Link, max: usize) -> Self {
        Self {
            me,
            max,
            neighbors: vec![],
            sent: None,
        }
    }

    /// Insert `link` at its ring position. Returns whether it is kept within capacity.
    pub fn add(&mut self, link: Link) -> bool {
        if link == self.me || self.neighbors.contains(&link) {
            return false;
        }
        self.neighbors.push(link.clone());
        self.normalize();
        self.neighbors.contains(&link)
    }

    pub fn remove(&mut self, link: &Link) -> bool {
        let len = self.neighbors.len();
        self.neighbors.retain(|l| l != link);
        len != self.neighbors.len()
    }

    /// Replace the whole set, as received from the left neighbor.
    pub fn set(&mut self, links: Vec<Link>) {
        self.neighbors = links;
        self.normalize();
    }

    pub fn neighbors(&self) -> &[Link] {
        &self.neighbors
    }

    pub fn clear(&mut self) {
        self.neighbors.clear();
        self.sent = None;
    }

    /// The set `target` should hold when this node becomes its left neighbor.
    pub fn compute_ns_for_right(&self, target: &Link) -> Vec<Link> {
        let mut ns = vec![self.me.clone()];
        ns.extend(self.neighbors.iter().cloned());
        self.fit(ns, target)
    }

    /// The set `target` should hold when `via`, a node on our right, becomes its left neighbor.
    pub fn compute_ns_for_right_via(&self, target: &Link, via: &Link) -> Vec<Link> {
        let mut ns = vec![via.clone(), self.me.clone()];
        ns.extend(self.neighbors.iter().cloned());
        self.fit(ns, target)
    }

    /// Record `set` as propagated to `target`. Returns `false` if exactly this was sent before.
    pub fn mark_sent(&mut self, target: &Link, set: &[Link]) -> bool {
        if let Some((t, s)) = &self.sent {
            if t == target && s.as_slice() == set {
                return false;
            }
        }
        self.sent = Some((target.clone(), set.to_vec()));
        true
    }

    fn fit(&self, mut ns: Vec<Link>, target: &Link) -> Vec<Link> {
        ns.retain(|l| l != target);
        ns.sort_counter_clockwise(&target.key);
        ns.dedup();
        ns.truncate(self.max);
        ns
    }

    fn normalize(&mut self) {
        let me = self.me.clone();
        self.neighbors.retain(|l| *l != me);
        self.neighbors.sort_counter_clockwise(&me.key);
        self.neighbors.dedup();
        self.neighbors.truncate(self.max);
    }
}
