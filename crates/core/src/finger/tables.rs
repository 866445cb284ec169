#![warn(missing_docs)]
//! Forward and backward finger tables of one node, plus its reverse pointers.

use std::collections::HashSet;
use std::sync::Arc;

use super::table::distance_to_index;
use super::table::index_to_distance;
use super::Direction;
use super::FTEntry;
use super::FingerTable;
use crate::ddll::RingView;
use crate::error::Result;
use crate::ring::is_ordered_with;
use crate::ring::BiasKey;
use crate::ring::Link;
use crate::ring::RingKey;

/// Routing state of one node.
///
/// Index 0 of each table is never trusted as stored: every read compares it with
/// the live right (forward) or left (backward) link of the ring and replaces it when
/// they differ.
pub struct FingerTables {
    view: Arc<dyn RingView>,
    forward: FingerTable,
    backward: Option<FingerTable>,
    /// Nodes believed to hold an entry pointing at this node.
    reverse_pointers: HashSet<Link>,
    entry_backups: usize,
}

impl FingerTables {
    /// Create empty tables. The backward table exists only with `use_backward`.
    pub fn new(
        view: Arc<dyn RingView>,
        branching_factor: u64,
        use_backward: bool,
        entry_backups: usize,
    ) -> Self {
        Self {
            view,
            forward: FingerTable::new(branching_factor),
            backward: use_backward.then(|| FingerTable::new(branching_factor)),
            reverse_pointers: HashSet::new(),
            entry_backups,
        }
    }

    /// The link of the owning node.
    pub fn me(&self) -> &Link {
        self.view.me()
    }

    /// The branching factor `K`.
    pub fn branching_factor(&self) -> u64 {
        self.forward.branching_factor()
    }

    /// Whether the backward table is maintained.
    pub fn has_backward(&self) -> bool {
        self.backward.is_some()
    }

    /// The table of `dir`, if maintained.
    pub fn table(&self, dir: Direction) -> Option<&FingerTable> {
        match dir {
            Direction::Forward => Some(&self.forward),
            Direction::Backward => self.backward.as_ref(),
        }
    }

    fn table_mut(&mut self, dir: Direction) -> Option<&mut FingerTable> {
        match dir {
            Direction::Forward => Some(&mut self.forward),
            Direction::Backward => self.backward.as_mut(),
        }
    }

    fn live_neighbor(&self, dir: Direction) -> Result<Option<Link>> {
        match dir {
            Direction::Forward => self.view.right(),
            Direction::Backward => self.view.left(),
        }
    }

    /// The entry describing this node, as handed to nodes routing through it.
    /// Backups are the nodes a router should fall back to if this node dies:
    /// its left neighbors for forward pointers, its right for backward ones.
    pub fn self_entry(&self, dir: Direction, now: u64) -> Result<FTEntry> {
        let backups = match dir {
            Direction::Forward => {
                let mut ns = self.view.left_neighbors()?;
                ns.truncate(self.entry_backups);
                ns
            }
            Direction::Backward => self.view.right()?.into_iter().collect(),
        };
        Ok(FTEntry::new(self.me().clone(), now).with_backups(backups))
    }

    /// Entry at `index`; `-1` is this node and `0` follows the live ring link.
    pub fn get(&mut self, dir: Direction, index: i32, now: u64) -> Result<Option<FTEntry>> {
        if index < 0 {
            return self.self_entry(dir, now).map(Some);
        }
        if index == 0 {
            let live = self.live_neighbor(dir)?;
            let Some(table) = self.table_mut(dir) else {
                return Ok(None);
            };
            return Ok(match live {
                Some(live) => {
                    if table.get(0).map(|e| &e.primary) != Some(&live) {
                        table.set(0, FTEntry::new(live, now));
                    }
                    table.get(0).cloned()
                }
                None => {
                    table.take(0);
                    None
                }
            });
        }
        Ok(self
            .table(dir)
            .and_then(|t| t.get(index as usize))
            .cloned())
    }

    /// Entry exactly at ring distance `distance`, if an index covers it.
    pub fn get_at_distance(
        &mut self,
        dir: Direction,
        distance: u64,
        now: u64,
    ) -> Result<Option<FTEntry>> {
        let k = self.branching_factor();
        let index = distance_to_index(distance, k);
        if index_to_distance(index, k) != distance {
            return Ok(None);
        }
        self.get(dir, index, now)
    }

    /// Number of slots in `dir`.
    pub fn len(&self, dir: Direction) -> usize {
        self.table(dir).map(|t| t.len()).unwrap_or(0)
    }

    /// Replace the entry at `index` (>= 1) and stamp it with `now`.
    /// Returns the primary of the superseded entry when it pointed at another node.
    pub fn change(
        &mut self,
        dir: Direction,
        index: i32,
        mut entry: FTEntry,
        now: u64,
    ) -> Option<Link> {
        if index < 1 {
            return None;
        }
        entry.refreshed_at = now;
        let me = self.me().clone();
        entry.backups.retain(|b| *b != me);
        let table = self.table_mut(dir)?;
        let old = table.set(index as usize, entry.clone())?;
        (old.primary != entry.primary).then_some(old.primary)
    }

    /// Truncate `dir` from `index` onward. Returns the discarded primaries.
    pub fn shrink(&mut self, dir: Direction, index: i32) -> Vec<Link> {
        let from = index.max(1) as usize;
        match self.table_mut(dir) {
            Some(t) => t.shrink(from).into_iter().map(|e| e.primary).collect(),
            None => vec![],
        }
    }

    /// Every slot of `dir` with the live neighbor at index 0.
    pub fn all_entries(&mut self, dir: Direction, now: u64) -> Result<Vec<Option<FTEntry>>> {
        if self.table(dir).is_none() {
            return Ok(vec![]);
        }
        self.get(dir, 0, now)?;
        Ok(self.table(dir).map(|t| t.to_vec()).unwrap_or_default())
    }

    /// Every stored entry of both tables that does not point at this node.
    pub fn stream(&self) -> impl Iterator<Item = &FTEntry> {
        let me = self.me().clone();
        self.forward
            .stream()
            .chain(self.backward.iter().flat_map(|t| t.stream()))
            .map(|(_, e)| e)
            .filter(move |e| e.primary != me)
    }

    /// Whether any slot still uses `link` as its primary.
    pub fn references(&self, link: &Link) -> bool {
        self.stream().any(|e| e.primary == *link)
    }

    /// Refresh every slot whose primary is `entry.primary`. Returns how many changed.
    pub fn refresh(&mut self, entry: &FTEntry, now: u64) -> usize {
        let me = self.me().clone();
        let mut count = 0;
        for table in std::iter::once(&mut self.forward).chain(self.backward.iter_mut()) {
            for (_, slot) in table.slots_mut() {
                if let Some(e) = slot {
                    if e.primary == entry.primary {
                        e.backups = entry.backups.clone();
                        e.backups.retain(|b| *b != me);
                        e.refreshed_at = now;
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Replace every slot pointing at `removed` with the first usable replacement.
    /// A replacement equal to this node falls back to the live ring neighbor.
    /// Slots without replacement promote their first backup or become empty.
    pub fn remove_node(
        &mut self,
        removed: &Link,
        replacements: &[Link],
        now: u64,
    ) -> Result<()> {
        let me = self.me().clone();
        let right = self.view.right()?;
        let left = self.view.left()?;
        self.reverse_pointers.remove(removed);

        let mut tables: Vec<(Direction, &mut FingerTable)> =
            vec![(Direction::Forward, &mut self.forward)];
        if let Some(b) = self.backward.as_mut() {
            tables.push((Direction::Backward, b));
        }

        for (dir, table) in tables {
            let fallback = match dir {
                Direction::Forward => right.clone(),
                Direction::Backward => left.clone(),
            };
            for (index, slot) in table.slots_mut() {
                let Some(entry) = slot else {
                    continue;
                };
                entry.backups.retain(|b| b != removed);
                if entry.primary != *removed {
                    continue;
                }
                if index == 0 {
                    *slot = None;
                    continue;
                }
                let candidate = replacements
                    .iter()
                    .find(|r| *r != removed)
                    .cloned()
                    .or_else(|| entry.backups.first().cloned());
                let candidate = match candidate {
                    Some(c) if c == me => fallback.clone().filter(|f| f != removed),
                    other => other,
                };
                let backups = entry.backups.clone();
                *slot = candidate.map(|primary| FTEntry::new(primary, now).with_backups(backups));
            }
        }
        Ok(())
    }

    /// The closest node preceding or at `key` among the table primaries and ring links,
    /// skipping `exclude`. `None` when no known node lies in `(me, key]`.
    pub fn closest_preceding(
        &mut self,
        key: &RingKey,
        exclude: &HashSet<Link>,
        now: u64,
    ) -> Result<Option<FTEntry>> {
        self.get(Direction::Forward, 0, now)?;
        if self.has_backward() {
            self.get(Direction::Backward, 0, now)?;
        }
        let me = self.me().clone();
        let best = self
            .stream()
            .filter(|e| !exclude.contains(&e.primary))
            .filter(|e| is_ordered_with(&me.key, false, &e.primary.key, key, true))
            .max_by(|a, b| {
                BiasKey::new(&me.key, &a.primary.key).cmp(&BiasKey::new(&me.key, &b.primary.key))
            })
            .cloned();
        Ok(best)
    }

    /// Record that `link` points at this node.
    pub fn add_reverse_pointer(&mut self, link: Link) -> bool {
        if link == *self.me() {
            return false;
        }
        self.reverse_pointers.insert(link)
    }

    /// Forget that `link` points at this node.
    pub fn remove_reverse_pointer(&mut self, link: &Link) -> bool {
        self.reverse_pointers.remove(link)
    }

    /// Nodes believed to point at this node.
    pub fn reverse_pointers(&self) -> Vec<Link> {
        self.reverse_pointers.iter().cloned().collect()
    }

    /// Drop reverse pointers of nodes within `(me, right]`; they route to the right
    /// neighbor rather than through this node. Returns the dropped links.
    pub fn sanitize_rev_ptrs(&mut self) -> Result<Vec<Link>> {
        let Some(right) = self.view.right()? else {
            return Ok(vec![]);
        };
        let me = self.me().clone();
        if right == me {
            return Ok(vec![]);
        }
        let dropped: Vec<Link> = self
            .reverse_pointers
            .iter()
            .filter(|r| is_ordered_with(&me.key, false, &r.key, &right.key, true))
            .cloned()
            .collect();
        for r in &dropped {
            self.reverse_pointers.remove(r);
        }
        Ok(dropped)
    }
}
