//! A single direction of routing pointers.
//!
//! Index `-1` is the node itself and index `0` its ring neighbor. For `i >= 0`
//! indices come in octaves of `K - 1` entries: index `i` covers distance
//! `((i mod (K-1)) + 1) * K^(i div (K-1))`. With `K = 2` this is the doubling law of
//! Chord, with `K = 4` the distances run 1, 2, 3, 4, 8, 12, 16, 32, ...

use super::FTEntry;

/// Index of the node itself.
pub const SELF_INDEX: i32 = -1;
/// Index of the ring neighbor.
pub const NEIGHBOR_INDEX: i32 = 0;

/// Ring distance covered by `index`, saturating at `u64::MAX`.
pub fn index_to_distance(index: i32, k: u64) -> u64 {
    if index < 0 {
        return 0;
    }
    let per_octave = k.saturating_sub(1).max(1);
    let index = index as u64;
    let multiplier = index % per_octave + 1;
    let octave = (index / per_octave) as u32;
    k.checked_pow(octave)
        .and_then(|p| p.checked_mul(multiplier))
        .unwrap_or(u64::MAX)
}

/// The largest index whose distance does not exceed `distance`; `0` maps to `-1`.
pub fn distance_to_index(distance: u64, k: u64) -> i32 {
    if distance == 0 {
        return SELF_INDEX;
    }
    let per_octave = k.saturating_sub(1).max(1);
    let mut octave = 0u64;
    let mut base = 1u64;
    while let Some(next) = base.checked_mul(k) {
        if next > distance {
            break;
        }
        base = next;
        octave += 1;
    }
    let multiplier = (distance / base).min(per_octave);
    (octave * per_octave + multiplier - 1) as i32
}

/// Sparse table of entries for indices `0..`.
#[derive(Debug, Clone)]
pub struct FingerTable {
    branching_factor: u64,
    entries: Vec<Option<FTEntry>>,
}

impl FingerTable {
    pub fn new(branching_factor: u64) -> Self {
        Self {
            branching_factor,
            entries: vec![],
        }
    }

    pub fn branching_factor(&self) -> u64 {
        self.branching_factor
    }

    /// Number of slots, filled or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }

    pub fn get(&self, index: usize) -> Option<&FTEntry> {
        self.entries.get(index).and_then(|e| e.as_ref())
    }

    /// Store `entry` at `index`, growing the table as needed. Returns the replaced entry.
    pub fn set(&mut self, index: usize, entry: FTEntry) -> Option<FTEntry> {
        if self.entries.len() <= index {
            self.entries.resize(index + 1, None);
        }
        self.entries[index].replace(entry)
    }

    /// Clear `index` without shrinking the table.
    pub fn take(&mut self, index: usize) -> Option<FTEntry> {
        self.entries.get_mut(index).and_then(|e| e.take())
    }

    /// Truncate from `index` onward. Returns the discarded entries.
    pub fn shrink(&mut self, index: usize) -> Vec<FTEntry> {
        if index >= self.entries.len() {
            return vec![];
        }
        self.entries.drain(index..).flatten().collect()
    }

    /// Every filled slot with its index.
    pub fn stream(&self) -> impl Iterator<Item = (usize, &FTEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = (usize, &mut Option<FTEntry>)> {
        self.entries.iter_mut().enumerate()
    }

    /// All slots, `None` for the empty ones.
    pub fn to_vec(&self) -> Vec<Option<FTEntry>> {
        self.entries.clone()
    }
}
