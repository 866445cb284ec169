use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Sequence number of a right-link assignment.
///
/// Ordered by `epoch` first, then by `repair`: a new epoch always wins, and repairs
/// within an epoch win over older repairs. A node accepts a `SetL` only if the carried
/// sequence is strictly greater than the one it stores.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LinkSeq {
    epoch: u32,
    repair: u32,
}

impl LinkSeq {
    pub const ZERO: LinkSeq = LinkSeq {
        epoch: 0,
        repair: 0,
    };

    pub fn new(epoch: u32, repair: u32) -> Self {
        Self { epoch, repair }
    }

    /// Sequence of the next link assignment made through `SetR`.
    pub fn next(&self) -> Self {
        Self {
            epoch: self.epoch.wrapping_add(1),
            repair: 0,
        }
    }

    /// Sequence after a repair within the current epoch.
    pub fn next_repair(&self) -> Self {
        Self {
            epoch: self.epoch,
            repair: self.repair.wrapping_add(1),
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn repair(&self) -> u32 {
        self.repair
    }
}

impl fmt::Display for LinkSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epoch, self.repair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_beats_repair() {
        let base = LinkSeq::new(3, 0);
        assert!(base.next_repair() > base);
        assert!(base.next() > base.next_repair().next_repair());
        assert_eq!(base.next(), LinkSeq::new(4, 0));
        assert_eq!(base.next_repair().next(), LinkSeq::new(4, 0));
        assert!(LinkSeq::ZERO < LinkSeq::new(0, 1));
    }
}
