//! Order in which one update pass visits levels and directions.

use crate::config::SuzakuConfig;
use crate::finger::Direction;

/// Produces the `(direction, level)` steps of one update pass.
/// A pass skips the remaining steps of a direction once that direction wrapped around the ring.
pub trait UpdateOrdering: Send + Sync {
    /// Steps for levels `0..max_level`.
    fn steps(&self, max_level: u32, with_backward: bool) -> Vec<(Direction, u32)>;
}

/// Alternate forward and backward at every level.
pub struct Zigzag;

/// A whole forward pass, then a whole backward pass.
pub struct Sequential;

impl UpdateOrdering for Zigzag {
    fn steps(&self, max_level: u32, with_backward: bool) -> Vec<(Direction, u32)> {
        let mut steps = vec![];
        for p in 0..max_level {
            steps.push((Direction::Forward, p));
            if with_backward {
                steps.push((Direction::Backward, p));
            }
        }
        steps
    }
}

impl UpdateOrdering for Sequential {
    fn steps(&self, max_level: u32, with_backward: bool) -> Vec<(Direction, u32)> {
        let forward = (0..max_level).map(|p| (Direction::Forward, p));
        let backward = (0..max_level)
            .filter(|_| with_backward)
            .map(|p| (Direction::Backward, p));
        forward.chain(backward).collect()
    }
}

/// The ordering selected by `zigzag_update`.
pub fn ordering_for(config: &SuzakuConfig) -> Box<dyn UpdateOrdering> {
    if config.zigzag_update {
        Box::new(Zigzag)
    } else {
        Box::new(Sequential)
    }
}
