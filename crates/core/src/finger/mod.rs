//! Suzaku finger tables.
//!
//! Each node keeps a forward table (clockwise pointers) and optionally a backward
//! table (counter-clockwise pointers). See [table] for the index encoding.

mod entry;
pub mod table;
mod tables;

use serde::Deserialize;
use serde::Serialize;

pub use entry::FTEntry;
pub use table::distance_to_index;
pub use table::index_to_distance;
pub use table::FingerTable;
pub use tables::FingerTables;

/// Which table an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Direction {
    /// Clockwise.
    Forward,
    /// Counter-clockwise.
    Backward,
}

impl Direction {
    /// The other direction.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    /// Whether this is [Direction::Backward].
    pub fn is_backward(&self) -> bool {
        matches!(self, Direction::Backward)
    }
}
