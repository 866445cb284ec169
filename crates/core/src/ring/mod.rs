//! Identity and ordering types of the ring: keys, links, link sequences and the
//! left-side neighbor set.

mod key;
mod link;
mod neighbor;
mod seq;

pub use key::is_ordered;
pub use key::is_ordered_with;
pub use key::BiasKey;
pub use key::KeyValue;
pub use key::RingKey;
pub use key::SortRing;
pub use key::UniqueId;
pub use link::Link;
pub use neighbor::NeighborSet;
pub use seq::LinkSeq;
