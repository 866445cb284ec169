//! Suzaku: a churn-resilient ring overlay preserving key order.
//! --------------
//! - [DDLL](crate::ddll) keeps the doubly-linked ring consistent under concurrent joins, leaves and crashes.
//! - [Suzaku](crate::suzaku) maintains the finger tables over the ring and picks next hops for lookups.
//! - [RingNode](crate::node::RingNode) drives one ring position: insertion, deletion, repair and lookup.
//! - [NodeManager](crate::manager::NodeManager) hosts ring nodes on one transport endpoint.
//!
//! # Joining
//!
//! 1. The joining node sends `FindNearest` to an introducer and follows `SetFindNext`
//!    replies until some node answers `SetFindResult(left, right)`.
//! 2. It sends `SetR` to `left`. If `left` still points at `right`, `left` switches its
//!    right link, acknowledges with `SetRAck` and tells `right` about its new left
//!    neighbor with `SetL`. Otherwise `left` answers `SetRNak` and the joiner retries.
//! 3. Once in the ring, the node copies its predecessor's finger tables and starts
//!    periodic update passes.
//!
//! # Lookup
//!
//! Lookups are routed greedily over the finger tables. Each hop acknowledges with
//! `LookupAck` and the resolving node reports `LookupDone` straight to the origin.
//! A hop that does not acknowledge is suspected, removed from the tables and the
//! lookup continues through the entry's backups.
//!
//! # Failure detection
//!
//! Every node registers its left neighbor at the [NodeMonitor](crate::monitor::NodeMonitor)
//! of its endpoint. The monitor probes each remote endpoint with one batched
//! `GetStatMulti` per period and triggers link repair when the left neighbor dies or
//! stops pointing back.

pub mod config;
pub mod consts;
pub mod ddll;
pub mod error;
pub mod finger;
pub mod inspect;
pub mod manager;
pub mod message;
pub mod monitor;
pub mod node;
pub mod ring;
pub mod suzaku;
#[cfg(test)]
mod tests;

pub use crate::config::NodeConfig;
pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::manager::NodeManager;
pub use crate::node::LookupResult;
pub use crate::node::RingNode;
pub use crate::ring::Link;
pub use crate::ring::RingKey;
