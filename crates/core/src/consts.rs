//! Constant variables.
//!
//! Defaults of [crate::config::NodeConfig]. Every duration is in milliseconds.

/// Request number reserved for `SetR`s sent by link repair.
pub const FIX_REQUEST_NO: u64 = 0;

/// Wait for a `SetRAck`/`SetRNak` before giving up an insertion or deletion step.
pub const DEFAULT_SET_R_TIMEOUT_MS: u64 = 3000;
/// Wait for a `Stat` reply.
pub const DEFAULT_GET_STAT_TIMEOUT_MS: u64 = 2000;
/// Wait for a `FindNearest` reply.
pub const DEFAULT_FIND_NEAREST_TIMEOUT_MS: u64 = 2000;
/// A node in GRACE is forced out after this long.
pub const DEFAULT_GRACE_TIMEOUT_MS: u64 = 3000;
/// Heartbeat period towards the left neighbor.
pub const DEFAULT_PING_PERIOD_MS: u64 = 5000;
/// Minimum spacing of two repairs on one node.
pub const DEFAULT_MIN_FIX_INTERVAL_MS: u64 = 500;
/// Base of the randomized retry backoff.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
pub const DEFAULT_INSERT_MAX_RETRY: usize = 10;
pub const DEFAULT_DELETE_MAX_RETRY: usize = 5;
pub const DEFAULT_FIX_MAX_RETRY: usize = 8;
pub const DEFAULT_FIND_MAX_HOPS: usize = 64;
/// Left-side backups kept per node.
pub const DEFAULT_NEIGHBOR_SET_SIZE: usize = 4;

/// `B` in `K = 2^B`.
pub const DEFAULT_BRANCHING_BITS: u32 = 2;
pub const MAX_BRANCHING_BITS: u32 = 8;
/// Highest level `p` (distance `2^p`) an update pass visits.
pub const DEFAULT_MAX_LEVEL: u32 = 48;
pub const DEFAULT_UPDATE_DELAY_MS: u64 = 1000;
pub const DEFAULT_UPDATE_PERIOD_MS: u64 = 10_000;
/// Pause between two levels of one pass; zero proceeds immediately.
pub const DEFAULT_UPDATE_LEVEL_INTERVAL_MS: u64 = 0;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_LOOKUP_HOP_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOOKUP_MAX_RETRY: usize = 8;
/// Entries older than this ask the next hop for a refreshed pointer.
pub const DEFAULT_FILL_THRESHOLD_MS: u64 = 30_000;
/// Backup links carried by a finger-table entry.
pub const DEFAULT_ENTRY_BACKUPS: usize = 2;
