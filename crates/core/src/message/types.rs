#![warn(missing_docs)]
//! This module defines the messages exchanged by ring nodes.
//! Requests and their replies come in pairs, such as `GetStat`/`Stat` or
//! `GetEntRequest`/`GetEntReply`; `*Event` messages are one-way notifications.
//! The sender and the addressed key travel in [super::MessagePayload], not in the messages.

use serde::Deserialize;
use serde::Serialize;

use crate::ddll::Mode;
use crate::finger::FTEntry;
use crate::ring::Link;
use crate::ring::LinkSeq;
use crate::ring::RingKey;

/// Purpose of a [SetR].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SetRType {
    /// Insertion or deletion.
    Normal,
    /// Repair where the receiver's right link changes to the sender.
    FixBoth,
    /// Repair where the receiver already points at the sender.
    FixLeftOnly,
    /// An inserting node that gave up asks its left to link past it again.
    Withdraw,
}

/// Ask the left neighbor to replace its right link `cur_right` with `new_right`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetR {
    /// Request number echoed in the reply.
    pub req_no: u64,
    /// The right link the receiver should adopt.
    pub new_right: Link,
    /// The right link the receiver must currently hold.
    pub cur_right: Link,
    /// Sequence of the new right link.
    pub new_right_seq: LinkSeq,
    /// Insert/delete or repair.
    pub kind: SetRType,
}

/// Positive reply to [SetR].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetRAck {
    /// Request number of the acknowledged [SetR].
    pub req_no: u64,
    /// Sequence of the right link the receiver replaced.
    pub prior_right_seq: LinkSeq,
    /// Left-side neighbors for the requester.
    pub neighbors: Vec<Link>,
}

/// Negative reply to [SetR].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetRNak {
    /// Request number of the rejected [SetR].
    pub req_no: u64,
    /// The receiver's actual right link, if it is in the ring.
    pub current_right: Option<Link>,
}

/// Tell a node about its new left neighbor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetL {
    /// The new left link.
    pub new_left: Link,
    /// Sequence of the new left link.
    pub seq: LinkSeq,
    /// The node waiting for an [UnrefL] about this change.
    pub prev_left: Link,
    /// Left-side neighbors for the receiver.
    pub neighbors: Vec<Link>,
}

/// Release a reference held by the receiver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnrefL {
    /// The releasing node.
    pub sender: Link,
}

/// Refreshed left-side neighbors sent down the ring.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropagateNeighbors {
    /// Left-side neighbors for the receiver.
    pub neighbors: Vec<Link>,
}

/// Ask a node for its [Stat].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetStat {
    /// Request number for logging.
    pub req_no: u64,
}

/// Snapshot of a node's ring state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Stat {
    /// Protocol mode.
    pub mode: Mode,
    /// The node itself.
    pub me: Link,
    /// Left link.
    pub left: Option<Link>,
    /// Right link.
    pub right: Option<Link>,
    /// Sequence of the right link.
    pub right_seq: LinkSeq,
}

/// Heartbeat covering every monitored key at one endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetStatMulti {
    /// Keys hosted at the receiving endpoint.
    pub keys: Vec<RingKey>,
}

/// Reply to [GetStatMulti], aligned with its keys. `None` marks an unknown key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetStatMulti {
    /// One entry per requested key.
    pub stats: Vec<Option<Stat>>,
}

/// Locate the insertion point of `search_key`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FindNearest {
    /// Request number for logging.
    pub req_no: u64,
    /// The key to insert.
    pub search_key: RingKey,
    /// Key of the previous hop, if any.
    pub prev_key: Option<RingKey>,
}

/// The insertion point was found.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetFindResult {
    /// Node left of the insertion point.
    pub left: Link,
    /// Node right of the insertion point.
    pub right: Link,
}

/// Continue the search at `next`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetFindNext {
    /// The next node to ask.
    pub next: Link,
    /// Key of the replying node.
    pub prev_key: RingKey,
}

/// Ask for both finger tables of the receiver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetFTAllRequest {}

/// Reply to [GetFTAllRequest]. Slot `i` holds index `i`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetFTAllReply {
    /// Forward table.
    pub forward: Vec<Option<FTEntry>>,
    /// Backward table, empty when not maintained.
    pub backward: Vec<Option<FTEntry>>,
}

/// Ask for entries at distances `t * K^x`, `t` in `[0, 2^y]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetEntRequest {
    /// Read the backward table instead of the forward one.
    pub is_backward: bool,
    /// Octave of the requested distances.
    pub x: u32,
    /// Sub-level; `2^y` is the largest multiplier.
    pub y: u32,
    /// The branching factor `K`.
    pub branching_factor: u64,
    /// Requester's reverse-direction entries at `t * K^x`, `t` in `[0, 2^y]` (Passive Update 1).
    pub passive1: Vec<Option<FTEntry>>,
    /// Requester's reverse-direction entry one level further out, first cycle only (Passive Update 2).
    pub passive2: Option<FTEntry>,
}

/// Reply to [GetEntRequest]; `entries[t]` is the entry at distance `t * K^x`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetEntReply {
    /// Requested entries; index 0 describes the receiver itself.
    pub entries: Vec<Option<FTEntry>>,
    /// Number of passive entries the receiver installed.
    pub pushed_message_count: u32,
}

/// Refresh every slot pointing at `entry.primary`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FTEntUpdateEvent {
    /// The fresh entry.
    pub entry: FTEntry,
}

/// A node left or failed; `replacements` may take over its slots.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FTEntRemoveEvent {
    /// The removed node.
    pub removed: Link,
    /// Candidates to replace it.
    pub replacements: Vec<Link>,
}

/// The sender started pointing at the receiver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddReversePointerEvent {}

/// The sender no longer points at the receiver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoveReversePointerEvent {}

/// Route a lookup one hop further.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupRequest {
    /// Identifier chosen by the origin.
    pub query_id: u64,
    /// The node waiting for [LookupDone].
    pub origin: Link,
    /// The looked-up key.
    pub key: RingKey,
    /// Hops taken so far, including this one.
    pub hops: u32,
    /// The sender's pointer to the receiver is stale; reply with an [FTEntUpdateEvent].
    pub fill: bool,
}

/// Immediate acknowledgement of [LookupRequest].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupAck {}

/// A lookup resolved.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupDone {
    /// Identifier chosen by the origin.
    pub query_id: u64,
    /// The looked-up key.
    pub key: RingKey,
    /// First node clockwise whose key is at or after `key`.
    pub owner: Link,
    /// The node that resolved the lookup.
    pub resolver: Link,
    /// Hops taken.
    pub hops: u32,
}

/// A request could not be served.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Failure {
    /// Human-readable reason.
    pub reason: String,
}

/// A collection of all message types.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[non_exhaustive]
pub enum Message {
    /// Ask the left neighbor to change its right link.
    SetR(SetR),
    /// Positive reply of SetR.
    SetRAck(SetRAck),
    /// Negative reply of SetR.
    SetRNak(SetRNak),
    /// New left link for the receiver.
    SetL(SetL),
    /// Release a pending reference.
    UnrefL(UnrefL),
    /// Refreshed left-side neighbors.
    PropagateNeighbors(PropagateNeighbors),
    /// Request of Stat.
    GetStat(GetStat),
    /// Response of GetStat.
    Stat(Stat),
    /// Batched heartbeat request.
    GetStatMulti(GetStatMulti),
    /// Response of GetStatMulti.
    SetStatMulti(SetStatMulti),
    /// Request of an insertion point.
    FindNearest(FindNearest),
    /// Insertion point found.
    SetFindResult(SetFindResult),
    /// Insertion point search continues elsewhere.
    SetFindNext(SetFindNext),
    /// Request of whole finger tables.
    GetFTAllRequest(GetFTAllRequest),
    /// Response of GetFTAllRequest.
    GetFTAllReply(GetFTAllReply),
    /// Request of finger entries.
    GetEntRequest(GetEntRequest),
    /// Response of GetEntRequest.
    GetEntReply(GetEntReply),
    /// Fresh entry of the sender.
    FTEntUpdateEvent(FTEntUpdateEvent),
    /// A node is gone.
    FTEntRemoveEvent(FTEntRemoveEvent),
    /// Register a reverse pointer.
    AddReversePointerEvent(AddReversePointerEvent),
    /// Revoke a reverse pointer.
    RemoveReversePointerEvent(RemoveReversePointerEvent),
    /// Lookup hop.
    LookupRequest(LookupRequest),
    /// Acknowledgement of a lookup hop.
    LookupAck(LookupAck),
    /// Lookup result.
    LookupDone(LookupDone),
    /// A request could not be served.
    Failure(Failure),
}

impl Message {
    /// Shorthand of a [Failure] reply.
    pub fn failure(reason: impl Into<String>) -> Self {
        Message::Failure(Failure {
            reason: reason.into(),
        })
    }
}
