#![warn(missing_docs)]
//! The per-node DDLL state machine.
//!
//! [DdllNode] keeps one ring position behind a single lock. Every handler takes the
//! lock, applies the protocol transition, and returns a [DdllAction] describing the
//! messages to send. The caller performs those actions after the lock is released,
//! so no lock is ever held across a network call.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use suzaku_transport::Notifier;
use tokio::sync::oneshot;

use super::types::DdllAction;
use super::types::FixState;
use super::types::Mode;
use super::types::WaitOutcome;
use crate::consts::FIX_REQUEST_NO;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::message::PropagateNeighbors;
use crate::message::SetL;
use crate::message::SetR;
use crate::message::SetRAck;
use crate::message::SetRNak;
use crate::message::SetRType;
use crate::message::Stat;
use crate::message::UnrefL;
use crate::ring::Link;
use crate::ring::LinkSeq;
use crate::ring::NeighborSet;

/// Mutable protocol state of a ring position.
pub struct DdllState {
    pub(crate) mode: Mode,
    pub(crate) left: Option<Link>,
    pub(crate) left_seq: LinkSeq,
    pub(crate) right: Option<Link>,
    pub(crate) right_seq: LinkSeq,
    /// `SetL`s sent on behalf of this node whose `UnrefL` has not arrived.
    pub(crate) ref_count: u32,
    /// Last issued request number.
    pub(crate) req_no: u64,
    pub(crate) neighbors: NeighborSet,
    pub(crate) fix_state: FixState,
    pub(crate) last_fix_ms: Option<u64>,
    waiter: Option<(u64, oneshot::Sender<WaitOutcome>)>,
    fix_waiter: Option<oneshot::Sender<WaitOutcome>>,
    grace: Option<Notifier>,
    fix_done: Option<Notifier>,
}

/// Pending insertion or deletion step.
pub struct PendingRequest {
    /// Request number carried by the `SetR`.
    pub req_no: u64,
    /// Resolved by the matching reply.
    pub outcome: oneshot::Receiver<WaitOutcome>,
    /// The `SetR` to send.
    pub action: DdllAction,
}

/// What the repair sub-machine should do with a live left candidate.
pub enum FixPlan {
    /// Links are already consistent.
    Consistent,
    /// Send the repair `SetR` in `action` and wait on `outcome`.
    Repair {
        /// Resolved by the reply with [FIX_REQUEST_NO].
        outcome: oneshot::Receiver<WaitOutcome>,
        /// The `SetR` plus the left link change.
        action: DdllAction,
    },
}

/// One ring position.
pub struct DdllNode {
    me: Link,
    state: RwLock<DdllState>,
}

impl DdllNode {
    /// Create a node in mode [Mode::Out].
    pub fn new(me: Link, neighbor_set_size: usize) -> Self {
        let neighbors = NeighborSet::new(me.clone(), neighbor_set_size);
        Self {
            me,
            state: RwLock::new(DdllState {
                mode: Mode::Out,
                left: None,
                left_seq: LinkSeq::ZERO,
                right: None,
                right_seq: LinkSeq::ZERO,
                ref_count: 0,
                req_no: FIX_REQUEST_NO,
                neighbors,
                fix_state: FixState::Waiting,
                last_fix_ms: None,
                waiter: None,
                fix_waiter: None,
                grace: None,
                fix_done: None,
            }),
        }
    }

    /// The link of this node.
    pub fn me(&self) -> &Link {
        &self.me
    }

    /// Lock and return the write guard of the state.
    pub fn lock_state(&self) -> Result<RwLockWriteGuard<DdllState>> {
        self.state.write().map_err(|_| Error::NodeSyncLockError)
    }

    /// Lock and return the read guard of the state.
    pub fn read_state(&self) -> Result<RwLockReadGuard<DdllState>> {
        self.state.read().map_err(|_| Error::NodeSyncLockError)
    }

    /// Current mode.
    pub fn mode(&self) -> Result<Mode> {
        Ok(self.read_state()?.mode)
    }

    /// Current left link.
    pub fn left(&self) -> Result<Option<Link>> {
        Ok(self.read_state()?.left.clone())
    }

    /// Current right link.
    pub fn right(&self) -> Result<Option<Link>> {
        Ok(self.read_state()?.right.clone())
    }

    /// Left-side neighbors, nearest first.
    pub fn neighbors(&self) -> Result<Vec<Link>> {
        Ok(self.read_state()?.neighbors.neighbors().to_vec())
    }

    /// A consistent snapshot for remote requesters.
    pub fn stat(&self) -> Result<Stat> {
        let s = self.read_state()?;
        Ok(Stat {
            mode: s.mode,
            me: self.me.clone(),
            left: s.left.clone(),
            right: s.right.clone(),
            right_seq: s.right_seq,
        })
    }

    fn next_req_no(s: &mut DdllState) -> u64 {
        s.req_no = s.req_no.wrapping_add(1);
        if s.req_no == FIX_REQUEST_NO {
            s.req_no = s.req_no.wrapping_add(1);
        }
        s.req_no
    }

    fn resolve(s: &mut DdllState, req_no: u64, outcome: WaitOutcome) -> bool {
        match s.waiter.take() {
            Some((no, tx)) if no == req_no => {
                let _ = tx.send(outcome);
                true
            }
            other => {
                s.waiter = other;
                false
            }
        }
    }

    fn resolve_any(s: &mut DdllState, outcome: WaitOutcome) {
        if let Some((_, tx)) = s.waiter.take() {
            let _ = tx.send(outcome);
        }
    }

    fn clear_links(s: &mut DdllState) {
        s.left = None;
        s.right = None;
        s.ref_count = 0;
        s.neighbors.clear();
    }

    fn go_out(&self, s: &mut DdllState) -> DdllAction {
        s.mode = Mode::Out;
        Self::clear_links(s);
        if let Some(grace) = s.grace.take() {
            grace.wake();
        }
        DdllAction::Departed
    }

    /// Enter GRACE, or leave at once when no reference is pending.
    fn enter_grace(&self, s: &mut DdllState) -> (DdllAction, WaitOutcome) {
        if s.ref_count == 0 {
            let unref = self.unref_left(s);
            let departed = self.go_out(s);
            (vec![unref, departed].into(), WaitOutcome::Ack)
        } else {
            s.mode = Mode::Grace;
            s.grace = Some(Notifier::default());
            (DdllAction::None, WaitOutcome::Grace)
        }
    }

    fn unref_left(&self, s: &DdllState) -> DdllAction {
        match &s.left {
            Some(left) if *left != self.me => DdllAction::Send(
                left.clone(),
                Message::UnrefL(UnrefL {
                    sender: self.me.clone(),
                }),
            ),
            _ => DdllAction::None,
        }
    }

    /// Push the neighbor set the right node should hold, if it differs from the last push.
    fn propagate(&self, s: &mut DdllState) -> DdllAction {
        let Some(right) = s.right.clone() else {
            return DdllAction::None;
        };
        if right == self.me {
            return DdllAction::None;
        }
        let ns = s.neighbors.compute_ns_for_right(&right);
        if !s.neighbors.mark_sent(&right, &ns) {
            return DdllAction::None;
        }
        DdllAction::Send(
            right,
            Message::PropagateNeighbors(PropagateNeighbors { neighbors: ns }),
        )
    }

    /// Form a ring containing only this node.
    pub fn insert_as_initial(&self) -> Result<()> {
        let mut s = self.lock_state()?;
        if s.mode != Mode::Out {
            return Err(Error::IllegalState {
                expected: Mode::Out,
                actual: s.mode,
            });
        }
        s.mode = Mode::In;
        s.left = Some(self.me.clone());
        s.right = Some(self.me.clone());
        s.left_seq = LinkSeq::ZERO;
        s.right_seq = LinkSeq::ZERO;
        s.ref_count = 0;
        tracing::info!("{} forms a new ring", self.me);
        Ok(())
    }

    /// Start an insertion between `left` and `right`.
    pub fn begin_insert(&self, left: &Link, right: &Link) -> Result<PendingRequest> {
        let mut s = self.lock_state()?;
        if !matches!(s.mode, Mode::Out | Mode::InsWait) {
            return Err(Error::IllegalState {
                expected: Mode::Out,
                actual: s.mode,
            });
        }
        let req_no = Self::next_req_no(&mut s);
        let (tx, rx) = oneshot::channel();
        s.mode = Mode::Ins;
        s.left = Some(left.clone());
        s.right = Some(right.clone());
        s.waiter = Some((req_no, tx));

        tracing::debug!("{} inserts between {} and {}", self.me, left, right);
        let action = DdllAction::Send(
            left.clone(),
            Message::SetR(SetR {
                req_no,
                new_right: self.me.clone(),
                cur_right: right.clone(),
                new_right_seq: s.left_seq,
                kind: SetRType::Normal,
            }),
        );
        Ok(PendingRequest {
            req_no,
            outcome: rx,
            action,
        })
    }

    /// Give up the insertion `req_no`. With `remove_me` the target left may have accepted
    /// the request, so it is asked to drop this node again.
    pub fn abort_insert(&self, req_no: u64, remove_me: bool) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        if !matches!(s.mode, Mode::Ins | Mode::InsWait) || s.req_no != req_no {
            return Ok(DdllAction::None);
        }
        s.waiter = None;
        s.mode = Mode::Out;
        s.left_seq = s.left_seq.next_repair();

        let mut action = DdllAction::None;
        if remove_me {
            if let (Some(left), Some(right)) = (s.left.clone(), s.right.clone()) {
                let no = Self::next_req_no(&mut s);
                action = DdllAction::Send(
                    left,
                    Message::SetR(SetR {
                        req_no: no,
                        new_right: right,
                        cur_right: self.me.clone(),
                        new_right_seq: s.left_seq,
                        kind: SetRType::Withdraw,
                    }),
                );
            }
        }
        Self::clear_links(&mut s);
        Ok(action)
    }

    /// Start a deletion. `None` means the node was alone and is already out.
    pub fn begin_delete(&self) -> Result<Option<PendingRequest>> {
        let mut s = self.lock_state()?;
        if !matches!(s.mode, Mode::In | Mode::DelWait) {
            return Err(Error::IllegalState {
                expected: Mode::In,
                actual: s.mode,
            });
        }
        let (Some(left), Some(right)) = (s.left.clone(), s.right.clone()) else {
            return Err(Error::IllegalState {
                expected: Mode::In,
                actual: s.mode,
            });
        };
        if left == self.me && right == self.me {
            self.go_out(&mut s);
            tracing::info!("{} was alone and left the ring", self.me);
            return Ok(None);
        }

        let req_no = Self::next_req_no(&mut s);
        let (tx, rx) = oneshot::channel();
        s.mode = Mode::Del;
        s.waiter = Some((req_no, tx));
        let action = DdllAction::Send(
            left,
            Message::SetR(SetR {
                req_no,
                new_right: right,
                cur_right: self.me.clone(),
                new_right_seq: s.right_seq.next(),
                kind: SetRType::Normal,
            }),
        );
        Ok(Some(PendingRequest {
            req_no,
            outcome: rx,
            action,
        }))
    }

    /// The deletion `req_no` got no answer: tell the right node about the left one
    /// directly and wait in GRACE.
    pub fn on_delete_timeout(&self, req_no: u64) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        if s.mode != Mode::Del || s.req_no != req_no {
            return Ok(DdllAction::None);
        }
        s.waiter = None;
        let (Some(left), Some(right)) = (s.left.clone(), s.right.clone()) else {
            return Ok(self.go_out(&mut s));
        };
        let neighbors = s.neighbors.compute_ns_for_right(&right);
        let set_l = DdllAction::Send(
            right,
            Message::SetL(SetL {
                new_left: left,
                seq: s.right_seq.next(),
                prev_left: self.me.clone(),
                neighbors,
            }),
        );
        s.ref_count += 1;
        s.mode = Mode::Grace;
        s.grace = Some(Notifier::default());
        Ok(set_l)
    }

    /// Notifier woken when GRACE ends.
    pub fn grace_notifier(&self) -> Result<Option<Notifier>> {
        Ok(self.read_state()?.grace.clone())
    }

    /// Leave GRACE without waiting for the remaining `UnrefL`s.
    pub fn force_out(&self) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        if s.mode != Mode::Grace {
            return Ok(DdllAction::None);
        }
        tracing::warn!(
            "{} leaves GRACE with {} references pending",
            self.me,
            s.ref_count
        );
        Ok(self.go_out(&mut s))
    }

    /// Drop everything and return to [Mode::Out].
    pub fn reset(&self) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        let was_out = s.mode == Mode::Out;
        s.waiter = None;
        s.fix_waiter = None;
        s.fix_state = FixState::Waiting;
        if let Some(done) = s.fix_done.take() {
            done.wake();
        }
        let action = self.go_out(&mut s);
        Ok(if was_out { DdllAction::None } else { action })
    }

    /// Handle `SetR`. Runs at the left neighbor of the sender.
    pub fn on_set_r(&self, from: &Link, msg: &SetR) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        if !s.mode.is_member() || s.right.as_ref() != Some(&msg.cur_right) {
            tracing::debug!(
                "{} rejects SetR from {}: mode {:?}, right {:?}, expected {}",
                self.me,
                from,
                s.mode,
                s.right,
                msg.cur_right
            );
            let current_right = if s.mode.is_member() {
                s.right.clone()
            } else {
                None
            };
            return Ok(DdllAction::Send(
                from.clone(),
                Message::SetRNak(SetRNak {
                    req_no: msg.req_no,
                    current_right,
                }),
            ));
        }

        let old_right = msg.cur_right.clone();
        let prior_right_seq = s.right_seq;
        s.right = Some(msg.new_right.clone());
        s.right_seq = msg.new_right_seq;
        if msg.kind != SetRType::FixLeftOnly {
            s.ref_count += 1;
        }

        let mut acts = vec![DdllAction::Send(
            from.clone(),
            Message::SetRAck(SetRAck {
                req_no: msg.req_no,
                prior_right_seq,
                neighbors: s.neighbors.compute_ns_for_right(from),
            }),
        )];

        match msg.kind {
            SetRType::Normal if msg.new_right == *from => {
                // insertion: the old right gets the inserted node as its left
                let seq = prior_right_seq.next();
                s.right_seq = seq;
                let neighbors = s.neighbors.compute_ns_for_right_via(&old_right, from);
                acts.push(DdllAction::Send(
                    old_right.clone(),
                    Message::SetL(SetL {
                        new_left: from.clone(),
                        seq,
                        prev_left: self.me.clone(),
                        neighbors,
                    }),
                ));
            }
            SetRType::Withdraw => {
                // the new right still has the withdrawn node as its left, under the
                // sequence this node assigned when accepting it
                let seq = prior_right_seq.next();
                s.right_seq = seq;
                let neighbors = s.neighbors.compute_ns_for_right(&msg.new_right);
                acts.push(DdllAction::Send(
                    msg.new_right.clone(),
                    Message::SetL(SetL {
                        new_left: self.me.clone(),
                        seq,
                        prev_left: self.me.clone(),
                        neighbors,
                    }),
                ));
            }
            SetRType::Normal => {
                // deletion: the new right gets this node as its left
                let neighbors = s.neighbors.compute_ns_for_right(&msg.new_right);
                acts.push(DdllAction::Send(
                    msg.new_right.clone(),
                    Message::SetL(SetL {
                        new_left: self.me.clone(),
                        seq: msg.new_right_seq,
                        prev_left: from.clone(),
                        neighbors,
                    }),
                ));
            }
            SetRType::FixBoth => {
                acts.push(DdllAction::Send(
                    from.clone(),
                    Message::SetL(SetL {
                        new_left: self.me.clone(),
                        seq: msg.new_right_seq,
                        prev_left: self.me.clone(),
                        neighbors: s.neighbors.compute_ns_for_right(from),
                    }),
                ));
            }
            SetRType::FixLeftOnly => {}
        }

        if old_right != msg.new_right {
            tracing::debug!("{} right: {} -> {}", self.me, old_right, msg.new_right);
            acts.push(DdllAction::RightChanged {
                old: Some(old_right),
                new: msg.new_right.clone(),
            });
        }
        Ok(acts.into())
    }

    /// Handle `SetRAck`. Replies to stale requests are dropped.
    pub fn on_set_r_ack(&self, msg: &SetRAck) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        if msg.req_no == FIX_REQUEST_NO {
            return Ok(self.on_fix_reply(&mut s, WaitOutcome::Ack, Some(&msg.neighbors)));
        }
        if !matches!(&s.waiter, Some((no, _)) if *no == msg.req_no) {
            tracing::debug!("{} drops stale SetRAck #{}", self.me, msg.req_no);
            return Ok(DdllAction::None);
        }

        match s.mode {
            Mode::Ins => {
                s.mode = Mode::In;
                let seq = msg.prior_right_seq.next();
                s.right_seq = seq;
                s.left_seq = s.left_seq.max(seq);
                s.neighbors.set(msg.neighbors.clone());
                Self::resolve(&mut s, msg.req_no, WaitOutcome::Ack);
                tracing::info!(
                    "{} inserted: left {:?}, right {:?}",
                    self.me,
                    s.left,
                    s.right
                );
                let (Some(left), Some(right)) = (s.left.clone(), s.right.clone()) else {
                    return Ok(DdllAction::None);
                };
                let propagate = self.propagate(&mut s);
                Ok(vec![
                    DdllAction::LeftChanged {
                        old: None,
                        new: left,
                    },
                    DdllAction::RightChanged {
                        old: None,
                        new: right,
                    },
                    propagate,
                ]
                .into())
            }
            Mode::Del => {
                let (action, outcome) = self.enter_grace(&mut s);
                Self::resolve(&mut s, msg.req_no, outcome);
                Ok(action)
            }
            mode => {
                tracing::warn!("{} drops SetRAck in mode {:?}", self.me, mode);
                Ok(DdllAction::None)
            }
        }
    }

    /// Handle `SetRNak`.
    pub fn on_set_r_nak(&self, msg: &SetRNak) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        if msg.req_no == FIX_REQUEST_NO {
            return Ok(self.on_fix_reply(
                &mut s,
                WaitOutcome::Nak(msg.current_right.clone()),
                None,
            ));
        }
        if !matches!(&s.waiter, Some((no, _)) if *no == msg.req_no) {
            tracing::debug!("{} drops stale SetRNak #{}", self.me, msg.req_no);
            return Ok(DdllAction::None);
        }
        match s.mode {
            Mode::Ins => s.mode = Mode::InsWait,
            Mode::Del => s.mode = Mode::DelWait,
            mode => {
                tracing::warn!("{} drops SetRNak in mode {:?}", self.me, mode);
                return Ok(DdllAction::None);
            }
        }
        tracing::info!("{} got SetRNak, current right {:?}", self.me, msg.current_right);
        Self::resolve(&mut s, msg.req_no, WaitOutcome::Nak(msg.current_right.clone()));
        Ok(DdllAction::None)
    }

    /// Handle `SetL`.
    pub fn on_set_l(&self, msg: &SetL) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        let mut acts = vec![DdllAction::Send(
            msg.prev_left.clone(),
            Message::UnrefL(UnrefL {
                sender: self.me.clone(),
            }),
        )];

        if matches!(s.mode, Mode::Out | Mode::Grace) {
            tracing::warn!("{} drops SetL in mode {:?}", self.me, s.mode);
            return Ok(acts.into());
        }
        if msg.seq <= s.left_seq {
            tracing::debug!(
                "{} ignores SetL {} with seq {} <= {}",
                self.me,
                msg.new_left,
                msg.seq,
                s.left_seq
            );
            return Ok(acts.into());
        }

        let old_left = s.left.replace(msg.new_left.clone());
        s.left_seq = msg.seq;
        s.neighbors.set(msg.neighbors.clone());

        if s.mode == Mode::Del {
            let left_is_me = msg.new_left == self.me;
            let right_is_me = s.right.as_ref() == Some(&self.me);
            if left_is_me && right_is_me {
                tracing::info!("{} is the last node and leaves", self.me);
                acts.push(self.go_out(&mut s));
                Self::resolve_any(&mut s, WaitOutcome::Collapsed);
                return Ok(acts.into());
            } else if left_is_me {
                let (action, outcome) = self.enter_grace(&mut s);
                acts.push(action);
                Self::resolve_any(&mut s, outcome);
                return Ok(acts.into());
            } else {
                s.mode = Mode::DelWait;
                Self::resolve_any(&mut s, WaitOutcome::Retry);
            }
        }

        if old_left.as_ref() != Some(&msg.new_left) {
            tracing::debug!("{} left: {:?} -> {}", self.me, old_left, msg.new_left);
            acts.push(DdllAction::LeftChanged {
                old: old_left,
                new: msg.new_left.clone(),
            });
            if s.mode.is_member() {
                acts.push(self.propagate(&mut s));
            }
        }
        Ok(acts.into())
    }

    /// Handle `UnrefL`.
    pub fn on_unref_l(&self, msg: &UnrefL) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        s.ref_count = s.ref_count.saturating_sub(1);
        tracing::trace!(
            "{} unref by {}, {} pending",
            self.me,
            msg.sender,
            s.ref_count
        );
        if s.ref_count == 0 && s.mode == Mode::Grace {
            let unref = self.unref_left(&s);
            let departed = self.go_out(&mut s);
            tracing::info!("{} left the ring", self.me);
            return Ok(vec![unref, departed].into());
        }
        Ok(DdllAction::None)
    }

    /// Handle `PropagateNeighbors` from the left neighbor.
    pub fn on_propagate_neighbors(
        &self,
        from: &Link,
        msg: &PropagateNeighbors,
    ) -> Result<DdllAction> {
        let mut s = self.lock_state()?;
        if !s.mode.is_member() || s.left.as_ref() != Some(from) {
            return Ok(DdllAction::None);
        }
        s.neighbors.set(msg.neighbors.clone());
        Ok(self.propagate(&mut s))
    }

    /// Whether `stat`, reported by `target`, shows a broken left link.
    pub fn left_stat_needs_fix(&self, target: &Link, stat: &Stat) -> Result<bool> {
        let s = self.read_state()?;
        if !s.mode.is_member() || s.left.as_ref() != Some(target) {
            return Ok(false);
        }
        Ok(!stat.mode.is_linked() || stat.right.as_ref() != Some(&self.me))
    }

    /// Enter CHECKING if no repair runs and the last one is at least `min_interval_ms` old.
    pub fn try_begin_fix(&self, now_ms: u64, min_interval_ms: u64) -> Result<bool> {
        let mut s = self.lock_state()?;
        if !s.mode.is_linked() || s.fix_state != FixState::Waiting {
            return Ok(false);
        }
        if let Some(last) = s.last_fix_ms {
            if now_ms.saturating_sub(last) < min_interval_ms {
                tracing::debug!("{} throttles repair", self.me);
                return Ok(false);
            }
        }
        s.fix_state = FixState::Checking;
        s.last_fix_ms = Some(now_ms);
        s.fix_done = Some(Notifier::default());
        Ok(true)
    }

    /// Notifier of the repair in progress, if any.
    pub fn fix_in_progress(&self) -> Result<Option<Notifier>> {
        let s = self.read_state()?;
        if s.fix_state == FixState::Waiting {
            return Ok(None);
        }
        Ok(s.fix_done.clone())
    }

    /// Left-side candidates for repair, nearest first, excluding `failed`.
    /// The right link comes last so a ring with no live left backup can still be walked.
    pub fn fix_candidates(&self, failed: &HashSet<Link>) -> Result<Vec<Link>> {
        let s = self.read_state()?;
        let mut candidates: Vec<Link> = vec![];
        let known = s
            .left
            .iter()
            .chain(s.neighbors.neighbors().iter())
            .chain(s.right.iter());
        for link in known {
            if *link != self.me && !failed.contains(link) && !candidates.contains(link) {
                candidates.push(link.clone());
            }
        }
        Ok(candidates)
    }

    /// Decide the repair towards `found`, the live node whose right interval covers this node.
    pub fn prepare_fix(&self, found: &Link, stat: &Stat) -> Result<FixPlan> {
        let mut s = self.lock_state()?;
        if s.fix_state != FixState::Checking {
            return Ok(FixPlan::Consistent);
        }
        let Some(found_right) = stat.right.clone() else {
            return Ok(FixPlan::Consistent);
        };
        if s.left.as_ref() == Some(found) && found_right == self.me {
            return Ok(FixPlan::Consistent);
        }

        let seq = s.left_seq.max(stat.right_seq).next_repair();
        let kind = if found_right == self.me {
            s.fix_state = FixState::FixingLeftOnly;
            SetRType::FixLeftOnly
        } else {
            s.fix_state = FixState::FixingBoth;
            SetRType::FixBoth
        };
        let old_left = s.left.replace(found.clone());
        s.left_seq = seq;
        s.neighbors.remove(found);
        let (tx, rx) = oneshot::channel();
        s.fix_waiter = Some(tx);

        tracing::info!(
            "{} repairs left {:?} -> {} ({:?})",
            self.me,
            old_left,
            found,
            kind
        );
        let mut acts = vec![DdllAction::Send(
            found.clone(),
            Message::SetR(SetR {
                req_no: FIX_REQUEST_NO,
                new_right: self.me.clone(),
                cur_right: found_right,
                new_right_seq: seq,
                kind,
            }),
        )];
        if old_left.as_ref() != Some(found) {
            acts.push(DdllAction::LeftChanged {
                old: old_left,
                new: found.clone(),
            });
        }
        Ok(FixPlan::Repair {
            outcome: rx,
            action: acts.into(),
        })
    }

    /// Go back to CHECKING after a failed repair round.
    pub fn retry_fix(&self) -> Result<()> {
        let mut s = self.lock_state()?;
        s.fix_waiter = None;
        if s.fix_state != FixState::Waiting {
            s.fix_state = FixState::Checking;
        }
        Ok(())
    }

    /// Back to WAITING; wakes everyone waiting for this repair.
    pub fn finish_fix(&self) -> Result<()> {
        let mut s = self.lock_state()?;
        s.fix_state = FixState::Waiting;
        s.fix_waiter = None;
        if let Some(done) = s.fix_done.take() {
            done.wake();
        }
        Ok(())
    }

    fn on_fix_reply(
        &self,
        s: &mut DdllState,
        outcome: WaitOutcome,
        neighbors: Option<&Vec<Link>>,
    ) -> DdllAction {
        if !matches!(s.fix_state, FixState::FixingBoth | FixState::FixingLeftOnly) {
            tracing::debug!("{} drops stale repair reply", self.me);
            return DdllAction::None;
        }
        if let Some(ns) = neighbors {
            s.neighbors.set(ns.clone());
        }
        if let Some(tx) = s.fix_waiter.take() {
            let _ = tx.send(outcome);
        }
        self.propagate(s)
    }
}
