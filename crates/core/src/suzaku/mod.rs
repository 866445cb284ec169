#![warn(missing_docs)]
//! Suzaku finger-table maintenance and routing.
//!
//! [SuzakuStrategy] layers routing on top of a ring position. It keeps the
//! [FingerTables] of one node up to date with periodic update passes (see [update]),
//! answers the table queries of other nodes, and picks next hops for lookups.
//! Nodes pointing at this node are tracked as reverse pointers so they can be told
//! when this node leaves or when the pointer becomes pointless.

use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use dashmap::DashSet;
use suzaku_transport::core::scheduler::Job;
use suzaku_transport::SharedScheduler;
use suzaku_transport::TimerHandle;

use crate::config::SuzakuConfig;
use crate::ddll::Mode;
use crate::ddll::RingView;
use crate::error::Error;
use crate::error::Result;
use crate::finger::distance_to_index;
use crate::finger::Direction;
use crate::finger::FTEntry;
use crate::finger::FingerTables;
use crate::message::AddReversePointerEvent;
use crate::message::FTEntRemoveEvent;
use crate::message::FTEntUpdateEvent;
use crate::message::GetEntReply;
use crate::message::GetEntRequest;
use crate::message::GetFTAllReply;
use crate::message::GetFTAllRequest;
use crate::message::Message;
use crate::message::PayloadSender;
use crate::message::RemoveReversePointerEvent;
use crate::ring::is_ordered_with;
use crate::ring::Link;
use crate::ring::RingKey;

pub mod ordering;
pub mod update;

use ordering::ordering_for;
use ordering::UpdateOrdering;

/// Where a lookup goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHop {
    /// The owner of the key is known.
    Resolved(Link),
    /// Forward to the primary of this entry.
    Forward(FTEntry),
}

/// Reverse-pointer notifications collected while the tables were locked.
#[derive(Default)]
pub(crate) struct Notices {
    added: Vec<Link>,
    superseded: Vec<Link>,
}

/// Whether moving from `prev` to `next` in `dir` passes over `me`.
pub fn is_circulated(dir: Direction, me: &Link, prev: &Link, next: &Link) -> bool {
    match dir {
        Direction::Forward => is_ordered_with(&prev.key, false, &me.key, &next.key, true),
        Direction::Backward => is_ordered_with(&next.key, true, &me.key, &prev.key, false),
    }
}

/// Finger-table maintenance of one node.
pub struct SuzakuStrategy {
    me: Link,
    view: Arc<dyn RingView>,
    sender: Arc<dyn PayloadSender>,
    scheduler: SharedScheduler,
    config: SuzakuConfig,
    fingers: RwLock<FingerTables>,
    ordering: Box<dyn UpdateOrdering>,
    /// Nodes whose last RPC failed; skipped as next hops.
    suspected: DashSet<Link>,
    /// Completed update passes.
    cycles: AtomicU64,
    timer: Mutex<Option<TimerHandle>>,
}

impl SuzakuStrategy {
    /// Create the strategy of the node behind `view`.
    pub fn new(
        view: Arc<dyn RingView>,
        sender: Arc<dyn PayloadSender>,
        scheduler: SharedScheduler,
        config: SuzakuConfig,
    ) -> Self {
        let fingers = FingerTables::new(
            view.clone(),
            config.branching_factor(),
            config.use_bft,
            config.entry_backups,
        );
        Self {
            me: view.me().clone(),
            view,
            sender,
            scheduler,
            ordering: ordering_for(&config),
            config,
            fingers: RwLock::new(fingers),
            suspected: DashSet::new(),
            cycles: AtomicU64::new(0),
            timer: Mutex::new(None),
        }
    }

    /// Lock and return the write guard of the finger tables.
    pub fn lock_fingers(&self) -> Result<RwLockWriteGuard<FingerTables>> {
        self.fingers.write().map_err(|_| Error::FingerSyncLockError)
    }

    /// Lock and return the read guard of the finger tables.
    pub fn read_fingers(&self) -> Result<RwLockReadGuard<FingerTables>> {
        self.fingers.read().map_err(|_| Error::FingerSyncLockError)
    }

    /// Scheduler clock in ms.
    pub fn now(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Number of completed update passes.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Mark `link` as possibly failed.
    pub fn suspect(&self, link: &Link) {
        if self.suspected.insert(link.clone()) {
            tracing::debug!("{} suspects {}", self.me, link);
        }
    }

    /// `link` answered again.
    pub fn unsuspect(&self, link: &Link) {
        self.suspected.remove(link);
    }

    /// Whether `link` is suspected.
    pub fn is_suspected(&self, link: &Link) -> bool {
        self.suspected.contains(link)
    }

    pub(crate) fn install(
        &self,
        ft: &mut FingerTables,
        dir: Direction,
        index: i32,
        entry: FTEntry,
        register: bool,
        notices: &mut Notices,
    ) {
        let primary = entry.primary.clone();
        let before = ft
            .table(dir)
            .and_then(|t| usize::try_from(index).ok().and_then(|i| t.get(i)))
            .map(|e| e.primary.clone());
        if let Some(old) = ft.change(dir, index, entry, self.now()) {
            notices.superseded.push(old);
        }
        if register && primary != self.me && before.as_ref() != Some(&primary) {
            notices.added.push(primary);
        }
    }

    /// Send the collected reverse-pointer notifications. A superseded node is told to
    /// drop this node only when no slot of either table still points at it.
    pub(crate) async fn send_notices(&self, notices: Notices) {
        let Notices { added, superseded } = notices;
        let released: Vec<Link> = match self.read_fingers() {
            Ok(ft) => {
                let mut seen = HashSet::new();
                superseded
                    .into_iter()
                    .filter(|l| *l != self.me && !ft.references(l) && seen.insert(l.clone()))
                    .collect()
            }
            Err(e) => {
                tracing::error!("Read finger tables failed: {e:?}");
                vec![]
            }
        };

        for link in added {
            let msg = Message::AddReversePointerEvent(AddReversePointerEvent {});
            if let Err(e) = self.sender.send_message(&self.me, &link, msg).await {
                tracing::debug!("AddReversePointerEvent to {} failed: {e:?}", link);
            }
        }
        for link in released {
            let msg = Message::RemoveReversePointerEvent(RemoveReversePointerEvent {});
            if let Err(e) = self.sender.send_message(&self.me, &link, msg).await {
                tracing::debug!("RemoveReversePointerEvent to {} failed: {e:?}", link);
            }
        }
    }

    /// Answer a `GetEntRequest` and install the requester's passive entries.
    pub async fn on_get_ent(&self, from: &Link, req: &GetEntRequest) -> Result<GetEntReply> {
        let k = self.config.branching_factor();
        let now = self.now();
        let mut notices = Notices::default();
        let reply = {
            let mut ft = self.lock_fingers()?;
            if req.branching_factor != k {
                tracing::warn!(
                    "{} ignores GetEntRequest with branching factor {} from {}",
                    self.me,
                    req.branching_factor,
                    from
                );
                return Ok(GetEntReply {
                    entries: vec![],
                    pushed_message_count: 0,
                });
            }
            let dir = if req.is_backward {
                Direction::Backward
            } else {
                Direction::Forward
            };
            let (Some(unit), Some(count)) = (k.checked_pow(req.x), 1u64.checked_shl(req.y)) else {
                return Ok(GetEntReply {
                    entries: vec![],
                    pushed_message_count: 0,
                });
            };

            let mut entries = Vec::with_capacity(count as usize + 1);
            for t in 0..=count {
                let entry = if t == 0 {
                    Some(ft.self_entry(dir, now)?)
                } else {
                    match (t).checked_mul(unit) {
                        Some(d) => ft.get_at_distance(dir, d, now)?,
                        None => None,
                    }
                };
                entries.push(entry);
            }

            let mut pushed = 0u32;
            let opposite = dir.opposite();
            if ft.table(opposite).is_some() {
                let mut prev: Option<Link> = None;
                for (t, entry) in req.passive1.iter().enumerate() {
                    let Some(entry) = entry else {
                        break;
                    };
                    if entry.primary == self.me {
                        break;
                    }
                    if let Some(p) = &prev {
                        if is_circulated(opposite, &self.me, p, &entry.primary) {
                            break;
                        }
                    }
                    let Some(d) = (count + t as u64).checked_mul(unit) else {
                        break;
                    };
                    let index = distance_to_index(d, k);
                    prev = Some(entry.primary.clone());
                    if index < 1 {
                        continue;
                    }
                    let existing = ft.get(opposite, index, now)?;
                    if existing.map_or(true, |x| x.refreshed_at <= entry.refreshed_at) {
                        self.install(&mut ft, opposite, index, entry.clone(), true, &mut notices);
                        pushed += 1;
                    }
                }
                if let Some(entry) = &req.passive2 {
                    if let Some(d) = (2 * count).checked_mul(unit) {
                        let index = distance_to_index(d, k);
                        if entry.primary != self.me
                            && index >= 1
                            && !is_circulated(opposite, &self.me, from, &entry.primary)
                            && ft.get(opposite, index, now)?.is_none()
                        {
                            self.install(
                                &mut ft,
                                opposite,
                                index,
                                entry.clone(),
                                true,
                                &mut notices,
                            );
                            pushed += 1;
                        }
                    }
                }
            }
            ft.add_reverse_pointer(from.clone());
            GetEntReply {
                entries,
                pushed_message_count: pushed,
            }
        };
        self.send_notices(notices).await;
        Ok(reply)
    }

    /// Answer a `GetFTAllRequest`.
    pub fn on_get_ft_all(&self) -> Result<GetFTAllReply> {
        let now = self.now();
        let mut ft = self.lock_fingers()?;
        Ok(GetFTAllReply {
            forward: ft.all_entries(Direction::Forward, now)?,
            backward: ft.all_entries(Direction::Backward, now)?,
        })
    }

    /// Refresh the slots pointing at the sender of an `FTEntUpdateEvent`.
    pub fn on_ft_ent_update(&self, ev: &FTEntUpdateEvent) -> Result<()> {
        let now = self.now();
        let refreshed = self.lock_fingers()?.refresh(&ev.entry, now);
        self.unsuspect(&ev.entry.primary);
        tracing::trace!("{} refreshed {} slots of {}", self.me, refreshed, ev.entry.primary);
        Ok(())
    }

    /// Replace a removed node everywhere in the tables.
    pub async fn on_ft_ent_remove(&self, ev: &FTEntRemoveEvent) -> Result<()> {
        let now = self.now();
        let mut notices = Notices::default();
        {
            let mut ft = self.lock_fingers()?;
            ft.remove_node(&ev.removed, &ev.replacements, now)?;
            notices.superseded.push(ev.removed.clone());
        }
        self.suspect(&ev.removed);
        tracing::debug!("{} removed {} from its tables", self.me, ev.removed);
        self.send_notices(notices).await;
        Ok(())
    }

    /// The sender now points at this node.
    pub fn on_add_reverse_pointer(&self, from: &Link) -> Result<()> {
        self.lock_fingers()?.add_reverse_pointer(from.clone());
        Ok(())
    }

    /// The sender no longer points at this node.
    pub fn on_remove_reverse_pointer(&self, from: &Link) -> Result<()> {
        self.lock_fingers()?.remove_reverse_pointer(from);
        Ok(())
    }

    /// The right link changed; reverse pointers within the new right range are dropped.
    pub fn on_right_changed(&self) -> Result<()> {
        let dropped = self.lock_fingers()?.sanitize_rev_ptrs()?;
        if !dropped.is_empty() {
            tracing::debug!("{} dropped reverse pointers {:?}", self.me, dropped);
        }
        Ok(())
    }

    /// A failed node detected locally: drop it from the tables.
    pub fn remove_failed(&self, link: &Link) -> Result<()> {
        let now = self.now();
        self.lock_fingers()?.remove_node(link, &[], now)?;
        self.suspect(link);
        Ok(())
    }

    /// Pick the next hop towards the owner of `key`, the first node at or after it.
    pub fn next_hop(&self, key: &RingKey) -> Result<NextHop> {
        let mode = self.view.mode()?;
        let right = match self.view.right()? {
            Some(r) if mode.is_member() => r,
            _ => {
                return Err(Error::IllegalState {
                    expected: Mode::In,
                    actual: mode,
                })
            }
        };
        if *key == self.me.key {
            return Ok(NextHop::Resolved(self.me.clone()));
        }
        if is_ordered_with(&self.me.key, false, key, &right.key, true) {
            return Ok(NextHop::Resolved(right));
        }
        let excluded: HashSet<Link> = self.suspected.iter().map(|l| l.key().clone()).collect();
        let now = self.now();
        let entry = self.lock_fingers()?.closest_preceding(key, &excluded, now)?;
        Ok(NextHop::Forward(
            entry.unwrap_or_else(|| FTEntry::new(right, now)),
        ))
    }

    /// The entry a lookup receiver hands back for a fill request.
    pub fn fill_entry(&self) -> Result<FTEntry> {
        let now = self.now();
        self.read_fingers()?.self_entry(Direction::Forward, now)
    }

    /// Copy the left neighbor's tables into empty slots.
    pub async fn copy_predecessor_table(&self) -> Result<()> {
        let Some(left) = self.view.left()? else {
            return Ok(());
        };
        if left == self.me {
            return Ok(());
        }
        let msg = Message::GetFTAllRequest(GetFTAllRequest {});
        let reply = match self
            .sender
            .request(&self.me, &left, msg, self.config.rpc_timeout())
            .await
        {
            Ok(Message::GetFTAllReply(r)) => r,
            Ok(m) => return Err(Error::UnexpectedReply(format!("{m:?}"))),
            Err(e) => {
                tracing::debug!("{} could not copy tables of {}: {e:?}", self.me, left);
                return Ok(());
            }
        };

        let now = self.now();
        let mut notices = Notices::default();
        let mut copied = 0;
        {
            let mut ft = self.lock_fingers()?;
            for (dir, entries) in [
                (Direction::Forward, reply.forward),
                (Direction::Backward, reply.backward),
            ] {
                if ft.table(dir).is_none() {
                    continue;
                }
                for (i, entry) in entries.into_iter().enumerate().skip(1) {
                    let Some(entry) = entry else {
                        continue;
                    };
                    let Ok(index) = i32::try_from(i) else {
                        break;
                    };
                    if entry.primary == self.me || ft.get(dir, index, now)?.is_some() {
                        continue;
                    }
                    self.install(&mut ft, dir, index, entry, true, &mut notices);
                    copied += 1;
                }
            }
        }
        tracing::debug!("{} copied {} entries from {}", self.me, copied, left);
        self.send_notices(notices).await;
        Ok(())
    }

    /// Arm the periodic update pass.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        let job: Job = Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(this) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = this.update_pass().await {
                    tracing::warn!("Update pass of {} failed: {e:?}", this.me);
                }
            })
        });
        let handle = self.scheduler.schedule(
            self.config.update_delay(),
            Some(self.config.update_period()),
            job,
        );
        let mut timer = self.timer.lock().map_err(|_| Error::FingerSyncLockError)?;
        if let Some(old) = timer.replace(handle) {
            old.cancel();
        }
        Ok(())
    }

    /// Cancel the periodic update pass.
    pub fn stop(&self) -> Result<()> {
        let mut timer = self.timer.lock().map_err(|_| Error::FingerSyncLockError)?;
        if let Some(handle) = timer.take() {
            handle.cancel();
        }
        Ok(())
    }

    /// Tell every reverse pointer that this node leaves; the right neighbor replaces it.
    pub async fn announce_leave(&self) -> Result<()> {
        let reverse_pointers = self.read_fingers()?.reverse_pointers();
        let replacements: Vec<Link> = self
            .view
            .right()?
            .filter(|r| *r != self.me)
            .into_iter()
            .collect();
        for rp in reverse_pointers {
            let msg = Message::FTEntRemoveEvent(FTEntRemoveEvent {
                removed: self.me.clone(),
                replacements: replacements.clone(),
            });
            if let Err(e) = self.sender.send_message(&self.me, &rp, msg).await {
                tracing::debug!("FTEntRemoveEvent to {} failed: {e:?}", rp);
            }
        }
        Ok(())
    }
}
