//! Update passes of the finger tables.
//!
//! Level `p` of a direction refreshes the entries at distances `(2^y + t) * K^x`
//! for `t` in `0..=2^y`, where `x = p / B` and `y = p % B`. The entry at distance
//! `2^p` is the base: it is asked for its own entries at `t * K^x`, which lie
//! exactly `2^p` further. A pass walks the levels upward until the table wraps
//! around the ring.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::Ordering;

use super::is_circulated;
use super::Notices;
use super::SuzakuStrategy;
use crate::error::Result;
use crate::finger::distance_to_index;
use crate::finger::Direction;
use crate::finger::FTEntry;
use crate::finger::FingerTables;
use crate::message::GetEntRequest;
use crate::message::Message;

/// Result of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelOutcome {
    /// Continue with the next level, optionally starting from this basis.
    Next(Option<FTEntry>),
    /// The table of this direction covers the whole ring.
    Finished,
}

impl SuzakuStrategy {
    /// Run one update pass over both directions.
    pub async fn update_pass(&self) -> Result<()> {
        if !self.view.mode()?.is_member() {
            return Ok(());
        }
        let has_backward = self.read_fingers()?.has_backward();
        let directions = if has_backward { 2 } else { 1 };
        let first_cycle = self.cycles() == 0;
        let interval = self.config.update_level_interval();

        let mut finished: HashSet<Direction> = HashSet::new();
        let mut basis: HashMap<Direction, FTEntry> = HashMap::new();
        for (dir, level) in self.ordering.steps(self.config.max_level, has_backward) {
            if finished.contains(&dir) {
                continue;
            }
            let start = basis.remove(&dir);
            match self.update_level(dir, level, start, first_cycle).await? {
                LevelOutcome::Next(Some(next)) => {
                    basis.insert(dir, next);
                }
                LevelOutcome::Next(None) => {}
                LevelOutcome::Finished => {
                    finished.insert(dir);
                    if finished.len() == directions {
                        break;
                    }
                }
            }
            if !interval.is_zero() {
                self.scheduler.sleep(interval).await;
            }
        }

        let cycles = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let (forward, backward) = {
            let ft = self.read_fingers()?;
            (ft.len(Direction::Forward), ft.len(Direction::Backward))
        };
        tracing::debug!(
            "{} finished update pass {}, forward {} backward {}",
            self.me,
            cycles,
            forward,
            backward
        );
        Ok(())
    }

    /// Refresh one level of `dir`, starting from `basis` or from the table entry at `2^level`.
    pub async fn update_level(
        &self,
        dir: Direction,
        level: u32,
        basis: Option<FTEntry>,
        first_cycle: bool,
    ) -> Result<LevelOutcome> {
        let k = self.config.branching_factor();
        let bits = self.config.branching_bits;
        let (x, y) = (level / bits, level % bits);
        let (Some(unit), Some(count)) = (k.checked_pow(x), 1u64.checked_shl(y)) else {
            return Ok(LevelOutcome::Finished);
        };
        let Some(base_distance) = count.checked_mul(unit) else {
            return Ok(LevelOutcome::Finished);
        };
        let start = self.now();

        let (base, passive1, passive2) = {
            let mut ft = self.lock_fingers()?;
            let base = match basis {
                Some(b) => Some(b),
                None => ft.get_at_distance(dir, base_distance, start)?,
            };
            let (passive1, passive2) =
                self.passive_updates(&mut ft, dir, unit, count, first_cycle, start)?;
            (base, passive1, passive2)
        };

        let Some(base) = base else {
            return Ok(LevelOutcome::Finished);
        };
        if base.primary == self.me {
            return Ok(LevelOutcome::Finished);
        }

        let targets: Vec<_> = base.links().filter(|l| **l != self.me).cloned().collect();
        for target in targets {
            let req = Message::GetEntRequest(GetEntRequest {
                is_backward: dir.is_backward(),
                x,
                y,
                branching_factor: k,
                passive1: passive1.clone(),
                passive2: passive2.clone(),
            });
            match self
                .sender
                .request(&self.me, &target, req, self.config.rpc_timeout())
                .await
            {
                Ok(Message::GetEntReply(reply)) => {
                    self.unsuspect(&target);
                    if reply.entries.is_empty() {
                        return Ok(LevelOutcome::Next(None));
                    }
                    tracing::trace!(
                        "{} level {:?}/{} from {}: {} entries, {} pushed",
                        self.me,
                        dir,
                        level,
                        target,
                        reply.entries.len(),
                        reply.pushed_message_count
                    );
                    return self.install_level(dir, unit, count, reply.entries, start).await;
                }
                Ok(other) => {
                    tracing::warn!("{} got unexpected reply to GetEntRequest: {:?}", self.me, other);
                    self.suspect(&target);
                }
                Err(e) => {
                    tracing::debug!("GetEntRequest to {} failed: {e:?}", target);
                    self.suspect(&target);
                }
            }
        }
        Ok(LevelOutcome::Next(None))
    }

    /// Entries of the opposite table pushed along with a `GetEntRequest` of level
    /// `count * unit` in `dir`.
    ///
    /// The queried node sits `count * unit` away, so an entry at distance `d` here lies
    /// `count * unit + d` away from it in the opposite direction. The batch carries the
    /// distances `t * unit` for `t` in `0..=count`. On the first cycle a single seed at
    /// `count * unit` is added; the queried node puts it into its slot at
    /// `2 * count * unit` when that slot is still empty.
    pub(crate) fn passive_updates(
        &self,
        ft: &mut FingerTables,
        dir: Direction,
        unit: u64,
        count: u64,
        first_cycle: bool,
        now: u64,
    ) -> Result<(Vec<Option<FTEntry>>, Option<FTEntry>)> {
        let opposite = dir.opposite();
        if ft.table(opposite).is_none() {
            return Ok((vec![], None));
        }
        let mut batch = Vec::with_capacity(count as usize + 1);
        for t in 0..=count {
            let entry = if t == 0 {
                Some(ft.self_entry(opposite, now)?)
            } else {
                match t.checked_mul(unit) {
                    Some(d) => ft.get_at_distance(opposite, d, now)?,
                    None => None,
                }
            };
            batch.push(entry);
        }
        let seed = match count.checked_mul(unit) {
            Some(d) if first_cycle => ft.get_at_distance(opposite, d, now)?,
            _ => None,
        };
        Ok((batch, seed))
    }

    /// Install `entries[t]` at distance `(count + t) * unit`.
    async fn install_level(
        &self,
        dir: Direction,
        unit: u64,
        count: u64,
        entries: Vec<Option<FTEntry>>,
        start: u64,
    ) -> Result<LevelOutcome> {
        let k = self.config.branching_factor();
        let mut notices = Notices::default();
        let mut outcome = LevelOutcome::Next(None);
        {
            let mut ft = self.lock_fingers()?;
            let last = entries.len() - 1;
            let mut prev: Option<FTEntry> = None;
            for (t, entry) in entries.into_iter().enumerate() {
                let Some(entry) = entry else {
                    break;
                };
                let Some(distance) = (count + t as u64).checked_mul(unit) else {
                    outcome = LevelOutcome::Finished;
                    break;
                };
                let index = distance_to_index(distance, k);
                let wrapped = entry.primary == self.me
                    || prev
                        .as_ref()
                        .map_or(false, |p| is_circulated(dir, &self.me, &p.primary, &entry.primary));
                if wrapped {
                    notices.superseded.extend(ft.shrink(dir, index));
                    outcome = LevelOutcome::Finished;
                    break;
                }
                if t == last && t > 0 && self.config.delayed_update {
                    outcome = LevelOutcome::Next(Some(entry));
                    break;
                }
                let newer = ft
                    .table(dir)
                    .and_then(|tb| usize::try_from(index).ok().and_then(|i| tb.get(i)))
                    .map_or(false, |existing| existing.refreshed_at > start);
                if !newer {
                    self.install(&mut ft, dir, index, entry.clone(), t > 0, &mut notices);
                }
                prev = Some(entry);
            }
        }
        self.send_notices(notices).await;
        Ok(outcome)
    }
}
