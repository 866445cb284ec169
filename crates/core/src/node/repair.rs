//! Link repair.
//!
//! A repair looks for the nearest live node to the left, walking rightward from
//! the first responsive candidate until it reaches the node whose right interval
//! covers this node. It then sends that node a `SetR` with the reserved request number.
//! Repairs of one node are serialized by the fix state of [crate::ddll::DdllNode].

use std::collections::HashSet;

use suzaku_transport::core::scheduler::timeout;

use super::RingNode;
use crate::ddll::FixPlan;
use crate::ddll::WaitOutcome;
use crate::error::Error;
use crate::error::Result;
use crate::message::GetStat;
use crate::message::Message;
use crate::message::Stat;
use crate::ring::is_ordered_with;
use crate::ring::Link;

impl RingNode {
    /// Ask `target` for its [Stat].
    pub async fn get_stat(&self, target: &Link) -> Result<Stat> {
        let msg = Message::GetStat(GetStat { req_no: 0 });
        match self
            .sender
            .request(
                &self.me,
                target,
                msg,
                self.config.ddll.get_stat_timeout(),
            )
            .await?
        {
            Message::Stat(stat) => Ok(stat),
            m => Err(Error::UnexpectedReply(format!("{m:?}"))),
        }
    }

    /// Query the left neighbor and repair the left link if it is unreachable, out of
    /// the ring, or does not point back at this node.
    pub async fn check_and_fix(&self) -> Result<bool> {
        if !self.ddll.mode()?.is_member() {
            return Ok(false);
        }
        let Some(left) = self.ddll.left()? else {
            return Ok(false);
        };
        if left == self.me {
            return Ok(false);
        }
        let needs_fix = match self.get_stat(&left).await {
            Ok(stat) => self.ddll.left_stat_needs_fix(&left, &stat)?,
            Err(e) => {
                tracing::info!("{} cannot reach left {}: {e:?}", self.me, left);
                true
            }
        };
        if !needs_fix {
            return Ok(false);
        }
        self.fix().await
    }

    /// Wait until the repair in progress, if any, completes.
    pub async fn wait_fix(&self) -> Result<()> {
        if let Some(done) = self.ddll.fix_in_progress()? {
            let bound = self
                .config
                .ddll
                .set_r_timeout()
                .saturating_mul(self.config.ddll.fix_max_retry as u32 + 1);
            if timeout(&*self.scheduler, bound, done).await.is_none() {
                tracing::warn!("{} stopped waiting for repair", self.me);
            }
        }
        Ok(())
    }

    /// Repair the left link. Returns `false` when another repair runs, the last one
    /// is too recent, or no live left neighbor was found.
    pub async fn fix(&self) -> Result<bool> {
        let now = self.scheduler.now_ms();
        if !self
            .ddll
            .try_begin_fix(now, self.config.ddll.min_fix_interval_ms)?
        {
            return Ok(false);
        }

        let mut failed: HashSet<Link> = HashSet::new();
        for round in 0..self.config.ddll.fix_max_retry {
            let Some((found, stat)) = self.find_live_left(&mut failed).await? else {
                tracing::warn!("{} found no live left neighbor", self.me);
                break;
            };
            match self.ddll.prepare_fix(&found, &stat)? {
                FixPlan::Consistent => {
                    tracing::debug!("{} left link {} is consistent", self.me, found);
                    self.ddll.finish_fix()?;
                    return Ok(true);
                }
                FixPlan::Repair { outcome, action } => {
                    self.execute(action).await?;
                    let waited = timeout(
                        &*self.scheduler,
                        self.config.ddll.set_r_timeout(),
                        outcome,
                    )
                    .await;
                    match waited {
                        Some(Ok(WaitOutcome::Ack)) => {
                            tracing::info!("{} repaired its left link to {}", self.me, found);
                            self.ddll.finish_fix()?;
                            return Ok(true);
                        }
                        Some(Ok(o)) => {
                            tracing::info!("{} repair round {} got {:?}", self.me, round, o);
                        }
                        Some(Err(_)) => {}
                        None => {
                            tracing::info!("{} repair via {} timed out", self.me, found);
                            failed.insert(found);
                        }
                    }
                    self.ddll.retry_fix()?;
                }
            }
        }
        self.ddll.finish_fix()?;
        Ok(false)
    }

    /// The live node whose right interval `(node, right]` covers this node, with its
    /// [Stat]. Unresponsive nodes are added to `failed`.
    pub async fn find_live_left(&self, failed: &mut HashSet<Link>) -> Result<Option<(Link, Stat)>> {
        let candidates = self.ddll.fix_candidates(failed)?;
        for candidate in candidates {
            let stat = match self.get_stat(&candidate).await {
                Ok(s) if s.mode.is_linked() => s,
                Ok(s) => {
                    tracing::debug!("{} skips {} in mode {:?}", self.me, candidate, s.mode);
                    failed.insert(candidate);
                    continue;
                }
                Err(e) => {
                    tracing::debug!("{} skips {}: {e:?}", self.me, candidate);
                    failed.insert(candidate);
                    continue;
                }
            };

            let mut cur = candidate;
            let mut cur_stat = stat;
            for _ in 0..self.config.ddll.find_max_hops {
                let Some(right) = cur_stat.right.clone() else {
                    break;
                };
                if is_ordered_with(&cur.key, false, &self.me.key, &right.key, true) {
                    break;
                }
                if failed.contains(&right) {
                    break;
                }
                match self.get_stat(&right).await {
                    Ok(s) if s.mode.is_linked() => {
                        cur = right;
                        cur_stat = s;
                    }
                    _ => {
                        failed.insert(right);
                        break;
                    }
                }
            }
            return Ok(Some((cur, cur_stat)));
        }
        Ok(None)
    }
}
