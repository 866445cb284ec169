//! Joining and leaving the ring.

use std::collections::HashSet;

use suzaku_transport::core::scheduler::timeout;

use super::RingNode;
use crate::ddll::DdllAction;
use crate::ddll::InsertOutcome;
use crate::ddll::Mode;
use crate::ddll::PendingRequest;
use crate::ddll::WaitOutcome;
use crate::error::Error;
use crate::error::Result;
use crate::message::FindNearest;
use crate::message::Message;
use crate::message::SetFindNext;
use crate::message::SetFindResult;
use crate::ring::is_ordered_with;
use crate::ring::Link;

/// Errors after which another insertion attempt may succeed.
fn is_transient(e: &Error) -> bool {
    matches!(
        e,
        Error::Transport(_)
            | Error::RemoteFailure(_)
            | Error::UnexpectedReply(_)
            | Error::FindNearestExhausted(_)
    )
}

impl RingNode {
    /// Form a new ring containing only this node.
    pub async fn insert_as_initial(&self) -> Result<()> {
        self.ddll.insert_as_initial()?;
        self.on_inserted().await
    }

    /// Join the ring `introducer` belongs to. `Ok(false)` means every attempt failed
    /// and the node is back in mode `Out`.
    pub async fn insert(&self, introducer: &Link) -> Result<bool> {
        let max_retry = self.config.ddll.insert_max_retry;
        let mut hint: Option<(Link, Link)> = None;
        for attempt in 0..max_retry {
            let point = match hint.take() {
                Some(p) => Ok(p),
                None => self.find_insertion_point(introducer).await,
            };
            match point {
                Ok((left, right)) => match self.insert0(&left, &right).await? {
                    InsertOutcome::Inserted => {
                        self.on_inserted().await?;
                        return Ok(true);
                    }
                    InsertOutcome::Failed(h) => hint = h,
                },
                Err(e) if is_transient(&e) => {
                    tracing::info!("{} found no insertion point: {e:?}", self.me);
                }
                Err(e) => return Err(e),
            }
            self.scheduler.sleep(self.config.ddll.backoff(attempt)).await;
        }

        tracing::warn!("{} gives up insertion after {} attempts", self.me, max_retry);
        let act = self.ddll.reset()?;
        self.execute(act).await?;
        Ok(false)
    }

    /// One insertion attempt between `left` and `right`.
    pub async fn insert0(&self, left: &Link, right: &Link) -> Result<InsertOutcome> {
        let PendingRequest {
            req_no,
            outcome,
            action,
        } = self.ddll.begin_insert(left, right)?;
        self.execute(action).await?;

        let waited = timeout(
            &*self.scheduler,
            self.config.ddll.set_r_timeout(),
            outcome,
        )
        .await;
        match waited {
            Some(Ok(WaitOutcome::Ack)) => Ok(InsertOutcome::Inserted),
            Some(Ok(WaitOutcome::Nak(current_right))) => {
                let act = self.ddll.abort_insert(req_no, false)?;
                self.execute(act).await?;
                let hint = current_right
                    .filter(|r| is_ordered_with(&left.key, false, &self.me.key, &r.key, false))
                    .map(|r| (left.clone(), r));
                tracing::info!("{} insertion rejected, hint {:?}", self.me, hint);
                Ok(InsertOutcome::Failed(hint))
            }
            Some(Ok(other)) => {
                tracing::warn!("{} unexpected insertion outcome {:?}", self.me, other);
                let act = self.ddll.abort_insert(req_no, false)?;
                self.execute(act).await?;
                Ok(InsertOutcome::Failed(None))
            }
            Some(Err(_)) => {
                let act = self.ddll.abort_insert(req_no, false)?;
                self.execute(act).await?;
                Ok(InsertOutcome::Failed(None))
            }
            None => {
                tracing::info!("{} insertion #{} timed out", self.me, req_no);
                let act = self.ddll.abort_insert(req_no, true)?;
                self.execute(act).await?;
                Ok(InsertOutcome::Failed(None))
            }
        }
    }

    /// Locate the left and right neighbors of this node's key, starting at `introducer`.
    pub async fn find_insertion_point(&self, introducer: &Link) -> Result<(Link, Link)> {
        let max_hops = self.config.ddll.find_max_hops;
        let mut target = introducer.clone();
        let mut prev_key = None;
        for hop in 0..max_hops {
            let msg = Message::FindNearest(FindNearest {
                req_no: hop as u64,
                search_key: self.me.key.clone(),
                prev_key: prev_key.take(),
            });
            let reply = self
                .sender
                .request(
                    &self.me,
                    &target,
                    msg,
                    self.config.ddll.find_nearest_timeout(),
                )
                .await?;
            match reply {
                Message::SetFindResult(SetFindResult { left, right }) => {
                    tracing::debug!("{} insertion point ({}, {})", self.me, left, right);
                    return Ok((left, right));
                }
                Message::SetFindNext(SetFindNext { next, prev_key: k }) => {
                    prev_key = Some(k);
                    target = next;
                }
                m => return Err(Error::UnexpectedReply(format!("{m:?}"))),
            }
        }
        Err(Error::FindNearestExhausted(max_hops))
    }

    /// Answer `FindNearest`: the insertion point if this node borders it, otherwise
    /// the next node to ask.
    pub(crate) fn on_find_nearest(&self, msg: &FindNearest) -> Result<Message> {
        let stat = self.ddll.stat()?;
        let (Some(left), Some(right)) = (stat.left, stat.right) else {
            return Ok(Message::failure("not in the ring"));
        };
        if !stat.mode.is_member() {
            return Ok(Message::failure("not in the ring"));
        }
        let key = &msg.search_key;
        if right == self.me || is_ordered_with(&self.me.key, false, key, &right.key, false) {
            return Ok(Message::SetFindResult(SetFindResult {
                left: self.me.clone(),
                right,
            }));
        }
        if is_ordered_with(&left.key, false, key, &self.me.key, false) {
            return Ok(Message::SetFindResult(SetFindResult {
                left,
                right: self.me.clone(),
            }));
        }

        let now = self.scheduler.now_ms();
        let closest = self
            .suzaku
            .lock_fingers()?
            .closest_preceding(key, &HashSet::new(), now)?
            .map(|e| e.primary)
            .filter(|p| *p != self.me && Some(&p.key) != msg.prev_key.as_ref());
        Ok(Message::SetFindNext(SetFindNext {
            next: closest.unwrap_or(right),
            prev_key: self.me.key.clone(),
        }))
    }

    async fn on_inserted(&self) -> Result<()> {
        if self.config.suzaku.copy_predecessor_table {
            if let Err(e) = self.suzaku.copy_predecessor_table().await {
                tracing::warn!("{} failed to copy predecessor tables: {e:?}", self.me);
            }
        }
        self.suzaku.start()
    }

    /// Leave the ring gracefully. `Ok(false)` means every attempt failed and the node
    /// was reset locally.
    pub async fn delete(&self) -> Result<bool> {
        let max_retry = self.config.ddll.delete_max_retry;
        let mode = self.ddll.mode()?;
        if !matches!(mode, Mode::In | Mode::DelWait) {
            return Err(Error::IllegalState {
                expected: Mode::In,
                actual: mode,
            });
        }
        self.suzaku.stop()?;
        self.suzaku.announce_leave().await?;

        for attempt in 0..max_retry {
            let Some(PendingRequest {
                req_no,
                outcome,
                action,
            }) = self.ddll.begin_delete()?
            else {
                self.execute(DdllAction::Departed).await?;
                return Ok(true);
            };
            self.execute(action).await?;

            let waited = timeout(
                &*self.scheduler,
                self.config.ddll.set_r_timeout(),
                outcome,
            )
            .await;
            match waited {
                Some(Ok(WaitOutcome::Ack)) | Some(Ok(WaitOutcome::Collapsed)) => return Ok(true),
                Some(Ok(WaitOutcome::Grace)) => {
                    self.await_grace().await?;
                    return Ok(true);
                }
                Some(Ok(WaitOutcome::Nak(_))) | Some(Ok(WaitOutcome::Retry)) | Some(Err(_)) => {
                    tracing::info!("{} deletion #{} retries", self.me, req_no);
                    self.scheduler.sleep(self.config.ddll.backoff(attempt)).await;
                }
                None => {
                    tracing::info!("{} deletion #{} timed out", self.me, req_no);
                    let act = self.ddll.on_delete_timeout(req_no)?;
                    self.execute(act).await?;
                    self.await_grace().await?;
                    return Ok(true);
                }
            }
        }

        tracing::warn!("{} gives up deletion after {} attempts", self.me, max_retry);
        let act = self.ddll.reset()?;
        self.execute(act).await?;
        Ok(false)
    }

    /// Wait for the pending references to be released, then force the node out.
    async fn await_grace(&self) -> Result<()> {
        let Some(grace) = self.ddll.grace_notifier()? else {
            return Ok(());
        };
        if timeout(&*self.scheduler, self.config.ddll.grace_timeout(), grace)
            .await
            .is_none()
        {
            let act = self.ddll.force_out()?;
            self.execute(act).await?;
        }
        Ok(())
    }
}
