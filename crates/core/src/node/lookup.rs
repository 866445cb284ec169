//! Key lookup over the finger tables.
//!
//! Each hop acknowledges a `LookupRequest` at once and continues routing on its own
//! task. The node that resolves the key reports `LookupDone` straight to the origin.

use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use suzaku_transport::core::scheduler::timeout;
use tokio::sync::oneshot;

use super::RingNode;
use crate::error::Error;
use crate::error::Result;
use crate::message::LookupDone;
use crate::message::LookupRequest;
use crate::message::Message;
use crate::ring::Link;
use crate::ring::RingKey;
use crate::suzaku::NextHop;

/// A resolved lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    /// The looked-up key.
    pub key: RingKey,
    /// First node clockwise whose key is at or after `key`.
    pub owner: Link,
    /// The node that resolved the lookup.
    pub resolver: Link,
    /// Hops taken.
    pub hops: u32,
}

impl From<&LookupDone> for LookupResult {
    fn from(done: &LookupDone) -> Self {
        Self {
            key: done.key.clone(),
            owner: done.owner.clone(),
            resolver: done.resolver.clone(),
            hops: done.hops,
        }
    }
}

impl RingNode {
    /// Find the owner of `key`.
    pub async fn lookup(&self, key: &RingKey) -> Result<LookupResult> {
        let query_id = self.lookup_seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending_lookups.insert(query_id, tx);

        let req = LookupRequest {
            query_id,
            origin: self.me.clone(),
            key: key.clone(),
            hops: 0,
            fill: false,
        };
        if let Err(e) = self.route(req).await {
            self.pending_lookups.remove(&query_id);
            return Err(e);
        }

        match timeout(&*self.scheduler, self.config.suzaku.lookup_timeout(), rx).await {
            Some(Ok(result)) => Ok(result),
            _ => {
                self.pending_lookups.remove(&query_id);
                Err(Error::LookupTimeout(key.clone()))
            }
        }
    }

    /// Route `req` one hop further, or resolve it here.
    pub async fn route(&self, req: LookupRequest) -> Result<()> {
        let max_retry = self.config.suzaku.lookup_max_retry;
        for attempt in 0..=max_retry {
            let entry = match self.suzaku.next_hop(&req.key)? {
                NextHop::Resolved(owner) => return self.resolve_lookup(&req, owner).await,
                NextHop::Forward(entry) => entry,
            };
            let hop = entry.primary.clone();
            let now = self.scheduler.now_ms();
            let forward = LookupRequest {
                hops: req.hops + 1,
                fill: entry.is_stale(now, self.config.suzaku.fill_threshold_ms),
                ..req.clone()
            };
            let result = self
                .sender
                .request(
                    &self.me,
                    &hop,
                    Message::LookupRequest(forward),
                    self.config.suzaku.lookup_hop_timeout(),
                )
                .await;
            match result {
                Ok(Message::LookupAck(_)) => {
                    self.suzaku.unsuspect(&hop);
                    return Ok(());
                }
                Ok(other) => {
                    tracing::warn!("{} got unexpected lookup reply {:?}", self.me, other);
                    self.suzaku.suspect(&hop);
                }
                Err(e) => {
                    tracing::info!(
                        "{} lookup hop {} failed (attempt {}): {e:?}",
                        self.me,
                        hop,
                        attempt
                    );
                    self.suzaku.suspect(&hop);
                    if self.ddll.left()?.as_ref() == Some(&hop) {
                        self.check_and_fix().await?;
                        self.wait_fix().await?;
                    }
                    let now = self.scheduler.now_ms();
                    self.suzaku
                        .lock_fingers()?
                        .remove_node(&hop, &entry.backups, now)?;
                }
            }
        }
        Err(Error::LookupTimeout(req.key))
    }

    async fn resolve_lookup(&self, req: &LookupRequest, owner: Link) -> Result<()> {
        let done = LookupDone {
            query_id: req.query_id,
            key: req.key.clone(),
            owner,
            resolver: self.me.clone(),
            hops: req.hops,
        };
        tracing::debug!(
            "{} resolved {} to {} in {} hops",
            self.me,
            done.key,
            done.owner,
            done.hops
        );
        if req.origin == self.me {
            self.on_lookup_done(&done);
            return Ok(());
        }
        self.sender
            .send_message(&self.me, &req.origin, Message::LookupDone(done))
            .await
    }

    /// Complete the pending lookup `done` answers. Unknown query ids are dropped.
    pub fn on_lookup_done(&self, done: &LookupDone) {
        match self.pending_lookups.remove(&done.query_id) {
            Some((_, tx)) => {
                let _ = tx.send(LookupResult::from(done));
            }
            None => tracing::debug!("{} drops stale LookupDone #{}", self.me, done.query_id),
        }
    }
}
