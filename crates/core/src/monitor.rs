#![warn(missing_docs)]
//! Heartbeat-style failure detection.
//!
//! [NodeMonitor] keeps one periodic probe per remote endpoint. Each probe batches the
//! keys watched at that endpoint into a single `GetStatMulti` and reports every answer
//! to the subscribing node through [MonitorListener]. A timed-out probe reports every
//! watched key as failed.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use suzaku_transport::core::scheduler::Job;
use suzaku_transport::Endpoint;
use suzaku_transport::SharedScheduler;
use suzaku_transport::TimerHandle;

use crate::message::GetStatMulti;
use crate::message::Message;
use crate::message::PayloadSender;
use crate::message::Stat;
use crate::ring::Link;

/// Receiver of probe results.
#[async_trait]
pub trait MonitorListener: Send + Sync {
    /// `target` answered with `stat`.
    async fn on_stat(&self, target: &Link, stat: &Stat);
    /// `target` did not answer or is unknown at its endpoint.
    async fn on_failure(&self, target: &Link);
}

struct Watch {
    target: Link,
    subscriber: Link,
    listener: Weak<dyn MonitorListener>,
}

struct Probe {
    watches: Vec<Watch>,
    timer: TimerHandle,
}

/// Periodic probes towards remote endpoints.
pub struct NodeMonitor {
    sender: Arc<dyn PayloadSender>,
    scheduler: SharedScheduler,
    period: Duration,
    probes: DashMap<Endpoint, Probe>,
}

impl NodeMonitor {
    /// Create a monitor probing every `period`.
    pub fn new(
        sender: Arc<dyn PayloadSender>,
        scheduler: SharedScheduler,
        period: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            sender,
            scheduler,
            period,
            probes: DashMap::new(),
        })
    }

    /// Watch `target` on behalf of `subscriber`.
    pub fn register(
        self: &Arc<Self>,
        target: &Link,
        subscriber: &Link,
        listener: Weak<dyn MonitorListener>,
    ) {
        let watch = Watch {
            target: target.clone(),
            subscriber: subscriber.clone(),
            listener,
        };
        if let Some(mut probe) = self.probes.get_mut(&target.endpoint) {
            probe
                .watches
                .retain(|w| !(w.target == *target && w.subscriber == *subscriber));
            probe.watches.push(watch);
            return;
        }

        tracing::debug!("{} starts probing {}", subscriber, target.endpoint);
        let weak = Arc::downgrade(self);
        let endpoint = target.endpoint.clone();
        let job: Job = Arc::new(move || {
            let weak = weak.clone();
            let endpoint = endpoint.clone();
            Box::pin(async move {
                if let Some(monitor) = weak.upgrade() {
                    monitor.probe(&endpoint).await;
                }
            })
        });
        let timer = self.scheduler.schedule(self.period, Some(self.period), job);
        self.probes.insert(target.endpoint.clone(), Probe {
            watches: vec![watch],
            timer,
        });
    }

    /// Stop watching `target` for `subscriber`.
    pub fn unregister(&self, target: &Link, subscriber: &Link) {
        self.retain(&target.endpoint, |w| {
            !(w.target == *target && w.subscriber == *subscriber)
        });
    }

    /// Drop every watch of `subscriber`.
    pub fn unregister_all(&self, subscriber: &Link) {
        let endpoints: Vec<Endpoint> = self.probes.iter().map(|p| p.key().clone()).collect();
        for endpoint in endpoints {
            self.retain(&endpoint, |w| w.subscriber != *subscriber);
        }
    }

    /// Whether `subscriber` watches `target`.
    pub fn is_watching(&self, target: &Link, subscriber: &Link) -> bool {
        self.probes
            .get(&target.endpoint)
            .map(|p| {
                p.watches
                    .iter()
                    .any(|w| w.target == *target && w.subscriber == *subscriber)
            })
            .unwrap_or(false)
    }

    /// Cancel every probe.
    pub fn shutdown(&self) {
        for probe in self.probes.iter() {
            probe.timer.cancel();
        }
        self.probes.clear();
    }

    fn retain(&self, endpoint: &Endpoint, keep: impl Fn(&Watch) -> bool) {
        let empty = match self.probes.get_mut(endpoint) {
            Some(mut probe) => {
                probe.watches.retain(|w| keep(w));
                probe.watches.is_empty()
            }
            None => return,
        };
        if empty {
            if let Some((_, probe)) = self.probes.remove(endpoint) {
                probe.timer.cancel();
                tracing::debug!("Probing {} stopped", endpoint);
            }
        }
    }

    async fn probe(&self, endpoint: &Endpoint) {
        let watches: Vec<(Link, Link, Weak<dyn MonitorListener>)> = match self.probes.get(endpoint) {
            Some(p) => p
                .watches
                .iter()
                .map(|w| (w.target.clone(), w.subscriber.clone(), w.listener.clone()))
                .collect(),
            None => return,
        };
        let Some((first_target, first_subscriber, _)) = watches.first().cloned() else {
            return;
        };

        let keys = watches.iter().map(|(t, _, _)| t.key.clone()).collect();
        let msg = Message::GetStatMulti(GetStatMulti { keys });
        let stats = match self
            .sender
            .request(&first_subscriber, &first_target, msg, self.period)
            .await
        {
            Ok(Message::SetStatMulti(reply)) => reply.stats,
            Ok(other) => {
                tracing::warn!("Probe of {} got unexpected reply {:?}", endpoint, other);
                vec![]
            }
            Err(e) => {
                tracing::warn!("Probe of {} failed: {e:?}", endpoint);
                vec![]
            }
        };

        for (i, (target, _, listener)) in watches.iter().enumerate() {
            let Some(listener) = listener.upgrade() else {
                continue;
            };
            match stats.get(i).cloned().flatten() {
                Some(stat) => listener.on_stat(target, &stat).await,
                None => listener.on_failure(target).await,
            }
        }
    }
}
