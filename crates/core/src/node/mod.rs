#![warn(missing_docs)]
//! A ring node: the DDLL position plus its finger tables.
//!
//! [RingNode] composes a [DdllNode] and a [SuzakuStrategy]. The routing layer only
//! reads the ring position through [crate::ddll::RingView]. Drivers that wait for
//! replies live in the submodules: joining and leaving in [join], link repair in
//! [repair], and key lookup in [lookup].

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::sync::Weak;

use async_recursion::async_recursion;
use async_trait::async_trait;
use dashmap::DashMap;
use suzaku_transport::SharedScheduler;
use tokio::sync::oneshot;

use crate::config::NodeConfig;
use crate::ddll::DdllAction;
use crate::ddll::DdllNode;
use crate::error::Result;
use crate::message::PayloadSender;
use crate::message::Stat;
use crate::monitor::MonitorListener;
use crate::monitor::NodeMonitor;
use crate::ring::Link;
use crate::suzaku::SuzakuStrategy;

pub mod join;
pub mod lookup;
pub mod repair;

pub use lookup::LookupResult;

/// One logical node hosted by a [crate::manager::NodeManager].
pub struct RingNode {
    me: Link,
    ddll: Arc<DdllNode>,
    suzaku: Arc<SuzakuStrategy>,
    sender: Arc<dyn PayloadSender>,
    scheduler: SharedScheduler,
    config: NodeConfig,
    monitor: Arc<NodeMonitor>,
    pending_lookups: DashMap<u64, oneshot::Sender<LookupResult>>,
    lookup_seq: AtomicU64,
    this: Weak<RingNode>,
}

impl RingNode {
    /// Create a node in mode `Out`.
    pub fn new(
        me: Link,
        sender: Arc<dyn PayloadSender>,
        scheduler: SharedScheduler,
        config: NodeConfig,
        monitor: Arc<NodeMonitor>,
    ) -> Arc<Self> {
        let ddll = Arc::new(DdllNode::new(me.clone(), config.ddll.neighbor_set_size));
        let suzaku = Arc::new(SuzakuStrategy::new(
            ddll.clone(),
            sender.clone(),
            scheduler.clone(),
            config.suzaku.clone(),
        ));
        Arc::new_cyclic(|this| Self {
            me,
            ddll,
            suzaku,
            sender,
            scheduler,
            config,
            monitor,
            pending_lookups: DashMap::new(),
            lookup_seq: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    /// The link of this node.
    pub fn me(&self) -> &Link {
        &self.me
    }

    /// The ring position.
    pub fn ddll(&self) -> &Arc<DdllNode> {
        &self.ddll
    }

    /// The routing layer.
    pub fn suzaku(&self) -> &Arc<SuzakuStrategy> {
        &self.suzaku
    }

    /// Outbound messages.
    pub fn sender(&self) -> &Arc<dyn PayloadSender> {
        &self.sender
    }

    /// Settings of this node.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Run the follow-up work of a state transition.
    /// Send failures are logged only; the protocol recovers through its timeouts.
    #[async_recursion]
    pub async fn execute(&self, act: DdllAction) -> Result<()> {
        match act {
            DdllAction::None => Ok(()),
            DdllAction::Send(to, msg) => {
                if let Err(e) = self.sender.send_message(&self.me, &to, msg).await {
                    tracing::warn!("{} failed to send to {}: {e:?}", self.me, to);
                }
                Ok(())
            }
            DdllAction::LeftChanged { old, new } => {
                if let Some(old) = old {
                    self.monitor.unregister(&old, &self.me);
                }
                if new != self.me {
                    let listener: Weak<dyn MonitorListener> = self.this.clone();
                    self.monitor.register(&new, &self.me, listener);
                }
                Ok(())
            }
            DdllAction::RightChanged { .. } => self.suzaku.on_right_changed(),
            DdllAction::Departed => {
                self.suzaku.stop()?;
                self.monitor.unregister_all(&self.me);
                tracing::info!("{} departed", self.me);
                Ok(())
            }
            DdllAction::Fix => {
                let Some(this) = self.this.upgrade() else {
                    return Ok(());
                };
                tokio::spawn(async move {
                    if let Err(e) = this.fix().await {
                        tracing::error!("Repair of {} failed: {e:?}", this.me);
                    }
                });
                Ok(())
            }
            DdllAction::MultiActions(acts) => {
                // in order: replies go out before the notifications they enable
                for act in acts {
                    if let Err(e) = self.execute(act).await {
                        tracing::error!("Failed on handle multi actions: {e:?}");
                    }
                }
                Ok(())
            }
        }
    }

    /// Cancel every timer of this node.
    pub fn shutdown(&self) -> Result<()> {
        self.suzaku.stop()?;
        self.monitor.unregister_all(&self.me);
        Ok(())
    }
}

#[async_trait]
impl MonitorListener for RingNode {
    async fn on_stat(&self, target: &Link, stat: &Stat) {
        match self.ddll.left_stat_needs_fix(target, stat) {
            Ok(true) => {
                tracing::info!("{} sees inconsistent left {}: {:?}", self.me, target, stat);
                if let Err(e) = self.execute(DdllAction::Fix).await {
                    tracing::error!("{e:?}");
                }
            }
            Ok(false) => {}
            Err(e) => tracing::error!("{e:?}"),
        }
    }

    async fn on_failure(&self, target: &Link) {
        tracing::warn!("{} detected failure of {}", self.me, target);
        if let Err(e) = self.suzaku.remove_failed(target) {
            tracing::error!("{e:?}");
        }
        match self.ddll.left() {
            Ok(Some(left)) if left == *target => {
                if let Err(e) = self.execute(DdllAction::Fix).await {
                    tracing::error!("{e:?}");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!("{e:?}"),
        }
    }
}
