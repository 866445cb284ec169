use std::sync::Arc;
use std::time::Duration;

use suzaku_transport::connections::DummyNetwork;
use suzaku_transport::SharedScheduler;
use suzaku_transport::TokioScheduler;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::manager::NodeManager;
use crate::node::RingNode;
use crate::ring::Link;
use crate::ring::RingKey;
use crate::ring::UniqueId;

mod test_failure;
mod test_finger;
mod test_manager;
mod test_ring;

/// Short timeouts, and update passes that only run when a test drives them.
pub fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.ddll.set_r_timeout_ms = 300;
    config.ddll.get_stat_timeout_ms = 200;
    config.ddll.find_nearest_timeout_ms = 200;
    config.ddll.grace_timeout_ms = 500;
    config.ddll.ping_period_ms = 500;
    config.ddll.min_fix_interval_ms = 0;
    config.ddll.retry_backoff_ms = 20;
    config.suzaku.update_delay_ms = 3_600_000;
    config.suzaku.update_period_ms = 3_600_000;
    config.suzaku.rpc_timeout_ms = 200;
    config.suzaku.lookup_hop_timeout_ms = 200;
    config.suzaku.lookup_timeout_ms = 5_000;
    config
}

/// `K = 2`, forward table only and immediate installs, so tables follow the Chord layout.
pub fn chord_config() -> NodeConfig {
    let mut config = test_config();
    config.suzaku.branching_bits = 1;
    config.suzaku.use_bft = false;
    config.suzaku.delayed_update = false;
    config.suzaku.zigzag_update = false;
    config.suzaku.copy_predecessor_table = false;
    config
}

pub fn key(v: i64) -> RingKey {
    RingKey::with_uid(v, UniqueId::new(v as u128))
}

pub fn prepare_manager(
    network: &Arc<DummyNetwork>,
    scheduler: &SharedScheduler,
    name: &str,
    config: NodeConfig,
) -> Result<Arc<NodeManager>> {
    let transport = Arc::new(network.transport(name));
    NodeManager::new(transport, scheduler.clone(), config)
}

/// Let in-flight one-way messages land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// A ring of nodes, one endpoint per node, kept in key order.
pub struct TestRing {
    pub network: Arc<DummyNetwork>,
    pub scheduler: SharedScheduler,
    pub config: NodeConfig,
    pub managers: Vec<Arc<NodeManager>>,
    pub nodes: Vec<Arc<RingNode>>,
}

impl TestRing {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            network: DummyNetwork::new(),
            scheduler: Arc::new(TokioScheduler::new()),
            config,
            managers: vec![],
            nodes: vec![],
        }
    }

    /// Build a ring by inserting `keys` one after another through the first node.
    pub async fn build(config: NodeConfig, keys: &[i64]) -> Result<Self> {
        let mut ring = Self::new(config);
        for k in keys {
            ring.join(*k).await?;
        }
        Ok(ring)
    }

    /// Add a node for `k` on a fresh endpoint and insert it.
    pub async fn join(&mut self, k: i64) -> Result<Arc<RingNode>> {
        let name = format!("node-{k}");
        let manager = prepare_manager(
            &self.network,
            &self.scheduler,
            &name,
            self.config.clone(),
        )?;
        let node = manager.create_node(key(k))?;
        match self.nodes.first() {
            None => node.insert_as_initial().await?,
            Some(introducer) => {
                let introducer = introducer.me().clone();
                assert!(node.insert(&introducer).await?);
            }
        }
        settle().await;

        self.managers.push(manager);
        self.nodes.push(node.clone());
        self.nodes.sort_by(|a, b| a.me().key.cmp(&b.me().key));
        Ok(node)
    }

    pub fn node(&self, k: i64) -> Arc<RingNode> {
        self.nodes
            .iter()
            .find(|n| n.me().key == key(k))
            .cloned()
            .expect("node not in ring")
    }

    pub fn link(&self, k: i64) -> Link {
        self.node(k).me().clone()
    }

    /// Crash-stop the endpoint hosting `k` and forget the node.
    pub fn kill(&mut self, k: i64) {
        let link = self.link(k);
        self.network.kill(&link.endpoint);
        self.nodes.retain(|n| *n.me() != link);
    }

    /// Run `rounds` update passes on every node, in key order.
    pub async fn update_rounds(&self, rounds: usize) -> Result<()> {
        for _ in 0..rounds {
            for node in &self.nodes {
                node.suzaku().update_pass().await?;
            }
            settle().await;
        }
        Ok(())
    }

    /// Every node points at its successor and predecessor in key order.
    pub fn assert_linked(&self) -> Result<()> {
        let n = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            let right = self.nodes[(i + 1) % n].me().clone();
            let left = self.nodes[(i + n - 1) % n].me().clone();
            assert_eq!(node.ddll().right()?, Some(right), "right of {}", node.me());
            assert_eq!(node.ddll().left()?, Some(left), "left of {}", node.me());
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        for manager in &self.managers {
            manager.shutdown();
        }
    }
}
