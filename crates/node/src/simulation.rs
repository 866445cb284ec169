//! A ring of simulated nodes on an in-process network.
//!
//! Every node gets its own endpoint on a [DummyNetwork]. A run builds the ring,
//! drives finger-table update rounds, crashes some nodes, waits for the ring to
//! close around them, and finally measures lookups against the owners expected
//! from the surviving key set.
use std::sync::Arc;
use std::time::Duration;

use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use suzaku_core::inspect::NodeInspect;
use suzaku_core::Link;
use suzaku_core::NodeConfig;
use suzaku_core::NodeManager;
use suzaku_core::RingKey;
use suzaku_core::RingNode;
use suzaku_transport::connections::DummyNetwork;
use suzaku_transport::SharedScheduler;
use suzaku_transport::TokioScheduler;

use crate::config::Config;
use crate::config::SimulationConfig;
use crate::error::Result;

/// Pause after each join so one-way messages land before the next join.
const JOIN_SETTLE: Duration = Duration::from_millis(50);

/// Outcome of [Simulation::run].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub joined: usize,
    pub crashed: Vec<String>,
    pub alive: usize,
    /// Every survivor's right neighbor is its key-order successor, and the same for left.
    pub ring_consistent: bool,
    pub lookups: usize,
    pub succeeded: usize,
    /// Lookups that completed but named another owner than expected.
    pub wrong_owner: usize,
    pub failed: usize,
    pub mean_hops: f64,
}

impl SimulationReport {
    pub fn success_rate(&self) -> f64 {
        if self.lookups == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.lookups as f64
    }
}

pub struct Simulation {
    settings: SimulationConfig,
    node_config: NodeConfig,
    network: Arc<DummyNetwork>,
    scheduler: SharedScheduler,
    managers: Vec<Arc<NodeManager>>,
    /// Live members in key order.
    nodes: Vec<Arc<RingNode>>,
    crashed: Vec<Link>,
}

impl Simulation {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let settings = config.simulation.clone();
        let network = DummyNetwork::with_delay(settings.min_latency_ms, settings.max_latency_ms);
        Ok(Self {
            settings,
            node_config: config.node.clone(),
            network,
            scheduler: Arc::new(TokioScheduler::new()),
            managers: vec![],
            nodes: vec![],
            crashed: vec![],
        })
    }

    pub fn nodes(&self) -> &[Arc<RingNode>] {
        &self.nodes
    }

    /// Every node crashed so far.
    pub fn crashed(&self) -> &[Link] {
        &self.crashed
    }

    /// Build, update, crash, repair and measure.
    pub async fn run(config: &Config) -> Result<(Self, SimulationReport)> {
        let mut sim = Self::new(config)?;
        let joined = sim.build().await?;
        sim.update_rounds(sim.settings.rounds).await;
        let crashed = sim.crash(sim.settings.failures);
        if !crashed.is_empty() {
            sim.wait_repair().await;
        }

        let mut report = sim.lookups(sim.settings.lookups).await;
        report.joined = joined;
        report.crashed = crashed.iter().map(ToString::to_string).collect();
        report.alive = sim.nodes.len();
        report.ring_consistent = sim.is_consistent()?;
        tracing::info!(
            "{} of {} lookups succeeded ({:.1}%), mean hops {:.2}, ring consistent: {}",
            report.succeeded,
            report.lookups,
            report.success_rate() * 100.0,
            report.mean_hops,
            report.ring_consistent
        );
        Ok((sim, report))
    }

    /// Insert `nodes` distinct random keys through the first node. Returns how many joined.
    pub async fn build(&mut self) -> Result<usize> {
        let keys: Vec<u64> = {
            let mut rng = rand::thread_rng();
            sample(
                &mut rng,
                self.settings.key_space as usize,
                self.settings.nodes,
            )
            .into_iter()
            .map(|k| k as u64)
            .collect()
        };

        for (i, k) in keys.into_iter().enumerate() {
            let transport = Arc::new(self.network.transport(format!("node-{i}")));
            let manager =
                NodeManager::new(transport, self.scheduler.clone(), self.node_config.clone())?;
            let node = manager.create_node(RingKey::new(k as i64))?;

            let joined = match self.nodes.first() {
                None => {
                    node.insert_as_initial().await?;
                    true
                }
                Some(introducer) => node.insert(introducer.me()).await?,
            };
            if !joined {
                tracing::warn!("{} gave up joining", node.me());
                manager.shutdown();
                continue;
            }
            tracing::debug!("{} joined", node.me());
            self.managers.push(manager);
            self.nodes.push(node);
            tokio::time::sleep(JOIN_SETTLE).await;
        }
        self.nodes.sort_by(|a, b| a.me().key.cmp(&b.me().key));
        tracing::info!("Ring built with {} nodes", self.nodes.len());
        Ok(self.nodes.len())
    }

    /// Run `rounds` update passes on every live node, in key order.
    pub async fn update_rounds(&self, rounds: usize) {
        for round in 0..rounds {
            for node in &self.nodes {
                if let Err(e) = node.suzaku().update_pass().await {
                    tracing::warn!("Update pass of {} failed: {e}", node.me());
                }
            }
            tracing::info!("Update round {} finished", round + 1);
        }
    }

    /// Crash-stop `count` random live nodes.
    pub fn crash(&mut self, count: usize) -> Vec<Link> {
        let victims: Vec<Link> = {
            let mut rng = rand::thread_rng();
            self.nodes
                .choose_multiple(&mut rng, count)
                .map(|n| n.me().clone())
                .collect()
        };
        for link in &victims {
            tracing::info!("Crashing {}", link);
            self.network.kill(&link.endpoint);
        }
        self.nodes.retain(|n| !victims.contains(n.me()));
        self.crashed.extend(victims.iter().cloned());
        victims
    }

    /// Poll until the survivors form a consistent ring or the repair budget runs out.
    pub async fn wait_repair(&self) -> bool {
        let step = Duration::from_millis(self.node_config.ddll.ping_period_ms.max(1));
        let budget = Duration::from_millis(self.settings.repair_wait_ms);
        let mut waited = Duration::ZERO;
        loop {
            if matches!(self.is_consistent(), Ok(true)) {
                tracing::info!("Ring repaired after {:?}", waited);
                return true;
            }
            if waited >= budget {
                tracing::warn!("Ring still broken after {:?}", waited);
                return false;
            }
            tokio::time::sleep(step).await;
            waited += step;
        }
    }

    /// Whether every live node's neighbors are its key-order neighbors.
    pub fn is_consistent(&self) -> Result<bool> {
        let n = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            let right = self.nodes[(i + 1) % n].me();
            let left = self.nodes[(i + n - 1) % n].me();
            if node.ddll().right()?.as_ref() != Some(right)
                || node.ddll().left()?.as_ref() != Some(left)
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The node expected to own `key`: the first live node at or after it, wrapping around.
    pub fn expected_owner(&self, key: &RingKey) -> Option<&Link> {
        self.nodes
            .iter()
            .map(|n| n.me())
            .find(|l| l.key >= *key)
            .or_else(|| self.nodes.first().map(|n| n.me()))
    }

    /// Look up `count` random keys, each from a random live node.
    pub async fn lookups(&self, count: usize) -> SimulationReport {
        let mut report = SimulationReport {
            lookups: count,
            ..Default::default()
        };
        if self.nodes.is_empty() {
            report.failed = count;
            return report;
        }

        let mut total_hops = 0u64;
        for _ in 0..count {
            let (origin, key) = {
                let mut rng = rand::thread_rng();
                let origin = self.nodes[rng.gen_range(0..self.nodes.len())].clone();
                let key = RingKey::search(rng.gen_range(0..self.settings.key_space) as i64);
                (origin, key)
            };
            let expected = self.expected_owner(&key).cloned();
            match origin.lookup(&key).await {
                Ok(result) if Some(&result.owner) == expected.as_ref() => {
                    report.succeeded += 1;
                    total_hops += result.hops as u64;
                }
                Ok(result) => {
                    tracing::warn!(
                        "Lookup of {} from {} resolved to {}, expected {:?}",
                        key,
                        origin.me(),
                        result.owner,
                        expected
                    );
                    report.wrong_owner += 1;
                }
                Err(e) => {
                    tracing::warn!("Lookup of {} from {} failed: {e}", key, origin.me());
                    report.failed += 1;
                }
            }
        }
        if report.succeeded > 0 {
            report.mean_hops = total_hops as f64 / report.succeeded as f64;
        }
        report
    }

    /// Snapshots of every live node.
    pub fn inspect(&self) -> Result<Vec<NodeInspect>> {
        Ok(self
            .nodes
            .iter()
            .map(|n| NodeInspect::inspect(n))
            .collect::<suzaku_core::Result<Vec<_>>>()?)
    }

    pub fn shutdown(&self) {
        for manager in &self.managers {
            manager.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn quick_config(nodes: usize, failures: usize, lookups: usize) -> Config {
        let mut config = Config::default();
        config.node.ddll.set_r_timeout_ms = 300;
        config.node.ddll.get_stat_timeout_ms = 200;
        config.node.ddll.find_nearest_timeout_ms = 200;
        config.node.ddll.grace_timeout_ms = 500;
        config.node.ddll.ping_period_ms = 500;
        config.node.ddll.min_fix_interval_ms = 0;
        config.node.ddll.retry_backoff_ms = 20;
        config.node.suzaku.update_delay_ms = 3_600_000;
        config.node.suzaku.update_period_ms = 3_600_000;
        config.node.suzaku.rpc_timeout_ms = 200;
        config.node.suzaku.lookup_hop_timeout_ms = 200;
        config.node.suzaku.lookup_timeout_ms = 5_000;
        config.simulation.nodes = nodes;
        config.simulation.failures = failures;
        config.simulation.lookups = lookups;
        config.simulation.rounds = 2;
        config.simulation.key_space = 1000;
        config.simulation.min_latency_ms = 0;
        config.simulation.max_latency_ms = 0;
        config.simulation.repair_wait_ms = 10_000;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_without_failures() -> Result<()> {
        let (sim, report) = Simulation::run(&quick_config(6, 0, 20)).await?;

        assert_eq!(report.joined, 6);
        assert_eq!(report.alive, 6);
        assert!(report.crashed.is_empty());
        assert!(report.ring_consistent);
        assert_eq!(report.succeeded, 20);
        assert_eq!(report.success_rate(), 1.0);

        let inspect = sim.inspect()?;
        assert_eq!(inspect.len(), 6);
        assert!(inspect.iter().all(|n| n.update_cycles >= 2));

        // keys past the largest node belong to the smallest one
        let past_end = RingKey::search(1000);
        assert_eq!(sim.expected_owner(&past_end), Some(sim.nodes()[0].me()));

        sim.shutdown();
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_repairs_around_crash() -> Result<()> {
        let (sim, report) = Simulation::run(&quick_config(6, 1, 10)).await?;

        assert_eq!(report.crashed.len(), 1);
        assert_eq!(report.alive, 5);
        assert!(report.ring_consistent);
        assert_eq!(sim.nodes().len(), 5);
        assert!(!sim.nodes().iter().any(|n| sim.crashed().contains(n.me())));

        sim.shutdown();
        Ok(())
    }

    #[test]
    fn test_rejects_too_many_failures() {
        let config = quick_config(3, 3, 0);
        assert!(matches!(
            Simulation::new(&config),
            Err(Error::InvalidSimulation(_))
        ));
    }
}
