//! YAML configuration of the `suzaku` tool.
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use suzaku_core::NodeConfig;

use crate::error::Error;
use crate::error::Result;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

pub const DEFAULT_CONFIG_LOCATION: &str = "~/.suzaku/config.yaml";
pub const DEFAULT_SIMULATION_NODES: usize = 16;
pub const DEFAULT_SIMULATION_ROUNDS: usize = 3;
pub const DEFAULT_SIMULATION_LOOKUPS: usize = 100;
pub const DEFAULT_KEY_SPACE: u64 = 1 << 20;
pub const DEFAULT_MIN_LATENCY_MS: u64 = 1;
pub const DEFAULT_MAX_LATENCY_MS: u64 = 20;
pub const DEFAULT_REPAIR_WAIT_MS: u64 = 20_000;

/// Shape of a simulated run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub nodes: usize,
    /// Update passes every node runs before failures are injected.
    pub rounds: usize,
    pub lookups: usize,
    pub failures: usize,
    /// Node keys are drawn without repetition from `0..key_space`.
    pub key_space: u64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// How long crashed nodes get to be repaired around.
    pub repair_wait_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: DEFAULT_SIMULATION_NODES,
            rounds: DEFAULT_SIMULATION_ROUNDS,
            lookups: DEFAULT_SIMULATION_LOOKUPS,
            failures: 0,
            key_space: DEFAULT_KEY_SPACE,
            min_latency_ms: DEFAULT_MIN_LATENCY_MS,
            max_latency_ms: DEFAULT_MAX_LATENCY_MS,
            repair_wait_ms: DEFAULT_REPAIR_WAIT_MS,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(Error::InvalidSimulation("nodes must be positive".into()));
        }
        if self.failures >= self.nodes {
            return Err(Error::InvalidSimulation(format!(
                "failures ({}) must leave at least one of {} nodes alive",
                self.failures, self.nodes
            )));
        }
        if (self.nodes as u64) > self.key_space {
            return Err(Error::InvalidSimulation(format!(
                "key_space {} cannot hold {} distinct keys",
                self.key_space, self.nodes
            )));
        }
        if self.min_latency_ms > self.max_latency_ms {
            return Err(Error::InvalidSimulation(
                "min_latency_ms exceeds max_latency_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// When there is no `node` section in the YAML file,
    /// every protocol setting takes its default.
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.simulation.validate()
    }

    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self)?;
        path.to_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::InvalidPath(path.to_string_lossy().into_owned()))
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        let config: Config = serde_yaml::from_reader(f_rdr)?;
        config.validate()?;
        Ok(config)
    }
}
