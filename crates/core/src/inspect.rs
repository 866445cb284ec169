use serde::Deserialize;
use serde::Serialize;

use crate::ddll::Mode;
use crate::error::Result;
use crate::finger::Direction;
use crate::finger::FTEntry;
use crate::finger::FingerTables;
use crate::manager::NodeManager;
use crate::node::RingNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerInspect {
    pub endpoint: String,
    pub nodes: Vec<NodeInspect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInspect {
    pub link: String,
    pub mode: Mode,
    #[serde(default)]
    pub left: Option<String>,
    pub left_seq: String,
    #[serde(default)]
    pub right: Option<String>,
    pub right_seq: String,
    pub ref_count: u32,
    pub neighbors: Vec<String>,
    pub forward: Vec<EntryInspect>,
    pub backward: Vec<EntryInspect>,
    pub reverse_pointers: Vec<String>,
    pub update_cycles: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInspect {
    pub index: usize,
    pub primary: String,
    pub backups: Vec<String>,
}

impl ManagerInspect {
    pub fn inspect(manager: &NodeManager) -> Self {
        let mut nodes: Vec<NodeInspect> = manager
            .nodes()
            .iter()
            .filter_map(|n| NodeInspect::inspect(n).ok())
            .collect();
        nodes.sort_by(|a, b| a.link.cmp(&b.link));
        Self {
            endpoint: manager.endpoint().to_string(),
            nodes,
        }
    }
}

impl NodeInspect {
    pub fn inspect(node: &RingNode) -> Result<Self> {
        let (mode, left, left_seq, right, right_seq, ref_count, neighbors) = {
            let s = node.ddll().read_state()?;
            (
                s.mode,
                s.left.as_ref().map(|l| l.to_string()),
                s.left_seq.to_string(),
                s.right.as_ref().map(|l| l.to_string()),
                s.right_seq.to_string(),
                s.ref_count,
                s.neighbors
                    .neighbors()
                    .iter()
                    .map(|l| l.to_string())
                    .collect(),
            )
        };

        let (forward, backward, mut reverse_pointers) = {
            let ft = node.suzaku().read_fingers()?;
            (
                inspect_table(&ft, Direction::Forward),
                inspect_table(&ft, Direction::Backward),
                ft.reverse_pointers()
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>(),
            )
        };
        reverse_pointers.sort();

        Ok(Self {
            link: node.me().to_string(),
            mode,
            left,
            left_seq,
            right,
            right_seq,
            ref_count,
            neighbors,
            forward,
            backward,
            reverse_pointers,
            update_cycles: node.suzaku().cycles(),
        })
    }
}

fn inspect_table(ft: &FingerTables, dir: Direction) -> Vec<EntryInspect> {
    ft.table(dir)
        .map(|t| t.stream().map(|(i, e)| inspect_entry(i, e)).collect())
        .unwrap_or_default()
}

fn inspect_entry(index: usize, entry: &FTEntry) -> EntryInspect {
    EntryInspect {
        index,
        primary: entry.primary.to_string(),
        backups: entry.backups.iter().map(|b| b.to_string()).collect(),
    }
}
