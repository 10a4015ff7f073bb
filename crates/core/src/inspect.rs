//! Serializable snapshots of ring state, for debugging and tests.
use serde::Deserialize;
use serde::Serialize;

use crate::dht::NodeStatus;
use crate::directory::RingDirectory;
use crate::node::RingNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingInspect {
    pub bits: u8,
    pub nodes: Vec<NodeInspect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInspect {
    pub id: u64,
    pub address: String,
    pub status: Option<NodeStatus>,
    pub successor: Option<u64>,
    #[serde(default)]
    pub predecessor: Option<u64>,
    /// Runs of equal entries: `(node, first index, last index)`.
    pub finger_table: Vec<(Option<u64>, u64, u64)>,
    pub keys: usize,
}

impl RingInspect {
    pub async fn inspect(directory: &RingDirectory) -> Self {
        let mut nodes = vec![];
        for node in directory.members() {
            nodes.push(NodeInspect::inspect(&node).await);
        }
        Self {
            bits: directory.space().bits(),
            nodes,
        }
    }

    /// Follow successor pointers from the first node until a node repeats.
    ///
    /// On a healthy ring the result lists every node exactly once, in ascending order
    /// starting from the lowest identifier.
    pub fn successor_cycle(&self) -> Vec<u64> {
        let Some(first) = self.nodes.first() else {
            return vec![];
        };
        let mut cycle = vec![first.id];
        let mut current = first;
        while let Some(next) = current
            .successor
            .and_then(|s| self.nodes.iter().find(|n| n.id == s))
        {
            if cycle.contains(&next.id) {
                break;
            }
            cycle.push(next.id);
            current = next;
        }
        cycle
    }
}

impl NodeInspect {
    pub async fn inspect(node: &RingNode) -> Self {
        let dht = node.dht();
        let successor = dht.successor().ok().map(|s| s.id.value());
        let predecessor = dht.predecessor().ok().flatten().map(|p| p.id.value());

        let finger_table = {
            dht.lock_finger()
                .map(|ft| {
                    let finger = ft
                        .list()
                        .iter()
                        .map(|x| x.as_ref().map(|n| n.id.value()));
                    compress_iter(finger)
                })
                .unwrap_or_default()
        };

        let keys = dht.storage.count().await.unwrap_or_default() as usize;

        Self {
            id: node.id().value(),
            address: node.descriptor().address.clone(),
            status: dht.status().ok(),
            successor,
            predecessor,
            finger_table,
            keys,
        }
    }

    /// Finger table entries expanded back to one per index.
    pub fn fingers(&self) -> Vec<Option<u64>> {
        self.finger_table
            .iter()
            .flat_map(|(node, start, end)| (*start..=*end).map(move |_| *node))
            .collect()
    }
}

pub fn compress_iter<T>(iter: impl Iterator<Item = T>) -> Vec<(T, u64, u64)>
where T: PartialEq {
    let mut result = vec![];
    let mut start = 0u64;
    let mut count = 0u64;
    let mut prev: Option<T> = None;

    for (i, x) in iter.enumerate() {
        match prev {
            Some(p) if p == x => {
                count += 1;
            }
            _ => {
                if let Some(p) = prev {
                    result.push((p, start, start + count - 1));
                }
                start = i as u64;
                count = 1;
            }
        }
        prev = Some(x);
    }

    if let Some(p) = prev {
        result.push((p, start, start + count - 1));
    }

    result
}
