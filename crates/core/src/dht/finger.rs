#![warn(missing_docs)]
use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Identifier;
use crate::dht::IdentifierSpace;
use crate::dht::NodeDescriptor;
use crate::error::Error;
use crate::error::Result;

/// Finger table of Chord DHT.
///
/// Entry `k` (0-based) is the node owning `(id + 2^k) mod 2^bits` as of its last refresh.
/// Entries may be stale; routing only uses them as shortcuts that are strictly closer to
/// the target than the owning node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FingerTable {
    id: Identifier,
    space: IdentifierSpace,
    finger: Vec<Option<NodeDescriptor>>,
    #[serde(skip)]
    pub(super) fix_finger_index: usize,
    /// No entry changed or failed since the rotation last passed index 0.
    #[serde(skip)]
    rotation_settled: bool,
}

impl FingerTable {
    /// builder
    pub fn new(id: Identifier, space: IdentifierSpace) -> Self {
        let size = space.bits() as usize;
        Self {
            id,
            space,
            finger: vec![None; size],
            fix_finger_index: 0,
            rotation_settled: false,
        }
    }

    /// Number of entries, equals the width of the identifier space.
    pub fn size(&self) -> usize {
        self.finger.len()
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// get length of finger
    pub fn len(&self) -> usize {
        self.finger.iter().flatten().count()
    }

    /// Get first element from Finger Table
    pub fn first(&self) -> Option<NodeDescriptor> {
        self.finger.iter().flatten().next().cloned()
    }

    /// Identifier that entry `index` is responsible for.
    pub fn start(&self, index: usize) -> Result<Identifier> {
        self.check_index(index)?;
        Ok(self.space.finger_start(self.id, index))
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<&NodeDescriptor> {
        self.finger.get(index).and_then(|x| x.as_ref())
    }

    /// Set entry `index`, returns `true` if the entry changed.
    ///
    /// The node itself is a valid entry: it means no other node owns the start of that finger.
    pub fn set(&mut self, index: usize, node: NodeDescriptor) -> Result<bool> {
        self.check_index(index)?;
        if self.finger[index].as_ref() == Some(&node) {
            return Ok(false);
        }
        tracing::debug!("set finger table index: {} node: {}", index, node);
        self.finger[index] = Some(node);
        Ok(true)
    }

    /// Rotate the fix index and return the entry to refresh next.
    pub fn next_fix_index(&mut self) -> usize {
        let index = self.fix_finger_index;
        self.fix_finger_index = (self.fix_finger_index + 1) % self.size();
        index
    }

    /// Record the refresh of entry `index` in rotation, `settled` being `false` if the
    /// entry changed or its lookup failed.
    ///
    /// Returns `true` when `index` closes a rotation that started at entry 0 and left
    /// every entry settled.
    pub fn record_fix(&mut self, index: usize, settled: bool) -> bool {
        if index == 0 {
            self.rotation_settled = true;
        }
        self.rotation_settled &= settled;
        index + 1 == self.size() && self.rotation_settled
    }

    /// remove a node from dht finger table
    ///
    /// The entries pointing at the removed node are filled with the entry following the
    /// last of them, which is the next known node clockwise. If there is none, they are
    /// cleared.
    pub fn remove(&mut self, id: Identifier) {
        let indexes: Vec<usize> = self
            .finger
            .iter()
            .enumerate()
            .filter(|(_, x)| x.as_ref().map(|n| n.id) == Some(id))
            .map(|(idx, _)| idx)
            .collect();

        let (Some(first_idx), Some(last_idx)) = (indexes.first(), indexes.last()) else {
            return;
        };
        let end_idx = last_idx + 1;
        let fix = self.finger.get(end_idx).cloned().flatten();

        for idx in *first_idx..end_idx {
            if self.finger[idx].as_ref().map(|n| n.id) == Some(id) {
                self.finger[idx] = fix.clone();
            }
        }
    }

    /// Learn about `node` without a lookup.
    ///
    /// Every entry whose start is not after `node`, and whose current value is further
    /// away than `node`, is replaced by it.
    pub fn join(&mut self, node: &NodeDescriptor) {
        if node.id == self.id {
            return;
        }
        let bias = self.space.distance(self.id, node.id);

        for k in 0..self.size() {
            // size is at most 64, so the shift never overflows
            let pos = 1u64 << k;
            if bias < pos {
                continue;
            }

            if let Some(v) = &self.finger[k] {
                if v.id != self.id && bias >= self.space.distance(self.id, v.id) {
                    continue;
                }
            }

            self.finger[k] = Some(node.clone());
        }
    }

    /// Check finger is contains some node
    pub fn contains(&self, id: Identifier) -> bool {
        self.finger.iter().flatten().any(|n| n.id == id)
    }

    /// get closest predecessor
    ///
    /// Scan from the farthest entry down to the nearest one and return the first whose
    /// identifier is strictly between this node and `target`.
    pub fn closest_predecessor(&self, target: Identifier) -> Option<&NodeDescriptor> {
        self.finger
            .iter()
            .rev()
            .flatten()
            .find(|n| self.space.is_strictly_between(self.id, n.id, target))
    }

    /// get finger list
    pub fn list(&self) -> &Vec<Option<NodeDescriptor>> {
        &self.finger
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.finger.len() {
            return Err(Error::FingerIndexOutOfRange {
                index,
                size: self.finger.len(),
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn reset_finger(&mut self) {
        self.finger = vec![None; self.size()]
    }
}

impl Index<usize> for FingerTable {
    type Output = Option<NodeDescriptor>;
    fn index(&self, index: usize) -> &Self::Output {
        self.finger.get(index).unwrap_or(&None)
    }
}
