//! Chord algorithm implement.
#![warn(missing_docs)]
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use super::types::Chord;
use super::types::ChordStorage;
use super::FingerTable;
use crate::dht::Identifier;
use crate::dht::IdentifierSpace;
use crate::dht::NodeDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::storage::KvStorageInterface;
use crate::storage::MemStorage;

/// `RingStorage` is the type accepted by `PeerRing::new_with_storage`.
/// It keeps the values of the identifiers a node owns.
pub type RingStorage = Box<dyn KvStorageInterface<Identifier, Bytes> + Send + Sync>;

/// PeerRing is the ring state owned by one node.
/// All nodes form a clockwise ring in the order of their [Identifier].
/// PeerRing implemented [Chord] algorithm.
/// PeerRing implemented [ChordStorage] protocol.
///
/// Other nodes never write these fields directly. They send a message and the owning
/// node applies it through [Chord::notify] or [Chord::update_successor].
pub struct PeerRing {
    /// The descriptor of current node.
    pub descriptor: NodeDescriptor,
    /// Identifier space shared by every member of the ring.
    pub space: IdentifierSpace,
    /// [FingerTable] help node to find successor quickly.
    pub finger: Mutex<FingerTable>,
    /// The next node on the ring.
    pub successor: Mutex<NodeDescriptor>,
    /// The previous node on the ring.
    pub predecessor: Mutex<Option<NodeDescriptor>>,
    /// Local storage for [ChordStorage].
    pub storage: RingStorage,
    progress: Mutex<Progress>,
}

/// Lifecycle of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Created, still a ring of its own.
    Unjoined,
    /// Has a successor and predecessor, finger table not refreshed yet.
    Attached,
    /// Maintenance is running and still changing state.
    Converging,
    /// The last stabilize round changed nothing, the successor acknowledges this node as
    /// its predecessor, and the last full finger refresh changed no entry.
    Stable,
}

#[derive(Debug)]
struct Progress {
    status: NodeStatus,
    fingers_settled: bool,
}

/// Type alias is just for making the code easy to read.
type Target = NodeDescriptor;

/// `PeerRing` use this to describe the result of [Chord] algorithm. Sometimes it's a
/// direct result, sometimes it's an action that is continued externally.
#[derive(Clone, Debug, PartialEq)]
pub enum RingAction {
    /// No result, the whole manipulation is done internally.
    None,
    /// Found some node.
    Some(NodeDescriptor),
    /// Trigger a remote action.
    RemoteAction(Target, RemoteAction),
    /// Trigger multiple remote actions.
    MultiActions(Vec<RingAction>),
}

/// Some of the process needs to be done by another node, or by a lookup started from
/// this one. This enum is used to describe that.
///
/// To avoid ambiguity, in the following comments, `node_a` is the target declared in
/// [RingAction]. Other values are the fields declared in this [RemoteAction].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteAction {
    /// Need `node_a` to continue looking up the owner of the identifier.
    FindSuccessor(Identifier),
    /// Look up the owner of the identifier, then store it in finger entry `index`.
    FindSuccessorForFix {
        /// entry of the finger table
        index: usize,
        /// start of that entry
        start: Identifier,
    },
    /// Let `node_a` [notify](Chord::notify) the candidate.
    Notify(NodeDescriptor),
    /// Let `node_a` [update its successor](Chord::update_successor) with the candidate.
    UpdateSuccessor(NodeDescriptor),
}

impl RingAction {
    /// Flatten into a list of single actions, dropping [RingAction::None].
    pub fn into_actions(self) -> Vec<RingAction> {
        match self {
            Self::None => vec![],
            Self::MultiActions(acts) => acts
                .into_iter()
                .flat_map(RingAction::into_actions)
                .collect(),
            act => vec![act],
        }
    }
}

impl From<Vec<RingAction>> for RingAction {
    fn from(acts: Vec<RingAction>) -> Self {
        if !acts.is_empty() {
            Self::MultiActions(acts)
        } else {
            Self::None
        }
    }
}

impl PeerRing {
    /// Create the state of a detached node: a ring of its own.
    pub fn new(descriptor: NodeDescriptor, space: IdentifierSpace) -> Result<Self> {
        Self::new_with_storage(descriptor, space, Box::new(MemStorage::new()))
    }

    /// Same as new, but with a given storage.
    pub fn new_with_storage(
        descriptor: NodeDescriptor,
        space: IdentifierSpace,
        storage: RingStorage,
    ) -> Result<Self> {
        space.identifier(descriptor.id.value())?;
        Ok(Self {
            finger: Mutex::new(FingerTable::new(descriptor.id, space)),
            successor: Mutex::new(descriptor.clone()),
            predecessor: Mutex::new(Some(descriptor.clone())),
            progress: Mutex::new(Progress {
                status: NodeStatus::Unjoined,
                fingers_settled: false,
            }),
            storage,
            space,
            descriptor,
        })
    }

    /// Identifier of current node.
    pub fn id(&self) -> Identifier {
        self.descriptor.id
    }

    /// Lock and return MutexGuard of finger table.
    pub fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of successor.
    pub fn lock_successor(&self) -> Result<MutexGuard<NodeDescriptor>> {
        self.successor.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of predecessor.
    pub fn lock_predecessor(&self) -> Result<MutexGuard<Option<NodeDescriptor>>> {
        self.predecessor.lock().map_err(|_| Error::DHTSyncLockError)
    }

    fn lock_progress(&self) -> Result<MutexGuard<Progress>> {
        self.progress.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Current successor.
    pub fn successor(&self) -> Result<NodeDescriptor> {
        Ok(self.lock_successor()?.clone())
    }

    /// Current predecessor.
    pub fn predecessor(&self) -> Result<Option<NodeDescriptor>> {
        Ok(self.lock_predecessor()?.clone())
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Result<NodeStatus> {
        Ok(self.lock_progress()?.status)
    }

    /// Become the only member of a new ring.
    pub fn join_alone(&self) -> Result<()> {
        *self.lock_successor()? = self.descriptor.clone();
        *self.lock_predecessor()? = Some(self.descriptor.clone());
        self.lock_progress()?.status = NodeStatus::Attached;
        tracing::info!("{} started a new ring", self.descriptor);
        Ok(())
    }

    /// Remove a node from finger table and predecessor, used when it can't be reached.
    /// The successor is kept, it is repaired by stabilization only.
    pub fn remove(&self, id: Identifier) -> Result<()> {
        self.lock_finger()?.remove(id);
        let mut predecessor = self.lock_predecessor()?;
        if predecessor.as_ref().map(|p| p.id) == Some(id) {
            *predecessor = None;
        }
        Ok(())
    }

    /// Store the result of a finger lookup, returns `true` if the entry changed.
    pub fn set_finger(&self, index: usize, node: NodeDescriptor) -> Result<bool> {
        self.lock_finger()?.set(index, node)
    }

    /// Refresh only the next finger in rotation.
    /// According to the paper, only one finger should be fixed at a time.
    pub fn fix_next_finger(&self) -> Result<RingAction> {
        let mut finger = self.lock_finger()?;
        let index = finger.next_fix_index();
        let start = finger.start(index)?;
        Ok(RingAction::RemoteAction(
            self.descriptor.clone(),
            RemoteAction::FindSuccessorForFix { index, start },
        ))
    }

    /// Record the refresh of one finger in rotation, returns `true` once a whole rotation
    /// went by without a change or a failed lookup.
    pub fn record_fix_rotation(&self, index: usize, settled: bool) -> Result<bool> {
        Ok(self.lock_finger()?.record_fix(index, settled))
    }

    /// Record the outcome of a finger refresh.
    ///
    /// `complete` is `true` when every entry was looked up successfully.
    pub fn record_fix_fingers(&self, changed: bool, complete: bool) -> Result<()> {
        let mut progress = self.lock_progress()?;
        if changed {
            progress.fingers_settled = false;
        } else if complete {
            progress.fingers_settled = true;
        }
        progress.status = match progress.status {
            NodeStatus::Unjoined => NodeStatus::Unjoined,
            NodeStatus::Stable if !changed => NodeStatus::Stable,
            _ => NodeStatus::Converging,
        };
        Ok(())
    }

    fn unsettle(&self) -> Result<()> {
        let mut progress = self.lock_progress()?;
        progress.fingers_settled = false;
        if progress.status == NodeStatus::Stable {
            progress.status = NodeStatus::Converging;
        }
        Ok(())
    }

    fn learn(&self, node: &NodeDescriptor) -> Result<()> {
        self.lock_finger()?.join(node);
        Ok(())
    }
}

impl Chord<RingAction> for PeerRing {
    /// Splice current node in front of `successor`.
    ///
    /// The returned actions ask the successor to adopt us as predecessor and the old
    /// predecessor to adopt us as successor. Both peers apply them to their own state.
    fn join(
        &self,
        successor: NodeDescriptor,
        predecessor: Option<NodeDescriptor>,
    ) -> Result<RingAction> {
        if successor.id == self.id() {
            return Err(Error::IdentifierCollision(self.id().value()));
        }
        self.learn(&successor)?;
        if let Some(p) = &predecessor {
            self.learn(p)?;
        }

        *self.lock_successor()? = successor.clone();
        *self.lock_predecessor()? = predecessor.clone();
        {
            let mut progress = self.lock_progress()?;
            progress.status = NodeStatus::Attached;
            progress.fingers_settled = false;
        }
        tracing::info!(
            "{} attached, successor: {}, predecessor: {:?}",
            self.descriptor,
            successor,
            predecessor
        );

        let mut acts = vec![RingAction::RemoteAction(
            successor,
            RemoteAction::Notify(self.descriptor.clone()),
        )];
        if let Some(p) = predecessor {
            if p.id != self.id() {
                acts.push(RingAction::RemoteAction(
                    p,
                    RemoteAction::UpdateSuccessor(self.descriptor.clone()),
                ));
            }
        }
        Ok(acts.into())
    }

    /// Find the successor of an identifier.
    /// May return a remote action for the successor is recorded in another node.
    fn find_successor(&self, id: Identifier) -> Result<RingAction> {
        let successor = self.successor()?;

        let succ = if self
            .space
            .is_between_right_inclusive(self.id(), id, successor.id)
        {
            // The id is in (self, successor], so successor owns it.
            RingAction::Some(successor.clone())
        } else {
            let closest = self.closest_preceding_node(id)?;
            if closest.id == self.id() {
                // No finger gets closer, hand the query to the immediate successor.
                RingAction::RemoteAction(successor.clone(), RemoteAction::FindSuccessor(id))
            } else {
                RingAction::RemoteAction(closest, RemoteAction::FindSuccessor(id))
            }
        };

        tracing::debug!(
            "find_successor: self: {}, id: {}, successor: {}, result: {:?}",
            self.descriptor,
            id,
            successor,
            succ
        );

        Ok(succ)
    }

    fn closest_preceding_node(&self, id: Identifier) -> Result<NodeDescriptor> {
        let finger = self.lock_finger()?;
        Ok(finger
            .closest_predecessor(id)
            .cloned()
            .unwrap_or_else(|| self.descriptor.clone()))
    }

    /// If the candidate is closer to current node than the predecessor, or current node
    /// has no predecessor, adopt it.
    fn notify(&self, candidate: NodeDescriptor) -> Result<bool> {
        if candidate.id == self.id() {
            return Ok(false);
        }
        self.learn(&candidate)?;

        let adopted = {
            let mut predecessor = self.lock_predecessor()?;
            let adopt = match &*predecessor {
                Some(pre) => self.space.is_strictly_between(pre.id, candidate.id, self.id()),
                None => true,
            };
            if adopt {
                tracing::info!(
                    "{} adopts predecessor {} (was {:?})",
                    self.descriptor,
                    candidate,
                    *predecessor
                );
                *predecessor = Some(candidate);
            }
            adopt
        };

        if adopted {
            self.unsettle()?;
        }
        Ok(adopted)
    }

    /// If the candidate is between current node and the successor, adopt it.
    fn update_successor(&self, candidate: NodeDescriptor) -> Result<bool> {
        if candidate.id == self.id() {
            return Ok(false);
        }
        self.learn(&candidate)?;

        let adopted = {
            let mut successor = self.lock_successor()?;
            let adopt = self
                .space
                .is_strictly_between(self.id(), candidate.id, successor.id);
            if adopt {
                tracing::info!(
                    "{} adopts successor {} (was {})",
                    self.descriptor,
                    candidate,
                    *successor
                );
                *successor = candidate;
            }
            adopt
        };

        if adopted {
            self.unsettle()?;
        }
        Ok(adopted)
    }

    /// The node checks whether the predecessor of its successor is an improved successor.
    /// If so it adopts it. Whether or not there is an improved successor, the node
    /// notifies its successor of its own identity.
    fn stabilize(&self, successor_predecessor: Option<NodeDescriptor>) -> Result<RingAction> {
        let acknowledged = successor_predecessor.as_ref().map(|x| x.id) == Some(self.id());

        let (successor, changed) = {
            let mut successor = self.lock_successor()?;
            let changed = match &successor_predecessor {
                Some(x) => {
                    x.id != self.id()
                        && self.space.is_strictly_between(self.id(), x.id, successor.id)
                }
                None => false,
            };
            if let (true, Some(x)) = (changed, successor_predecessor) {
                tracing::info!(
                    "{} stabilize: successor {} -> {}",
                    self.descriptor,
                    *successor,
                    x
                );
                *successor = x;
            }
            (successor.clone(), changed)
        };

        if changed {
            self.learn(&successor)?;
            self.unsettle()?;
        } else {
            let mut progress = self.lock_progress()?;
            progress.status = match progress.status {
                NodeStatus::Unjoined => NodeStatus::Unjoined,
                _ if acknowledged && progress.fingers_settled => NodeStatus::Stable,
                _ => NodeStatus::Converging,
            };
        }

        Ok(RingAction::RemoteAction(
            successor,
            RemoteAction::Notify(self.descriptor.clone()),
        ))
    }

    /// Fix finger table by finding the successor for each finger.
    fn fix_fingers(&self) -> Result<RingAction> {
        let finger = self.lock_finger()?;
        let acts = (0..finger.size())
            .map(|index| {
                Ok(RingAction::RemoteAction(
                    self.descriptor.clone(),
                    RemoteAction::FindSuccessorForFix {
                        index,
                        start: finger.start(index)?,
                    },
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(acts.into())
    }
}

#[async_trait]
impl ChordStorage<RingAction> for PeerRing {
    fn owns(&self, id: Identifier) -> Result<bool> {
        Ok(match self.predecessor()? {
            Some(pre) => self.space.is_between_right_inclusive(pre.id, id, self.id()),
            None => true,
        })
    }

    async fn storage_put(&self, id: Identifier, value: Bytes) -> Result<()> {
        if !self.owns(id)? {
            tracing::debug!("{} stores {} outside of its arc", self.descriptor, id);
        }
        self.storage.put(&id, &value).await
    }

    async fn storage_get(&self, id: Identifier) -> Result<Option<Bytes>> {
        self.storage.get(&id).await
    }

    async fn storage_remove(&self, id: Identifier) -> Result<Option<Bytes>> {
        self.storage.remove(&id).await
    }

    async fn hand_off(&self, from: Identifier, to: Identifier) -> Result<Vec<(Identifier, Bytes)>> {
        let mut moved = vec![];
        for (id, _) in self.storage.get_all().await? {
            if !self.space.is_between_right_inclusive(from, id, to) {
                continue;
            }
            // take the latest value, a put may have raced with the scan
            if let Some(value) = self.storage.remove(&id).await? {
                moved.push((id, value));
            }
        }
        tracing::info!(
            "{} handed off {} entries in ({}, {}]",
            self.descriptor,
            moved.len(),
            from,
            to
        );
        Ok(moved)
    }
}
