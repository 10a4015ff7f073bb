//! DHT types about `NodeDescriptor`, `Chord` and `ChordStorage`.
#![warn(missing_docs)]
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use super::id::Identifier;
use crate::error::Result;

/// Identity of a ring member as seen by its peers.
///
/// `address` is opaque routing information interpreted only by the
/// [Transport](crate::transport::Transport).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Position of the node on the ring.
    pub id: Identifier,
    /// Transport address of the node.
    pub address: String,
}

impl NodeDescriptor {
    /// Create a descriptor.
    pub fn new(id: Identifier, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

impl std::fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Chord is a distributed hash table (DHT) algorithm that is designed to efficiently
/// distribute data across peer-to-peer network nodes. You may want to browse its
/// [wiki](https://en.wikipedia.org/wiki/Chord_(peer-to-peer)) before you read this.
///
/// The trait is implemented by the state a single node owns. None of the methods talk to
/// other nodes: when the protocol needs a peer to act, the method returns an `Action`
/// naming the peer and the call to make, and the caller (see
/// [RingNode](crate::node::RingNode)) performs it and feeds the result back.
pub trait Chord<Action> {
    /// Attach to a ring, given the successor found by a lookup of our own identifier and
    /// that successor's predecessor read before any change is made.
    /// Returns the calls that splice this node between them.
    fn join(&self, successor: NodeDescriptor, predecessor: Option<NodeDescriptor>)
        -> Result<Action>;

    /// One local routing step towards the owner of `id`.
    /// May return a remote action for the owner is recorded in another node.
    fn find_successor(&self, id: Identifier) -> Result<Action>;

    /// The finger strictly between this node and `id` that is closest to `id`,
    /// or this node if there is none.
    fn closest_preceding_node(&self, id: Identifier) -> Result<NodeDescriptor>;

    /// Handle notification from a node that thinks it is the predecessor of current node.
    /// Returns `true` if the candidate was adopted.
    fn notify(&self, candidate: NodeDescriptor) -> Result<bool>;

    /// Handle a node that thinks it is the successor of current node.
    /// Returns `true` if the candidate was adopted.
    fn update_successor(&self, candidate: NodeDescriptor) -> Result<bool>;

    /// Stabilize with the predecessor reported by our successor.
    /// According to the paper, this method should be called periodically.
    fn stabilize(&self, successor_predecessor: Option<NodeDescriptor>) -> Result<Action>;

    /// Fix finger table by finding the successor for each finger.
    /// According to the paper, this method should be called periodically.
    fn fix_fingers(&self) -> Result<Action>;
}

/// ChordStorage is the local half of the key placement protocol: the store of the
/// identifiers a node owns. Finding the owner is done by routing with [Chord].
#[async_trait]
pub trait ChordStorage<Action>: Chord<Action> {
    /// Returns `true` if `id` is in `(predecessor, self]`.
    fn owns(&self, id: Identifier) -> Result<bool>;

    /// Store `value` under `id`, overwriting any previous value.
    async fn storage_put(&self, id: Identifier, value: Bytes) -> Result<()>;

    /// Fetch the value stored under `id`.
    async fn storage_get(&self, id: Identifier) -> Result<Option<Bytes>>;

    /// Delete the value stored under `id`.
    async fn storage_remove(&self, id: Identifier) -> Result<Option<Bytes>>;

    /// Remove and return every entry whose identifier is in `(from, to]`.
    /// Used when a joining node takes over part of the arc of its successor.
    async fn hand_off(&self, from: Identifier, to: Identifier) -> Result<Vec<(Identifier, Bytes)>>;
}
