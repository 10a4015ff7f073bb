#![warn(missing_docs)]
//! Implementation of the ring's DHT
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

mod chord;
/// Finger table of a ring member
pub mod finger;
pub mod id;
mod stabilization;
pub mod types;

pub use chord::NodeStatus;
pub use chord::PeerRing;
pub use chord::RemoteAction as PeerRingRemoteAction;
pub use chord::RingAction;
pub use chord::RingStorage;
pub use finger::FingerTable;
pub use id::DigestAlgorithm;
pub use id::Identifier;
pub use id::IdentifierSpace;
pub use stabilization::Stabilizer;
pub use types::Chord;
pub use types::ChordStorage;
pub use types::NodeDescriptor;
