//! Messages exchanged between ring members.
//!
//! A member only changes the state of another member by sending one of these messages;
//! the receiver applies it to its own [PeerRing](crate::dht::PeerRing).
#![warn(missing_docs)]
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::Identifier;
use crate::dht::IdentifierSpace;
use crate::dht::NodeDescriptor;
use crate::error::Error;
use crate::error::Result;

/// Request sent to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Exchange identifier spaces before joining, the receiver answers with its own.
    Handshake(IdentifierSpace),
    /// Run one routing step towards the owner of the identifier.
    FindSuccessor(Identifier),
    /// Read the predecessor of the receiver.
    GetPredecessor,
    /// Read the successor of the receiver.
    GetSuccessor,
    /// The sender may be the predecessor of the receiver.
    Notify(NodeDescriptor),
    /// The sender may be the successor of the receiver.
    UpdateSuccessor(NodeDescriptor),
    /// Remove and return the entries in `(from, to]`.
    HandOff {
        /// exclusive start of the arc
        from: Identifier,
        /// inclusive end of the arc
        to: Identifier,
    },
    /// Store a value at the receiver.
    Put {
        /// hashed key
        id: Identifier,
        /// value
        value: Bytes,
    },
    /// Read a value from the receiver.
    Get {
        /// hashed key
        id: Identifier,
    },
    /// Delete a value at the receiver.
    Remove {
        /// hashed key
        id: Identifier,
    },
}

/// Outcome of one routing step at a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindSuccessorStep {
    /// The owner is known.
    Found(NodeDescriptor),
    /// Ask `next`. If it can't be reached, `successor` of the answering node is the
    /// fallback that still makes progress.
    Forward {
        /// closest preceding node known by the answering node
        next: NodeDescriptor,
        /// immediate successor of the answering node
        successor: NodeDescriptor,
    },
}

/// Answer of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Message applied.
    Ack,
    /// Identifier space of the receiver.
    Space(IdentifierSpace),
    /// Result of [Message::FindSuccessor].
    Step(FindSuccessorStep),
    /// A node, or none.
    Node(Option<NodeDescriptor>),
    /// A stored value, `None` when absent.
    Value(Option<Bytes>),
    /// Entries handed off.
    Entries(Vec<(Identifier, Bytes)>),
    /// The receiver refused the message.
    Rejected(String),
}

impl Message {
    /// Name of the message, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "Handshake",
            Self::FindSuccessor(_) => "FindSuccessor",
            Self::GetPredecessor => "GetPredecessor",
            Self::GetSuccessor => "GetSuccessor",
            Self::Notify(_) => "Notify",
            Self::UpdateSuccessor(_) => "UpdateSuccessor",
            Self::HandOff { .. } => "HandOff",
            Self::Put { .. } => "Put",
            Self::Get { .. } => "Get",
            Self::Remove { .. } => "Remove",
        }
    }

    /// Encode with bincode.
    pub fn encode(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(Error::BincodeSerialize)
    }

    /// Decode from bincode.
    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::BincodeDeserialize)
    }
}

impl Response {
    /// Encode with bincode.
    pub fn encode(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(Error::BincodeSerialize)
    }

    /// Decode from bincode.
    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::BincodeDeserialize)
    }
}
