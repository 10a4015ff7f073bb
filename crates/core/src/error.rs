//! Error of chord_core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in chord-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Identifier space width must be within 1..=64 bits, got {0}")]
    InvalidBits(u8),

    #[error("Identifier {id} is outside of a {bits} bits identifier space")]
    IdentifierOutOfRange { id: u64, bits: u8 },

    #[error("Finger index {index} is out of range, finger table has {size} entries")]
    FingerIndexOutOfRange { index: usize, size: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Identifier {0} is already taken by another ring member")]
    IdentifierCollision(u64),

    #[error("Routing to {target} gave up after {hops} hops")]
    RoutingFailure { target: u64, hops: u32 },

    #[error("Peer {0} is unreachable")]
    UnreachablePeer(String),

    #[error("Peer rejected message: {0}")]
    PeerRejected(String),

    #[error("Unexpected response for {0}")]
    UnexpectedResponse(String),

    #[error("Invalid RingAction")]
    PeerRingInvalidAction,

    #[error("Failed on lock dht data")]
    DHTSyncLockError,

    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String),

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    #[error("Yaml encode error")]
    EncodeError(#[source] serde_yaml::Error),

    #[error("Yaml decode error")]
    DecodeError(#[source] serde_yaml::Error),

    #[error("IOError")]
    IOError(#[from] std::io::Error),
}
