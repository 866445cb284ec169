//! Error of suzaku_core

use crate::ddll::Mode;
use crate::ring::RingKey;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in suzaku-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] suzaku_transport::error::Error),

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    #[error("Failed on read/write lock of ring node state")]
    NodeSyncLockError,

    #[error("Failed on read/write lock of finger tables")]
    FingerSyncLockError,

    #[error("Operation requires mode {expected:?}, node is {actual:?}")]
    IllegalState { expected: Mode, actual: Mode },

    #[error("Key {0} already hosted by this manager")]
    KeyAlreadyExists(RingKey),

    #[error("Key {0} is not hosted by this manager")]
    NoSuchKey(RingKey),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    #[error("Lookup of {0} timed out")]
    LookupTimeout(RingKey),

    #[error("No insertion point found within {0} hops")]
    FindNearestExhausted(usize),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
