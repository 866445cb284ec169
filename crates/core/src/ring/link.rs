use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use suzaku_transport::Endpoint;

use crate::ring::RingKey;

/// A pointer to a ring node: the endpoint hosting it plus its key.
/// Compared by value; holding a link implies no ownership of the node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub endpoint: Endpoint,
    pub key: RingKey,
}

impl Link {
    pub fn new(endpoint: Endpoint, key: RingKey) -> Self {
        Self { endpoint, key }
    }
}

impl AsRef<RingKey> for Link {
    fn as_ref(&self) -> &RingKey {
        &self.key
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.endpoint)
    }
}
