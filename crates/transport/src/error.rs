#![allow(missing_docs)]

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Endpoint {0} not found")]
    EndpointNotFound(String),

    #[error("Endpoint {0} already bound")]
    EndpointAlreadyBound(String),

    #[error("Endpoint {0} is unreachable")]
    EndpointUnreachable(String),

    #[error("Request to {0} timed out")]
    RequestTimeout(String),

    #[error("Transport is not bound to a callback")]
    CallbackNotBound,

    #[error("Remote handler failed: {0}")]
    RemoteHandler(String),

    #[error("Request to {0} produced no reply")]
    EmptyReply(String),
}
