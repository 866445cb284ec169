//! Transport implementations.

#[cfg(feature = "dummy")]
mod dummy;

#[cfg(feature = "dummy")]
pub use dummy::DummyNetwork;
#[cfg(feature = "dummy")]
pub use dummy::DummyTransport;
