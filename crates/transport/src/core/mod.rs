//! The main concepts of this mod are:
//!
//! The [TransportInterface](transport::TransportInterface) trait defines how to
//! deliver bytes to a remote [Endpoint](transport::Endpoint), either one-way or as a
//! request awaiting a reply. See the [transport] module.
//!
//! The [TransportCallback](callback::TransportCallback) trait is used to let user handle
//! the bytes arriving at a bound endpoint. See the [callback] module.
//!
//! The [Scheduler](scheduler::Scheduler) trait provides delayed and periodic jobs and a
//! clock, so protocol timers run unchanged on real or virtual time. See the [scheduler] module.

pub mod callback;
pub mod scheduler;
pub mod transport;
