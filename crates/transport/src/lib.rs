#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
pub mod callback;
pub mod connections;
pub mod core;
pub mod error;
pub mod notifier;

pub use crate::core::callback::SharedTransportCallback;
pub use crate::core::callback::TransportCallback;
pub use crate::core::scheduler::Scheduler;
pub use crate::core::scheduler::SharedScheduler;
pub use crate::core::scheduler::TimerHandle;
pub use crate::core::scheduler::TokioScheduler;
pub use crate::core::transport::Endpoint;
pub use crate::core::transport::TransportInterface;
pub use crate::notifier::Notifier;
