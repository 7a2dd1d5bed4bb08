//! Asynchronous query handover
//!
//! Queries evaluated on a background worker session, with their results
//! handed to consumer sessions on other threads:
//! - **AsyncQuery**: the background evaluator and per-consumer delivery gate
//! - **Delivery / DeliveryQueue**: deferred work run on the consumer thread
//! - **ResultCallback**: the thread-affine consumer sink
//! - **QueryCoordinator**: registry that drives evaluators and collects results

mod async_query;
mod callback;
mod captured;
mod config;
mod coordinator;
mod delivery;
mod errors;
mod results;

pub use async_query::{AsyncQuery, GateDecision, QueryId};
pub use callback::{
    CallbackEvent, CallbackReceiver, CallbackSender, ChannelCallback, ResultCallback,
    ThreadAffinity,
};
pub use captured::CapturedError;
pub use config::CoordinatorConfig;
pub use coordinator::{CycleReport, QueryCoordinator, QueryRegistry};
pub use delivery::{Delivery, DeliveryOutcome, DeliveryQueue, DeliveryReport};
pub use errors::{LiveError, LiveResult};
pub use results::Results;
