//! Coordinator side of synchronous federated averaging: it registers clients, hands out
//! the global model, collects their trained weights and averages them once every expected
//! client reported.

pub mod aggregation;
pub mod config;
mod coordinator;
pub mod error;
pub mod initialization;
mod registry;
mod round;
pub mod service;
pub mod watchdog;

pub use config::{CoordinatorConfig, RoundPolicy, TimeoutAction};
pub use coordinator::{GlobalSnapshot, RoundCoordinator, SubmissionReceipt};
pub use error::{ConfigErr, CoordinatorErr};
pub use registry::{ClientRecord, ClientRegistry};
pub use round::{RoundState, Submission};
