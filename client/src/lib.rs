//! Client side of synchronous federated averaging.

pub mod dataset;
pub mod error;
pub mod linear;
pub mod runtime;
pub mod trainer;
pub mod transport;

pub use error::{ClientErr, TransportErr};
pub use runtime::{ClientRuntime, RoundOutcome, RuntimeSettings, SessionReport, SessionState};
pub use trainer::{LocalTrainer, TrainerErr};
pub use transport::{HttpTransport, Transport};
