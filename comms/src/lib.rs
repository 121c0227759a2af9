mod metrics;
pub mod msg;
mod nested;
pub mod specs;
mod weights;

pub use metrics::SubmissionMetrics;
pub use weights::{ShapeMismatchErr, ShapeSignature, WeightVector};

/// The identifier a client uses in every exchange with the coordinator.
pub type ClientId = u64;
