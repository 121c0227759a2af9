use std::{
    error::Error,
    fmt::{self, Display},
};

use comms::{ShapeMismatchErr, SubmissionMetrics, WeightVector};

/// Errors a local trainer can fail with, all of them end the session.
#[derive(Debug)]
pub enum TrainerErr {
    /// The global model doesn't fit the local one.
    ShapeMismatch(ShapeMismatchErr),
    /// There is no data to train on.
    EmptyDataset,
    /// Training diverged into non finite values.
    Diverged { epoch: usize },
    /// The blocking task running the training died.
    Panicked(String),
}

impl From<ShapeMismatchErr> for TrainerErr {
    fn from(value: ShapeMismatchErr) -> Self {
        Self::ShapeMismatch(value)
    }
}

impl Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch(e) => write!(f, "global model doesn't fit the local one: {e}"),
            Self::EmptyDataset => f.write_str("the local dataset is empty"),
            Self::Diverged { epoch } => write!(f, "training diverged at epoch {epoch}"),
            Self::Panicked(e) => write!(f, "training task panicked: {e}"),
        }
    }
}

impl Error for TrainerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ShapeMismatch(e) => Some(e),
            _ => None,
        }
    }
}

/// The local optimization a client runs every round.
///
/// Implementations are blocking, the runtime calls them from tokio's blocking pool.
pub trait LocalTrainer: Send + 'static {
    type Model: Send + 'static;
    type Dataset: Send + Sync + 'static;

    /// Builds a fresh local model.
    fn initialize(&mut self) -> Result<Self::Model, TrainerErr>;

    /// Loads `global` into `model` and trains it on `dataset`.
    ///
    /// # Arguments
    /// * `model` - The local model.
    /// * `global` - The weights of the current global model.
    /// * `dataset` - The client's private data.
    ///
    /// # Returns
    /// The trained weights, shaped like `global`, and the training metrics.
    fn train(
        &mut self,
        model: &mut Self::Model,
        global: &WeightVector,
        dataset: &Self::Dataset,
    ) -> Result<(WeightVector, SubmissionMetrics), TrainerErr>;
}
