//! Reference local trainer: linear regression fitted with mini-batch gradient descent on MSE.

use comms::{ShapeMismatchErr, ShapeSignature, SubmissionMetrics, WeightVector};
use log::debug;
use ndarray::{Array1, Array2, ArrayView2};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
    dataset::Dataset,
    trainer::{LocalTrainer, TrainerErr},
};

/// Hyperparameters of a round of local training.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSettings {
    pub local_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Fraction of the local data held out to compute `val_loss`.
    pub validation_split: f32,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            local_epochs: 5,
            batch_size: 32,
            learning_rate: 0.01,
            validation_split: 0.2,
        }
    }
}

/// `y = x · kernel + bias`, laid out on the wire as a `1 x features` kernel and a bias of length 1.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    kernel: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearModel {
    pub fn zeros(features: usize) -> Self {
        Self {
            kernel: Array2::zeros((1, features)),
            bias: Array1::zeros(1),
        }
    }

    pub fn signature(features: usize) -> ShapeSignature {
        ShapeSignature::new(vec![vec![1, features], vec![1]])
    }

    /// Overwrites the parameters with `weights`.
    ///
    /// # Returns
    /// A `ShapeMismatchErr` if `weights` isn't laid out like this model.
    pub fn load(&mut self, weights: &WeightVector) -> Result<(), ShapeMismatchErr> {
        weights.check_shape(&Self::signature(self.kernel.ncols()))?;

        let layers = weights.layers();
        for (dst, &src) in self.kernel.iter_mut().zip(layers[0].iter()) {
            *dst = src;
        }
        for (dst, &src) in self.bias.iter_mut().zip(layers[1].iter()) {
            *dst = src;
        }

        Ok(())
    }

    pub fn weights(&self) -> WeightVector {
        WeightVector::new(vec![
            self.kernel.clone().into_dyn(),
            self.bias.clone().into_dyn(),
        ])
    }

    pub fn predict(&self, x: ArrayView2<f32>) -> Array1<f32> {
        x.dot(&self.kernel.row(0)) + self.bias[0]
    }

    /// Mean squared and mean absolute error over `dataset`.
    fn evaluate(&self, dataset: &Dataset) -> (f32, f32) {
        let err = self.predict(dataset.x().view()) - dataset.y();
        let mse = err.mapv(|e| e * e).mean().unwrap_or_default();
        let mae = err.mapv(f32::abs).mean().unwrap_or_default();
        (mse, mae)
    }
}

/// Trains a `LinearModel` on the client's data.
pub struct LinearRegression {
    features: usize,
    settings: TrainSettings,
    rng: StdRng,
}

impl LinearRegression {
    /// Creates a new `LinearRegression` trainer.
    ///
    /// # Arguments
    /// * `features` - The amount of input features.
    /// * `settings` - The local training hyperparameters.
    /// * `seed` - Seeds the shuffling of the data.
    pub fn new(features: usize, settings: TrainSettings, seed: u64) -> Self {
        Self {
            features,
            settings,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl LocalTrainer for LinearRegression {
    type Model = LinearModel;
    type Dataset = Dataset;

    fn initialize(&mut self) -> Result<LinearModel, TrainerErr> {
        Ok(LinearModel::zeros(self.features))
    }

    fn train(
        &mut self,
        model: &mut LinearModel,
        global: &WeightVector,
        dataset: &Dataset,
    ) -> Result<(WeightVector, SubmissionMetrics), TrainerErr> {
        if dataset.is_empty() {
            return Err(TrainerErr::EmptyDataset);
        }

        if dataset.features() != self.features {
            return Err(TrainerErr::ShapeMismatch(ShapeMismatchErr {
                expected: LinearModel::signature(self.features),
                got: LinearModel::signature(dataset.features()),
            }));
        }

        model.load(global)?;

        let TrainSettings {
            local_epochs,
            batch_size,
            learning_rate,
            validation_split,
        } = self.settings;

        let (train, val) = dataset.split(validation_split, &mut self.rng);
        let mut indices: Vec<usize> = (0..train.len()).collect();
        let (mut loss, mut mae) = model.evaluate(&train);

        for epoch in 0..local_epochs {
            indices.shuffle(&mut self.rng);

            for batch in indices.chunks(batch_size.max(1)) {
                let batch = train.select(batch);
                let err = model.predict(batch.x().view()) - batch.y();
                let scale = 2. / batch.len() as f32;

                let grad_kernel = batch.x().t().dot(&err) * scale;
                let grad_bias = err.sum() * scale;

                model
                    .kernel
                    .row_mut(0)
                    .scaled_add(-learning_rate, &grad_kernel);
                model.bias[0] -= learning_rate * grad_bias;
            }

            (loss, mae) = model.evaluate(&train);
            if !loss.is_finite() {
                return Err(TrainerErr::Diverged { epoch });
            }

            debug!(epoch = epoch, loss = loss; "local epoch finished");
        }

        let mut metrics = SubmissionMetrics::new();
        metrics.insert("loss", f64::from(loss));
        metrics.insert("mae", f64::from(mae));

        if !val.is_empty() {
            let (val_loss, val_mae) = model.evaluate(&val);
            metrics.insert("val_loss", f64::from(val_loss));
            metrics.insert("val_mae", f64::from(val_mae));
        }

        Ok((model.weights(), metrics))
    }
}
