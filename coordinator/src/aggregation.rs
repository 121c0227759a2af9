//! Federated averaging of client weight vectors.

use std::{
    error::Error,
    fmt::{self, Display},
};

use comms::{ShapeMismatchErr, WeightVector};
use ndarray::{ArrayD, Zip};
use rayon::prelude::*;

/// Errors the aggregation engine can fail with.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationErr {
    /// There was nothing to average.
    Empty,
    ShapeMismatch(ShapeMismatchErr),
}

impl From<ShapeMismatchErr> for AggregationErr {
    fn from(value: ShapeMismatchErr) -> Self {
        Self::ShapeMismatch(value)
    }
}

impl Display for AggregationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("cannot aggregate an empty set of weight vectors"),
            Self::ShapeMismatch(e) => e.fmt(f),
        }
    }
}

impl Error for AggregationErr {}

/// Averages every weight vector elementwise, layer by layer, giving each the same weight.
///
/// Sums are accumulated in `f64` and layers are averaged in parallel.
///
/// # Arguments
/// * `weights_list` - The weight vectors to average, they must all share one shape signature.
///
/// # Returns
/// The averaged weight vector, `AggregationErr::Empty` if `weights_list` is empty or
/// `AggregationErr::ShapeMismatch` if any vector differs in shape from the first.
pub fn aggregate(weights_list: &[&WeightVector]) -> Result<WeightVector, AggregationErr> {
    let Some((first, rest)) = weights_list.split_first() else {
        return Err(AggregationErr::Empty);
    };

    let signature = first.shape_signature();
    for weights in rest {
        weights.check_shape(&signature)?;
    }

    let n = weights_list.len() as f64;
    let layers = (0..first.len())
        .into_par_iter()
        .map(|i| {
            let mut acc = ArrayD::<f64>::zeros(first.layers()[i].raw_dim());
            for weights in weights_list {
                Zip::from(&mut acc)
                    .and(&weights.layers()[i])
                    .for_each(|sum, &x| *sum += f64::from(x));
            }

            acc.mapv(|sum| (sum / n) as f32)
        })
        .collect();

    Ok(WeightVector::new(layers))
}
