use comms::{
    WeightVector,
    specs::{DistributionSpec, LayerSpec, ModelSpec, ParamGenSpec},
};
use ndarray::ArrayD;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{ConstParamGen, ParamGen, RandParamGen, Result};

/// Builds the initial global model out of it's `ModelSpec`.
///
/// Layers draw from one rng in order, so a seed pins the whole model.
///
/// # Arguments
/// * `spec` - The layer layout and per layer initialization.
/// * `seed` - An optional seed, the same seed always yields the same model.
///
/// # Returns
/// The initial weights or an `InitErr` if any distribution has invalid parameters.
pub fn init_weights(spec: &ModelSpec, seed: Option<u64>) -> Result<WeightVector> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let layers = spec
        .layers
        .iter()
        .map(|layer| init_layer(&mut rng, layer))
        .collect::<Result<Vec<_>>>()?;

    Ok(WeightVector::new(layers))
}

fn init_layer<R: Rng>(rng: &mut R, layer: &LayerSpec) -> Result<ArrayD<f32>> {
    let shape = &layer.shape;

    let distribution = match layer.init {
        ParamGenSpec::Const { value } => return ConstParamGen::new(value).generate(shape),
        ParamGenSpec::Rand { distribution } => distribution,
    };

    match distribution {
        DistributionSpec::Uniform { low, high } => {
            RandParamGen::uniform(rng, low, high)?.generate(shape)
        }
        DistributionSpec::XavierUniform { fan_in, fan_out } => {
            RandParamGen::xavier_uniform(rng, fan_in, fan_out)?.generate(shape)
        }
        DistributionSpec::Normal { mean, std_dev } => {
            RandParamGen::normal(rng, mean, std_dev)?.generate(shape)
        }
        DistributionSpec::Kaiming { fan_in } => RandParamGen::kaiming(rng, fan_in)?.generate(shape),
    }
}
