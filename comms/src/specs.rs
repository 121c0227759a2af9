//! Declarative description of the global model the coordinator starts from.

use serde::{Deserialize, Serialize};

use crate::ShapeSignature;

/// The specification of a random distribution to draw initial parameters from.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionSpec {
    Uniform { low: f32, high: f32 },
    XavierUniform { fan_in: usize, fan_out: usize },
    Normal { mean: f32, std_dev: f32 },
    Kaiming { fan_in: usize },
}

/// How the parameters of a single layer are initialized.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGenSpec {
    Const { value: f32 },
    Rand { distribution: DistributionSpec },
}

/// A single layer of the model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LayerSpec {
    pub shape: Vec<usize>,
    pub init: ParamGenSpec,
}

/// The layer layout of the model and how to initialize it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelSpec {
    pub layers: Vec<LayerSpec>,
}

impl ModelSpec {
    /// The shape signature every weight vector of this model must have.
    pub fn shape_signature(&self) -> ShapeSignature {
        ShapeSignature::new(self.layers.iter().map(|l| l.shape.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_from_json() {
        let json = r#"{
            "layers": [
                {"shape": [1, 4], "init": {"rand": {"distribution": {"xavier_uniform": {"fan_in": 4, "fan_out": 1}}}}},
                {"shape": [1], "init": {"const": {"value": 0.0}}}
            ]
        }"#;

        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.shape_signature().layers(), &[vec![1, 4], vec![1]]);
        assert_eq!(
            spec.layers[0].init,
            ParamGenSpec::Rand {
                distribution: DistributionSpec::XavierUniform {
                    fan_in: 4,
                    fan_out: 1
                }
            }
        );
    }
}
