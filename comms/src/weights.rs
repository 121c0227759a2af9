use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::{ArrayD, IxDyn, ShapeError};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::nested::{LayerView, Nested};

/// The ordered list of per-layer dimensions of a `WeightVector`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeSignature(Vec<Vec<usize>>);

impl ShapeSignature {
    /// Creates a new `ShapeSignature`.
    ///
    /// # Arguments
    /// * `layers` - The dimensions of every layer, in order.
    pub fn new(layers: Vec<Vec<usize>>) -> Self {
        Self(layers)
    }

    /// Returns the dimensions of every layer.
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.0
    }

    /// The amount of scalar parameters described by this signature.
    pub fn num_params(&self) -> usize {
        self.0.iter().map(|dims| dims.iter().product::<usize>()).sum()
    }
}

impl Display for ShapeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dims) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }

            if dims.is_empty() {
                f.write_str("()")?;
                continue;
            }

            let dims: Vec<_> = dims.iter().map(usize::to_string).collect();
            f.write_str(&dims.join("x"))?;
        }
        f.write_str("]")
    }
}

/// Error returned whenever a weight vector doesn't have the shape signature it's compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatchErr {
    pub expected: ShapeSignature,
    pub got: ShapeSignature,
}

impl Display for ShapeMismatchErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shape mismatch: expected {}, got {}",
            self.expected, self.got
        )
    }
}

impl Error for ShapeMismatchErr {}

/// The parameters of a model: an ordered sequence of tensors, one per layer.
///
/// On the wire it's a list with one nested numeric array per layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightVector {
    layers: Vec<ArrayD<f32>>,
}

impl WeightVector {
    /// Creates a new `WeightVector`.
    ///
    /// # Arguments
    /// * `layers` - The tensors of every layer, in order.
    pub fn new(layers: Vec<ArrayD<f32>>) -> Self {
        Self { layers }
    }

    /// Creates a new `WeightVector` out of flat row-major buffers.
    ///
    /// # Arguments
    /// * `layers` - A `(shape, values)` pair per layer.
    ///
    /// # Returns
    /// A `ShapeError` if any buffer's length doesn't match it's shape.
    pub fn from_flat<I>(layers: I) -> Result<Self, ShapeError>
    where
        I: IntoIterator<Item = (Vec<usize>, Vec<f32>)>,
    {
        let layers = layers
            .into_iter()
            .map(|(shape, values)| ArrayD::from_shape_vec(IxDyn(&shape), values))
            .collect::<Result<_, _>>()?;

        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[ArrayD<f32>] {
        &self.layers
    }

    pub fn into_layers(self) -> Vec<ArrayD<f32>> {
        self.layers
    }

    /// The amount of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The total amount of scalar parameters across all layers.
    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|l| l.len()).sum()
    }

    /// Computes the shape signature of this weight vector.
    pub fn shape_signature(&self) -> ShapeSignature {
        ShapeSignature(self.layers.iter().map(|l| l.shape().to_vec()).collect())
    }

    /// Checks that this weight vector has exactly the `expected` shape signature.
    ///
    /// # Arguments
    /// * `expected` - The signature to compare against.
    ///
    /// # Returns
    /// A `ShapeMismatchErr` describing both signatures if they differ.
    pub fn check_shape(&self, expected: &ShapeSignature) -> Result<(), ShapeMismatchErr> {
        let same = self.layers.len() == expected.0.len()
            && self
                .layers
                .iter()
                .zip(&expected.0)
                .all(|(layer, dims)| layer.shape() == dims.as_slice());

        if same {
            return Ok(());
        }

        Err(ShapeMismatchErr {
            expected: expected.clone(),
            got: self.shape_signature(),
        })
    }
}

impl Serialize for WeightVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.layers.iter().map(|l| LayerView(l.view())))
    }
}

impl<'de> Deserialize<'de> for WeightVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Nested>::deserialize(deserializer)?;
        let layers = raw
            .into_iter()
            .enumerate()
            .map(|(i, nested)| {
                nested
                    .into_layer()
                    .map_err(|e| de::Error::custom(format!("layer {i}: {e}")))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { layers })
    }
}
