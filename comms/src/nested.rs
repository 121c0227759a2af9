//! Conversion between `ndarray` tensors and layer-ordered nested JSON arrays.

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{
    Deserialize, Serialize, Serializer,
    ser::SerializeSeq,
};

/// A borrowed layer that serializes as nested arrays, a 0-d layer becomes a bare number.
pub(crate) struct LayerView<'a>(pub ArrayViewD<'a, f32>);

impl Serialize for LayerView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.ndim() == 0 {
            let value = self.0.first().copied().unwrap_or_default();
            return serializer.serialize_f32(value);
        }

        let mut seq = serializer.serialize_seq(Some(self.0.len_of(ndarray::Axis(0))))?;
        for sub in self.0.outer_iter() {
            seq.serialize_element(&LayerView(sub))?;
        }

        seq.end()
    }
}

/// An untyped nested array as it comes from the wire.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Nested {
    Scalar(f32),
    List(Vec<Nested>),
}

impl Nested {
    /// Follows the first element at every depth to find out the layer's dimensions.
    fn infer_shape(&self) -> Vec<usize> {
        let mut shape = Vec::new();
        let mut cur = self;

        while let Nested::List(items) = cur {
            shape.push(items.len());
            match items.first() {
                Some(first) => cur = first,
                None => break,
            }
        }

        shape
    }

    /// Writes every number in row-major order into `out`, checking that the nesting is rectangular.
    ///
    /// # Arguments
    /// * `shape` - The inferred shape of the whole layer.
    /// * `depth` - The current nesting depth.
    /// * `out` - The flat output buffer.
    ///
    /// # Returns
    /// A description of the first ragged position found, if any.
    fn flatten(self, shape: &[usize], depth: usize, out: &mut Vec<f32>) -> Result<(), String> {
        match (self, shape.get(depth)) {
            (Nested::Scalar(value), None) => {
                out.push(value);
                Ok(())
            }
            (Nested::List(items), Some(&len)) if items.len() == len => items
                .into_iter()
                .try_for_each(|item| item.flatten(shape, depth + 1, out)),
            (Nested::List(items), Some(&len)) => Err(format!(
                "ragged array at depth {depth}: expected {len} elements, got {}",
                items.len()
            )),
            (Nested::Scalar(_), Some(_)) => {
                Err(format!("ragged array at depth {depth}: expected a list, got a number"))
            }
            (Nested::List(_), None) => {
                Err(format!("ragged array at depth {depth}: expected a number, got a list"))
            }
        }
    }

    /// Converts this nested array into a dense tensor.
    ///
    /// # Returns
    /// The tensor or a description of why the nesting isn't rectangular.
    pub(crate) fn into_layer(self) -> Result<ArrayD<f32>, String> {
        let shape = self.infer_shape();
        let mut values = Vec::with_capacity(shape.iter().product());
        self.flatten(&shape, 0, &mut values)?;

        ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| e.to_string())
    }
}
