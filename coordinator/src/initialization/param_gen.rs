use ndarray::ArrayD;

use super::Result;

/// Produces the starting values of one layer of the global model.
pub trait ParamGen {
    /// Generates a layer of the given `shape`.
    ///
    /// # Arguments
    /// * `shape` - The layer's dimensions, empty for a scalar layer.
    fn generate(&mut self, shape: &[usize]) -> Result<ArrayD<f32>>;
}
