use ndarray::{ArrayD, IxDyn};

use super::{ParamGen, Result};

/// Fills every parameter of a layer with the same value.
pub struct ConstParamGen {
    value: f32,
}

impl ConstParamGen {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl ParamGen for ConstParamGen {
    fn generate(&mut self, shape: &[usize]) -> Result<ArrayD<f32>> {
        Ok(ArrayD::from_elem(IxDyn(shape), self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_the_whole_layer() {
        let layer = ConstParamGen::new(0.5).generate(&[2, 3]).unwrap();

        assert_eq!(layer.shape(), &[2, 3]);
        assert!(layer.iter().all(|&x| x == 0.5));
    }

    #[test]
    fn scalar_and_empty_layers() {
        let mut param_gen = ConstParamGen::new(1.);

        assert_eq!(param_gen.generate(&[]).unwrap().first(), Some(&1.));
        assert!(param_gen.generate(&[4, 0]).unwrap().is_empty());
    }
}
