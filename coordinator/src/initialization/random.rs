use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::{ParamGen, Result};

/// Draws the parameters of a layer from a probabilistic distribution.
///
/// It borrows the model's rng, so layers generated one after the other out of the same seeded
/// rng always come out the same.
pub struct RandParamGen<'a, R: Rng, D: Distribution<f32>> {
    rng: &'a mut R,
    distribution: D,
}

impl<'a, R: Rng, D: Distribution<f32>> RandParamGen<'a, R, D> {
    pub fn new(rng: &'a mut R, distribution: D) -> Self {
        Self { rng, distribution }
    }
}

impl<'a, R: Rng> RandParamGen<'a, R, Uniform<f32>> {
    /// Uniform over `[low, high)`.
    ///
    /// # Returns
    /// An error if `low >= high` or either bound isn't finite.
    pub fn uniform(rng: &'a mut R, low: f32, high: f32) -> Result<Self> {
        Ok(Self::new(rng, Uniform::new(low, high)?))
    }

    /// Xavier (Glorot) uniform, bounded by `sqrt(6 / (fan_in + fan_out))`.
    pub fn xavier_uniform(rng: &'a mut R, fan_in: usize, fan_out: usize) -> Result<Self> {
        let bound = (6. / (fan_in + fan_out) as f32).sqrt();
        Self::uniform(rng, -bound, bound)
    }
}

impl<'a, R: Rng> RandParamGen<'a, R, Normal<f32>> {
    /// # Returns
    /// An error if `std_dev` is negative or not finite.
    pub fn normal(rng: &'a mut R, mean: f32, std_dev: f32) -> Result<Self> {
        Ok(Self::new(rng, Normal::new(mean, std_dev)?))
    }

    /// Kaiming (He) normal, centered with `std_dev = sqrt(2 / fan_in)`.
    pub fn kaiming(rng: &'a mut R, fan_in: usize) -> Result<Self> {
        Self::normal(rng, 0., (2. / fan_in as f32).sqrt())
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<'_, R, D> {
    fn generate(&mut self, shape: &[usize]) -> Result<ArrayD<f32>> {
        let n: usize = shape.iter().product();
        let values = (0..n)
            .map(|_| self.distribution.sample(&mut *self.rng))
            .collect();

        Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn xavier_uniform_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = RandParamGen::xavier_uniform(&mut rng, 4, 2)
            .unwrap()
            .generate(&[8, 8])
            .unwrap();

        assert_eq!(layer.shape(), &[8, 8]);
        assert!(layer.iter().all(|x| (-1.0..1.0).contains(x)));
    }

    #[test]
    fn kaiming_spreads_around_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let layer = RandParamGen::kaiming(&mut rng, 2)
            .unwrap()
            .generate(&[4096])
            .unwrap();

        let n = layer.len() as f32;
        let mean = layer.sum() / n;
        let var = layer.mapv(|x| (x - mean).powi(2)).sum() / n;

        assert!(mean.abs() < 0.1);
        assert!((var - 1.).abs() < 0.1);
    }

    #[test]
    fn same_seed_same_values() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);

        let a = RandParamGen::normal(&mut a, 1., 0.5).unwrap().generate(&[3, 2]);
        let b = RandParamGen::normal(&mut b, 1., 0.5).unwrap().generate(&[3, 2]);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);

        assert!(RandParamGen::uniform(&mut rng, 1., -1.).is_err());
        assert!(RandParamGen::uniform(&mut rng, 0., f32::INFINITY).is_err());
        assert!(RandParamGen::normal(&mut rng, 0., -1.).is_err());
    }
}
