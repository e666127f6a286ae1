//! Diagonal Gaussian distribution
use crate::Prng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;
use tch::{Kind, Tensor};

/// Multivariate normal distribution(s) with diagonal covariance.
///
/// The event dimension is the last dimension of `mean`; all others are batch dimensions.
#[derive(Debug)]
pub struct DiagGaussian {
    /// Shape `[BATCH_SHAPE.., EVENT_DIM]`.
    mean: Tensor,
    /// Log standard deviation. Broadcastable to the shape of `mean`.
    log_std: Tensor,
}

impl DiagGaussian {
    pub fn new(mean: Tensor, log_std: Tensor) -> Self {
        Self { mean, log_std }
    }

    pub const fn mean(&self) -> &Tensor {
        &self.mean
    }

    /// A copy that owns its storage and is detached from the autograd graph.
    ///
    /// Unaffected by later in-place updates of the parameters the distribution was built from.
    pub fn detached(&self) -> Self {
        let _no_grad = tch::no_grad_guard();
        Self {
            mean: self.mean.detach().copy(),
            log_std: self.log_std.detach().copy(),
        }
    }

    /// Standard deviation, broadcast to the shape of `mean`.
    pub fn stddev(&self) -> Tensor {
        self.log_std.exp().expand_as(&self.mean)
    }

    /// The most likely element (the mean).
    pub fn mode(&self) -> Tensor {
        self.mean.shallow_clone()
    }

    /// Sample one element per distribution using noise drawn from `rng`.
    pub fn sample(&self, rng: &mut Prng) -> Tensor {
        let noise: Vec<f32> = (0..self.mean.numel())
            .map(|_| StandardNormal.sample(rng))
            .collect();
        let noise = Tensor::of_slice(&noise)
            .reshape(&self.mean.size())
            .to_device(self.mean.device());
        &self.mean + self.log_std.exp() * noise
    }

    /// Log probability densities, summed over the event dimension.
    pub fn log_prob(&self, elements: &Tensor) -> Tensor {
        let standardized = (elements - &self.mean) / self.log_std.exp();
        (standardized.square() * -0.5 - &self.log_std - 0.5 * (2.0 * PI).ln()).sum_dim_intlist(
            &[-1],
            false,
            Kind::Float,
        )
    }

    /// Distribution entropies.
    pub fn entropy(&self) -> Tensor {
        (self.log_std.expand_as(&self.mean) + 0.5 * (1.0 + (2.0 * PI).ln())).sum_dim_intlist(
            &[-1],
            false,
            Kind::Float,
        )
    }

    /// The KL divergence (relative entropy) from another batch of distributions,
    /// summed over the event dimension.
    ///
    /// `KL(self || other)`
    pub fn kl_divergence_from(&self, other: &Self) -> Tensor {
        let var_ratio = ((&self.log_std - &other.log_std) * 2.0).exp();
        let mean_term = ((&self.mean - &other.mean) / other.log_std.exp()).square();
        ((var_ratio + mean_term - 1.0 - (&self.log_std - &other.log_std) * 2.0) * 0.5)
            .sum_dim_intlist(&[-1], false, Kind::Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tch::Device;

    fn tensor(data: &[f32], shape: &[i64]) -> Tensor {
        Tensor::of_slice(data).reshape(shape)
    }

    fn assert_close(actual: &Tensor, expected: &Tensor) {
        assert!(
            bool::from(actual.isclose(expected, 1e-5, 1e-5, false).all()),
            "expected: {:?}\nactual: {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn standard_log_prob() {
        let dist = DiagGaussian::new(
            Tensor::zeros(&[2, 3], (Kind::Float, Device::Cpu)),
            Tensor::zeros(&[3], (Kind::Float, Device::Cpu)),
        );
        let elements = tensor(&[0.0, 0.0, 0.0, 1.0, -1.0, 2.0], &[2, 3]);
        let c = -0.5 * (2.0 * std::f32::consts::PI).ln();
        let expected = Tensor::of_slice(&[3.0 * c, 3.0 * c - 3.0]);
        assert_close(&dist.log_prob(&elements), &expected);
    }

    #[test]
    fn scaled_log_prob() {
        let log_std = (2.0f32).ln();
        let dist = DiagGaussian::new(tensor(&[1.0], &[1, 1]), tensor(&[log_std], &[1]));
        let c = -0.5 * (2.0 * std::f32::consts::PI).ln();
        // (3 - 1) / 2 = 1 standard deviation
        let expected = Tensor::of_slice(&[c - 0.5 - log_std]);
        assert_close(&dist.log_prob(&tensor(&[3.0], &[1, 1])), &expected);
    }

    #[test]
    fn kl_self_is_zero() {
        let dist = DiagGaussian::new(
            tensor(&[0.3, -1.0, 2.0, 0.0], &[2, 2]),
            tensor(&[0.1, -0.4], &[2]),
        );
        let kl = dist.kl_divergence_from(&dist);
        assert_close(&kl, &Tensor::zeros(&[2], (Kind::Float, Device::Cpu)));
    }

    #[test]
    fn kl_known_value() {
        // KL(N(0, 1) || N(1, 2^2)) = ln 2 + (1 + 1) / 8 - 0.5
        let p = DiagGaussian::new(tensor(&[0.0], &[1, 1]), tensor(&[0.0], &[1]));
        let q = DiagGaussian::new(tensor(&[1.0], &[1, 1]), tensor(&[2.0f32.ln()], &[1]));
        let expected = 2.0f32.ln() + 0.25 - 0.5;
        assert_close(&p.kl_divergence_from(&q), &Tensor::of_slice(&[expected]));
        assert!(f64::from(q.kl_divergence_from(&p).sum(Kind::Float)) > 0.0);
    }

    #[test]
    fn entropy_of_standard() {
        let dist = DiagGaussian::new(
            Tensor::zeros(&[1, 2], (Kind::Float, Device::Cpu)),
            Tensor::zeros(&[2], (Kind::Float, Device::Cpu)),
        );
        let expected = 1.0 + (2.0 * std::f32::consts::PI).ln();
        assert_close(&dist.entropy(), &Tensor::of_slice(&[expected]));
    }

    #[test]
    fn sample_is_seeded() {
        let dist = DiagGaussian::new(
            Tensor::zeros(&[4, 2], (Kind::Float, Device::Cpu)),
            Tensor::zeros(&[2], (Kind::Float, Device::Cpu)),
        );
        let a = dist.sample(&mut Prng::seed_from_u64(1));
        let b = dist.sample(&mut Prng::seed_from_u64(1));
        assert_eq!(a.size(), vec![4, 2]);
        assert_eq!(a, b);
        assert_eq!(dist.mode(), Tensor::zeros(&[4, 2], (Kind::Float, Device::Cpu)));
    }
}
