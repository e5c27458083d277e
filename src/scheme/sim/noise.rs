//! Discrete Gaussian noise for the reference backend
//!
//! Integer samples from D_σ are scaled down by the encoding scale so the
//! slot-level error has the magnitude a CKKS ciphertext would carry.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default Gaussian standard deviation
pub const DEFAULT_SIGMA: f64 = 3.2;

/// Discrete Gaussian sampler over Z using rejection sampling
#[derive(Clone)]
pub struct NoiseSampler {
    sigma: f64,
    /// Reject samples beyond this many units (6σ)
    tailcut: i64,
    rng: ChaCha20Rng,
}

impl NoiseSampler {
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self {
            sigma,
            tailcut: (sigma * 6.0).ceil() as i64,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Seeded from OS entropy
    pub fn from_entropy(sigma: f64) -> Self {
        Self::with_seed(sigma, rand::thread_rng().gen())
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Sample a single value from D_σ
    pub fn sample(&mut self) -> i64 {
        let sigma_sq_2 = 2.0 * self.sigma * self.sigma;

        loop {
            let x = self.rng.gen_range(-self.tailcut..=self.tailcut);

            // Accept with probability proportional to exp(-x²/(2σ²))
            let prob = (-((x * x) as f64) / sigma_sq_2).exp();

            let u: f64 = self.rng.gen();
            if u < prob {
                return x;
            }
        }
    }

    /// Slot error vector: each sample scaled by `sqrt(ring_dim) / scale`
    pub fn slot_noise(&mut self, len: usize, ring_dim: usize, scale: f64) -> Vec<f64> {
        let factor = (ring_dim as f64).sqrt() / scale;
        (0..len).map(|_| self.sample() as f64 * factor).collect()
    }

    /// Raw 64-bit draw, used for key-set tags
    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }
}

impl std::fmt::Debug for NoiseSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseSampler")
            .field("sigma", &self.sigma)
            .field("tailcut", &self.tailcut)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tailcut_bounds() {
        let mut sampler = NoiseSampler::with_seed(DEFAULT_SIGMA, 1);
        let bound = (6.0 * DEFAULT_SIGMA).ceil() as i64;

        for _ in 0..10_000 {
            let s = sampler.sample();
            assert!(s.abs() <= bound, "Sample {} exceeds 6σ bound of {}", s, bound);
        }
    }

    #[test]
    fn test_deterministic_seeding() {
        let mut a = NoiseSampler::with_seed(DEFAULT_SIGMA, 12345);
        let mut b = NoiseSampler::with_seed(DEFAULT_SIGMA, 12345);

        for _ in 0..100 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn test_distribution_variance() {
        let mut sampler = NoiseSampler::with_seed(DEFAULT_SIGMA, 42);
        let n = 50_000;

        let samples: Vec<i64> = (0..n).map(|_| sampler.sample()).collect();
        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        let variance = samples
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;

        let expected = DEFAULT_SIGMA * DEFAULT_SIGMA;
        assert!(mean.abs() < 0.1, "Mean {} is too far from 0", mean);
        assert!(
            (variance - expected).abs() / expected < 0.1,
            "Variance {} differs from expected {}",
            variance,
            expected
        );
    }

    #[test]
    fn test_slot_noise_magnitude() {
        let mut sampler = NoiseSampler::with_seed(DEFAULT_SIGMA, 9);
        let noise = sampler.slot_noise(4096, 8192, (40f64).exp2());
        assert_eq!(noise.len(), 4096);
        assert!(noise.iter().all(|e| e.abs() < 1e-8));
    }
}
