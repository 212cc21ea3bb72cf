//! Splittable PRNG keys and random tensor construction.
//!
//! A [`PrngKey`] is an immutable seed. New keys are derived deterministically
//! with [`PrngKey::fold_in`] and [`PrngKey::split`]; sampling goes through a
//! `StdRng` seeded from the key, so the same key always yields the same
//! values.

use rand::distr::StandardUniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::tensor::{KeyArray, Tensor};

const FOLD_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// A deterministic, splittable pseudo-random key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrngKey(u64);

impl PrngKey {
    /// Create a root key from a seed.
    ///
    /// # Example
    ///
    /// ```
    /// use scopelift::PrngKey;
    ///
    /// assert_eq!(PrngKey::new(0), PrngKey::new(0));
    /// assert_ne!(PrngKey::new(0), PrngKey::new(1));
    /// ```
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed).random())
    }

    /// The raw key bits.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Derive a new key from this key and `data`.
    pub fn fold_in(self, data: u64) -> Self {
        let seed = self.0 ^ data.wrapping_add(1).wrapping_mul(FOLD_MULTIPLIER);
        Self(StdRng::seed_from_u64(seed).random())
    }

    /// Derive a new key from this key and a name.
    ///
    /// Child scopes derive their streams this way from their own name.
    pub fn fold_in_str(self, data: &str) -> Self {
        self.fold_in(fnv1a(data.as_bytes()))
    }

    /// Split this key into `n` independent keys, returned as a rank-1 key array.
    ///
    /// # Example
    ///
    /// ```
    /// use scopelift::PrngKey;
    ///
    /// let keys = PrngKey::new(7).split(3);
    /// assert_eq!(keys.shape(), &[3]);
    /// assert_ne!(keys.data()[0], keys.data()[1]);
    /// ```
    pub fn split(self, n: usize) -> KeyArray {
        let mut rng = StdRng::seed_from_u64(self.0);
        let keys = (0..n).map(|_| Self(rng.random())).collect();
        Tensor::from_vec(keys, &[n]).expect("split: one key per index")
    }

    /// A generator seeded from this key.
    pub fn rng(self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }
}

// Stable across platforms and releases, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

impl Tensor<f64> {
    /// Create a tensor with uniform random values in [0, 1) drawn from `key`.
    ///
    /// # Example
    ///
    /// ```
    /// use scopelift::{PrngKey, Tensor};
    ///
    /// let key = PrngKey::new(42);
    /// let t1 = Tensor::uniform(key, &[2, 3]);
    /// let t2 = Tensor::uniform(key, &[2, 3]);
    /// assert_eq!(t1, t2);
    /// ```
    pub fn uniform(key: PrngKey, shape: &[usize]) -> Self {
        let mut rng = key.rng();
        let len: usize = shape.iter().product();
        let data = (0..len).map(|_| rng.sample(StandardUniform)).collect();
        Self::from_vec(data, shape).expect("shape and data length should match")
    }

    /// Create a tensor with standard normal random values drawn from `key`.
    pub fn normal(key: PrngKey, shape: &[usize]) -> Self {
        let mut rng = key.rng();
        let len: usize = shape.iter().product();
        let data = (0..len).map(|_| rng.sample(StandardNormal)).collect();
        Self::from_vec(data, shape).expect("shape and data length should match")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_in_is_deterministic() {
        let key = PrngKey::new(3);
        assert_eq!(key.fold_in(1), key.fold_in(1));
        assert_ne!(key.fold_in(1), key.fold_in(2));
        assert_ne!(key.fold_in(0), key);
    }

    #[test]
    fn test_fold_in_str() {
        let key = PrngKey::new(3);
        assert_eq!(key.fold_in_str("dense"), key.fold_in_str("dense"));
        assert_ne!(key.fold_in_str("dense"), key.fold_in_str("conv"));
    }

    #[test]
    fn test_split_distinct() {
        let keys = PrngKey::new(11).split(8);
        let data = keys.data();
        for i in 0..data.len() {
            for j in i + 1..data.len() {
                assert_ne!(data[i], data[j]);
            }
        }
    }

    #[test]
    fn test_uniform_range() {
        let t = Tensor::uniform(PrngKey::new(5), &[50]);
        for &v in t.data() {
            assert!((0.0..1.0).contains(&v), "value {} not in [0, 1)", v);
        }
    }

    #[test]
    fn test_normal_moments() {
        let t = Tensor::normal(PrngKey::new(9), &[200]);
        let mean = t.data().iter().sum::<f64>() / 200.0;
        assert!(mean.abs() < 0.5, "mean {} too far from 0", mean);
    }

    #[test]
    fn test_scalar_shape() {
        let t = Tensor::uniform(PrngKey::new(1), &[]);
        assert_eq!(t.len(), 1);
    }
}
