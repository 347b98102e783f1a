// src/rl/spaces.rs
//
// Bounded box spaces for actions and observations.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CircusError;

/// Axis-aligned box `[low, high]^n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

impl BoxSpace {
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Result<Self, CircusError> {
        if low.len() != high.len() {
            return Err(CircusError::shape("box bounds", low.len(), high.len()));
        }
        Ok(Self { low, high })
    }

    /// `[-1, 1]^dim`.
    pub fn symmetric(dim: usize) -> Self {
        Self {
            low: vec![-1.0; dim],
            high: vec![1.0; dim],
        }
    }

    /// Unbounded box, used for raw observations.
    pub fn unbounded(dim: usize) -> Self {
        Self {
            low: vec![f64::NEG_INFINITY; dim],
            high: vec![f64::INFINITY; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(v, (lo, hi))| v >= lo && v <= hi)
    }

    /// Clip into the box; non-finite entries become the box center (0 for
    /// unbounded axes).
    pub fn clip(&self, x: &[f64]) -> Result<Vec<f64>, CircusError> {
        if x.len() != self.dim() {
            return Err(CircusError::shape("action", self.dim(), x.len()));
        }
        Ok(x.iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(&v, (&lo, &hi))| {
                if v.is_finite() {
                    v.clamp(lo, hi)
                } else if lo.is_finite() && hi.is_finite() {
                    (lo + hi) / 2.0
                } else {
                    0.0
                }
            })
            .collect())
    }

    /// Uniform sample; unbounded axes sample from `[-1, 1]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| {
                let lo = if lo.is_finite() { lo } else { -1.0 };
                let hi = if hi.is_finite() { hi } else { 1.0 };
                if lo >= hi {
                    lo
                } else {
                    rng.gen_range(lo..=hi)
                }
            })
            .collect()
    }
}

/// Observation space of an environment variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObservationSpace {
    Box(BoxSpace),
    Dict {
        observation: BoxSpace,
        achieved_goal: BoxSpace,
        desired_goal: BoxSpace,
    },
}

impl ObservationSpace {
    /// Observation part of the space (the whole space for `Box`).
    pub fn observation(&self) -> &BoxSpace {
        match self {
            ObservationSpace::Box(b) => b,
            ObservationSpace::Dict { observation, .. } => observation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_clip() {
        let space = BoxSpace::symmetric(3);
        assert_eq!(space.clip(&[2.0, -0.5, f64::NAN]).unwrap(), vec![1.0, -0.5, 0.0]);
        assert!(space.clip(&[0.0]).is_err());
    }

    #[test]
    fn test_sample_inside() {
        let space = BoxSpace::symmetric(5);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..50 {
            assert!(space.contains(&space.sample(&mut rng)));
        }
    }

    #[test]
    fn test_unbounded_contains_everything_finite() {
        let space = BoxSpace::unbounded(2);
        assert!(space.contains(&[1e30, -1e30]));
        assert_eq!(space.clip(&[f64::INFINITY, 3.0]).unwrap(), vec![0.0, 3.0]);
    }
}
