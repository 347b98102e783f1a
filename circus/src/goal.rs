// src/goal.rs
//
// Goal generators: produce a fresh desired-goal matrix (one row per slot)
// from a reference.
//
// - noisy  : reference * N(1, noise), elementwise
// - random : uniform in [reference[0], reference[1]] per column
// - fix    : the reference, unchanged
//
// Seeded through ChaCha8 so rollouts are reproducible.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::CircusError;

/// Default relative standard deviation of the noisy generator.
pub const DEFAULT_GOAL_NOISE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalKind {
    Noisy,
    Random,
    Fix,
}

impl GoalKind {
    pub fn parse(s: &str) -> Result<Self, CircusError> {
        match s.trim().to_lowercase().as_str() {
            "noisy" => Ok(GoalKind::Noisy),
            "random" => Ok(GoalKind::Random),
            "fix" | "fixed" => Ok(GoalKind::Fix),
            _ => Err(CircusError::UnknownGoalKind {
                kind: s.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalKind::Noisy => "noisy",
            GoalKind::Random => "random",
            GoalKind::Fix => "fix",
        }
    }
}

/// Stateful goal generator.
#[derive(Debug, Clone)]
pub struct GoalGenerator {
    kind: GoalKind,
    /// `num_envs` rows for noisy/fix, `[min, max]` rows for random.
    reference: Vec<Vec<f64>>,
    num_envs: usize,
    noise: Normal<f64>,
    rng: ChaCha8Rng,
}

impl GoalGenerator {
    pub fn new(
        kind: GoalKind,
        reference: Vec<Vec<f64>>,
        num_envs: usize,
        noise: f64,
        seed: u64,
    ) -> Result<Self, CircusError> {
        let expected_rows = match kind {
            GoalKind::Random => 2,
            GoalKind::Noisy | GoalKind::Fix => num_envs,
        };
        if reference.len() != expected_rows {
            return Err(CircusError::shape(
                "goal reference rows",
                expected_rows,
                reference.len(),
            ));
        }
        let width = reference.first().map(Vec::len).unwrap_or(0);
        if let Some(row) = reference.iter().find(|r| r.len() != width) {
            return Err(CircusError::shape("goal reference columns", width, row.len()));
        }
        let sigma = if noise.is_finite() { noise.abs() } else { 0.0 };
        let noise = Normal::new(1.0, sigma).map_err(|e| CircusError::ParameterOrder {
            message: format!("invalid goal noise {}: {}", sigma, e),
        })?;
        Ok(Self {
            kind,
            reference,
            num_envs,
            noise,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn kind(&self) -> GoalKind {
        self.kind
    }

    pub fn reference(&self) -> &[Vec<f64>] {
        &self.reference
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    fn sample_range(&mut self, lo: f64, hi: f64) -> f64 {
        if lo >= hi {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    /// A full `num_envs x n` goal matrix.
    pub fn generate(&mut self) -> Vec<Vec<f64>> {
        match self.kind {
            GoalKind::Fix => self.reference.clone(),
            GoalKind::Noisy => {
                let mut out = self.reference.clone();
                for v in out.iter_mut().flatten() {
                    *v *= self.noise.sample(&mut self.rng);
                }
                out
            }
            GoalKind::Random => {
                let bounds: Vec<(f64, f64)> = self.reference[0]
                    .iter()
                    .zip(&self.reference[1])
                    .map(|(&a, &b)| (a, b))
                    .collect();
                (0..self.num_envs)
                    .map(|_| {
                        bounds
                            .iter()
                            .map(|&(lo, hi)| self.sample_range(lo, hi))
                            .collect()
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(GoalKind::parse("noisy").unwrap(), GoalKind::Noisy);
        assert_eq!(GoalKind::parse("Fix").unwrap(), GoalKind::Fix);
        assert!(matches!(
            GoalKind::parse("gaussian"),
            Err(CircusError::UnknownGoalKind { .. })
        ));
    }

    #[test]
    fn test_fix_returns_reference() {
        let reference = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let mut g = GoalGenerator::new(GoalKind::Fix, reference.clone(), 2, 0.01, 1).unwrap();
        assert_eq!(g.generate(), reference);
        assert_eq!(g.generate(), reference);
    }

    #[test]
    fn test_noisy_is_close_and_deterministic() {
        let reference = vec![vec![100.0, -5.0, 1e-6]];
        let mut a = GoalGenerator::new(GoalKind::Noisy, reference.clone(), 1, 0.01, 7).unwrap();
        let mut b = GoalGenerator::new(GoalKind::Noisy, reference.clone(), 1, 0.01, 7).unwrap();
        let ga = a.generate();
        assert_eq!(ga, b.generate());
        for (g, r) in ga[0].iter().zip(&reference[0]) {
            assert!(((g / r) - 1.0).abs() < 0.1);
        }
        assert_ne!(ga, a.generate());
    }

    #[test]
    fn test_random_within_bounds() {
        let reference = vec![vec![0.0, 10.0, 5.0], vec![1.0, 20.0, 5.0]];
        let mut g = GoalGenerator::new(GoalKind::Random, reference, 4, 0.01, 3).unwrap();
        let goals = g.generate();
        assert_eq!(goals.len(), 4);
        for row in goals {
            assert!((0.0..=1.0).contains(&row[0]));
            assert!((10.0..=20.0).contains(&row[1]));
            assert_eq!(row[2], 5.0);
        }
    }

    #[test]
    fn test_reference_shape_checked() {
        let err = GoalGenerator::new(GoalKind::Random, vec![vec![0.0]], 3, 0.01, 0);
        assert!(matches!(err, Err(CircusError::ShapeMismatch { .. })));
        let err = GoalGenerator::new(GoalKind::Noisy, vec![vec![0.0], vec![1.0, 2.0]], 2, 0.01, 0);
        assert!(matches!(err, Err(CircusError::ShapeMismatch { .. })));
    }
}
