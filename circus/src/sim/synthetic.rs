// src/sim/synthetic.rs
//
// Deterministic stand-in for a circuit simulator.
//
// Each session exposes the topology's geometric parameters as sizing knobs
// (ranges taken from the process) and reports every performance parameter
// of the curated reference goal plus the per-device operating-point
// quantities of the electrical design space.
//
// Performance surfaces are analytic: every reported value is the reference
// value times a factor in [1/e, e] driven by the normalized sizing through
// fixed pseudo-random weights (fnv1a64 of the parameter name). Evaluation is
// a pure function of the sizing, so restoring a sizing reproduces its
// performance. Any non-finite sizing value yields NaN everywhere, the way a
// failed simulation does.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::constraints::{Constraint, Constraints, ParamMap};
use crate::error::CircusError;
use crate::pdk::Pdk;
use crate::topology::Topology;
use crate::trafo::DEFAULT_BIAS_CURRENT;

use super::{CircuitBackend, CircuitSession};

/// Load capacitance reported as a fixed netlist parameter.
pub const DEFAULT_LOAD_CAPACITANCE: f64 = 10e-12;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a64(s: &str) -> u64 {
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Weight in [-1, 1] of sizing column `j` for a parameter with hash `h`.
fn weight(h: u64, j: usize) -> f64 {
    let mut x = h ^ (j as u64 + 1).wrapping_mul(FNV_PRIME);
    x ^= x >> 33;
    x = x.wrapping_mul(FNV_PRIME);
    x ^= x >> 29;
    (x >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
}

/// Netlist constraints derived from the topology's geometric parameters.
pub fn synthetic_constraints(topology: Topology, pdk: Pdk) -> Constraints {
    let l_min = pdk.min_length();
    let mut c = Constraints::default();
    for id in topology.geometric_identifiers() {
        let constraint = match id.chars().next() {
            Some('L') => Constraint::sizing(l_min, 20.0 * l_min, 2.0 * l_min),
            Some('W') => Constraint::sizing(1e-6, pdk.max_width(), 5e-6),
            _ => Constraint::sizing(1.0, 40.0, 2.0),
        };
        c.insert(*id, constraint);
    }
    c.insert("vsup", Constraint::fixed(pdk.nominal_vdd()));
    c.insert("i0", Constraint::fixed(DEFAULT_BIAS_CURRENT));
    c.insert("cl", Constraint::fixed(DEFAULT_LOAD_CAPACITANCE));
    c
}

/// Factory for [`SyntheticSession`]s; slot `i` is seeded with `seed + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticBackend {
    pub seed: u64,
}

impl SyntheticBackend {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(666)
    }
}

impl CircuitBackend for SyntheticBackend {
    type Session = SyntheticSession;

    fn name(&self) -> &str {
        "synthetic"
    }

    fn open_session(
        &self,
        slot: usize,
        topology: Topology,
        pdk: Pdk,
    ) -> Result<SyntheticSession, CircusError> {
        SyntheticSession::new(slot, topology, pdk, self.seed.wrapping_add(slot as u64))
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSession {
    slot: usize,
    constraints: Constraints,
    sizing_ids: Vec<String>,
    perf_ids: Vec<String>,
    /// Reference value per entry of `perf_ids`.
    reference: Vec<f64>,
    /// Surface weights per entry of `perf_ids`, one per sizing parameter.
    weights: Vec<Vec<f64>>,
    rng: ChaCha8Rng,
    evaluations: u64,
    closed: bool,
}

impl SyntheticSession {
    pub fn new(slot: usize, topology: Topology, pdk: Pdk, seed: u64) -> Result<Self, CircusError> {
        let constraints = synthetic_constraints(topology, pdk);
        let goal = topology.reference_goal(pdk, &constraints)?;
        let sizing_ids = constraints.sizing_identifiers();

        let mut perf_ids: Vec<String> = goal.keys().cloned().collect();
        perf_ids.extend(topology.electrical_identifiers().iter().map(|s| s.to_string()));
        perf_ids.sort();

        let reference = perf_ids
            .iter()
            .map(|id| goal.get(id).copied().unwrap_or(1.0))
            .collect();
        let weights = perf_ids
            .iter()
            .map(|id| {
                let h = fnv1a64(id);
                (0..sizing_ids.len()).map(|j| weight(h, j)).collect()
            })
            .collect();

        Ok(Self {
            slot,
            constraints,
            sizing_ids,
            perf_ids,
            reference,
            weights,
            rng: ChaCha8Rng::seed_from_u64(seed),
            evaluations: 0,
            closed: false,
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of successful `evaluate` calls.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Position of `v` inside its constraint, in [0, 1]. Widths and lengths
    /// are placed on a log axis.
    fn position(id: &str, v: f64, c: &Constraint) -> f64 {
        if !(c.max > c.min) {
            return 0.5;
        }
        let log_axis = matches!(id.chars().next(), Some('L' | 'W')) && c.min > 0.0;
        let u = if log_axis {
            (v.max(c.min).ln() - c.min.ln()) / (c.max.ln() - c.min.ln())
        } else {
            (v - c.min) / (c.max - c.min)
        };
        u.clamp(0.0, 1.0)
    }

    fn surface(&self, k: usize, u: &[f64]) -> f64 {
        let n = (u.len().max(1) as f64).sqrt();
        let score: f64 = self.weights[k]
            .iter()
            .zip(u)
            .map(|(w, uj)| w * (uj - 0.5))
            .sum::<f64>()
            / n;
        let t = score.tanh();
        let id = self.perf_ids[k].as_str();
        if id.ends_with(":gmoverid") {
            10.0 + 5.0 * t
        } else if id.ends_with(":fug") {
            10f64.powf(7.5 + t)
        } else if id.ends_with(":id") {
            DEFAULT_BIAS_CURRENT * (2.0 + t)
        } else {
            self.reference[k] * t.exp()
        }
    }
}

impl CircuitSession for SyntheticSession {
    fn parameter_dict(&self) -> Constraints {
        self.constraints.clone()
    }

    fn performance_identifiers(&self) -> Vec<String> {
        self.perf_ids.clone()
    }

    fn sizing_identifiers(&self) -> Vec<String> {
        self.sizing_ids.clone()
    }

    fn evaluate(&mut self, sizing: &ParamMap) -> Result<ParamMap, CircusError> {
        if self.closed {
            return Err(CircusError::Simulation {
                slot: self.slot,
                message: "session is closed".to_string(),
            });
        }

        let mut failed = false;
        let mut u = Vec::with_capacity(self.sizing_ids.len());
        for id in &self.sizing_ids {
            let Some(c) = self.constraints.get(id) else {
                continue;
            };
            let v = sizing.get(id).copied().unwrap_or(c.init);
            if !v.is_finite() {
                failed = true;
            }
            u.push(Self::position(id, v, c));
        }

        self.evaluations += 1;
        Ok(self
            .perf_ids
            .iter()
            .enumerate()
            .map(|(k, id)| {
                let v = if failed { f64::NAN } else { self.surface(k, &u) };
                (id.clone(), v)
            })
            .collect())
    }

    fn random_sizing(&mut self) -> ParamMap {
        let mut out = ParamMap::new();
        for id in &self.sizing_ids {
            let Some(c) = self.constraints.get(id) else {
                continue;
            };
            let v = if c.min >= c.max {
                c.min
            } else if id.starts_with('M') {
                self.rng.gen_range(c.min..=c.max).round()
            } else {
                self.rng.gen_range(c.min..=c.max)
            };
            out.insert(id.clone(), v);
        }
        out
    }

    fn initial_sizing(&self) -> ParamMap {
        self.constraints.initial_sizing()
    }

    fn close(&mut self) -> Result<(), CircusError> {
        if self.closed {
            return Err(CircusError::SessionClose {
                slot: self.slot,
                message: "session already closed".to_string(),
            });
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward::is_performance_identifier;
    use crate::sim::SessionPool;
    use std::collections::BTreeMap;

    fn session() -> SyntheticSession {
        SyntheticSession::new(0, Topology::Symmetrical, Pdk::Xh035, 1).unwrap()
    }

    #[test]
    fn test_identifiers() {
        let s = session();
        let mut geometric: Vec<String> = Topology::Symmetrical
            .geometric_identifiers()
            .iter()
            .map(|s| s.to_string())
            .collect();
        geometric.sort();
        assert_eq!(s.sizing_identifiers(), geometric);

        let perf = s.performance_identifiers();
        assert_eq!(perf.iter().filter(|id| is_performance_identifier(id)).count(), 29);
        assert!(perf.iter().any(|id| id == "MND11:gmoverid"));
    }

    #[test]
    fn test_evaluate_is_pure() {
        let mut s = session();
        let sizing = s.random_sizing();
        let a = s.evaluate(&sizing).unwrap();
        let b = s.evaluate(&sizing).unwrap();
        assert_eq!(a, b);
        assert_eq!(s.evaluations(), 2);
        assert!(a.values().all(|v| v.is_finite()));

        let init = s.evaluate(&s.initial_sizing()).unwrap();
        assert_eq!(init, s.evaluate(&ParamMap::new()).unwrap());
    }

    #[test]
    fn test_performance_stays_near_reference() {
        let mut s = session();
        let goal = Topology::Symmetrical
            .reference_goal(Pdk::Xh035, &s.parameter_dict())
            .unwrap();
        for _ in 0..10 {
            let sizing = s.random_sizing();
            let perf = s.evaluate(&sizing).unwrap();
            for (id, r) in &goal {
                let ratio = perf[id] / r;
                assert!(ratio > 0.36 && ratio < 2.72, "{} ratio {}", id, ratio);
            }
        }
    }

    #[test]
    fn test_non_finite_sizing_fails_softly() {
        let mut s = session();
        let mut sizing = s.initial_sizing();
        sizing.insert("Wd".to_string(), f64::NAN);
        let perf = s.evaluate(&sizing).unwrap();
        assert!(perf.values().all(|v| v.is_nan()));
    }

    #[test]
    fn test_random_sizing_in_bounds() {
        let mut s = session();
        let c = s.parameter_dict();
        for _ in 0..20 {
            for (id, v) in s.random_sizing() {
                let k = c.get(&id).unwrap();
                assert!(v >= k.min && v <= k.max, "{} = {}", id, v);
                if id.starts_with('M') {
                    assert_eq!(v.fract(), 0.0);
                }
            }
        }
    }

    #[test]
    fn test_close_twice_fails() {
        let mut s = session();
        s.close().unwrap();
        assert!(matches!(
            s.evaluate(&ParamMap::new()),
            Err(CircusError::Simulation { .. })
        ));
        assert!(matches!(s.close(), Err(CircusError::SessionClose { slot: 0, .. })));
    }

    #[test]
    fn test_unsupported_pdk_rejected() {
        let err = SyntheticBackend::default().make_pool(2, Topology::Miller, Pdk::Gpdk045);
        assert!(matches!(err, Err(CircusError::MissingBounds { .. })));
    }

    #[test]
    fn test_pool_evaluates_subset() {
        let backend = SyntheticBackend::new(3);
        let mut pool = backend.make_pool(3, Topology::Miller, Pdk::Xh035).unwrap();
        assert_eq!(pool.len(), 3);

        let sizing = pool.random_sizing(&[0, 2]).unwrap();
        let perf = pool.evaluate(&sizing).unwrap();
        assert_eq!(perf.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(pool.session(1).unwrap().evaluations(), 0);
        assert_eq!(pool.session(2).unwrap().evaluations(), 1);

        let mut bad = BTreeMap::new();
        bad.insert(5, ParamMap::new());
        assert!(matches!(
            pool.evaluate(&bad),
            Err(CircusError::Simulation { slot: 5, .. })
        ));
    }

    #[test]
    fn test_pool_close_reports_failure() {
        let mut pool = SyntheticBackend::default()
            .make_pool(2, Topology::FoldedCascode, Pdk::Sky130)
            .unwrap();
        pool.session_mut(1).unwrap().close().unwrap();
        let err = pool.close();
        assert!(matches!(err, Err(CircusError::SessionClose { slot: 1, .. })));
        assert!(pool.session(0).unwrap().is_closed());
    }
}
