// src/constraints.rs
//
// Sizing-parameter constraints reported by a simulator session, and the
// geometric unscaler that maps normalized actions onto them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CircusError;

/// A map from parameter name to value (sizing or performance).
pub type ParamMap = BTreeMap<String, f64>;

/// Bounds and initial value of a single netlist parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub min: f64,
    pub max: f64,
    pub init: f64,
    /// Whether the parameter is exposed to the agent as a sizing knob.
    pub sizing: bool,
}

impl Constraint {
    pub fn sizing(min: f64, max: f64, init: f64) -> Self {
        Self {
            min,
            max,
            init,
            sizing: true,
        }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            init: value,
            sizing: false,
        }
    }
}

/// All constraints of a netlist, keyed and iterated in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Constraints {
    params: BTreeMap<String, Constraint>,
}

impl Constraints {
    pub fn new(params: BTreeMap<String, Constraint>) -> Self {
        Self { params }
    }

    pub fn insert(&mut self, id: impl Into<String>, constraint: Constraint) {
        self.params.insert(id.into(), constraint);
    }

    pub fn get(&self, id: &str) -> Option<&Constraint> {
        self.params.get(id)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Constraint)> {
        self.params.iter()
    }

    /// `init` of a parameter, or `default` when the netlist lacks it.
    pub fn init_or(&self, id: &str, default: f64) -> f64 {
        self.params.get(id).map(|c| c.init).unwrap_or(default)
    }

    /// `max` of a parameter, or `default` when the netlist lacks it.
    pub fn max_or(&self, id: &str, default: f64) -> f64 {
        self.params.get(id).map(|c| c.max).unwrap_or(default)
    }

    /// Names of all sizing parameters in sorted order.
    pub fn sizing_identifiers(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, c)| c.sizing)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Initial values of all sizing parameters.
    pub fn initial_sizing(&self) -> ParamMap {
        self.params
            .iter()
            .filter(|(_, c)| c.sizing)
            .map(|(k, c)| (k.clone(), c.init))
            .collect()
    }

    pub fn validate(&self) -> Result<(), CircusError> {
        for (id, c) in &self.params {
            if !(c.min.is_finite() && c.max.is_finite() && c.init.is_finite()) {
                return Err(CircusError::InvalidConstraint {
                    id: id.clone(),
                    message: "min, max and init must be finite".to_string(),
                });
            }
            if c.min > c.max {
                return Err(CircusError::InvalidConstraint {
                    id: id.clone(),
                    message: format!("min {} exceeds max {}", c.min, c.max),
                });
            }
        }
        Ok(())
    }
}

/// Maps a normalized action in `[-1, 1]^n` onto sizing parameters:
/// `x_min + (a + 1) / 2 * (x_max - x_min)` over the sorted sizing ids.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricUnscaler {
    ids: Vec<String>,
    x_min: Vec<f64>,
    x_max: Vec<f64>,
}

impl GeometricUnscaler {
    pub fn new(constraints: &Constraints) -> Self {
        let mut ids = Vec::new();
        let mut x_min = Vec::new();
        let mut x_max = Vec::new();
        for (id, c) in constraints.iter().filter(|(_, c)| c.sizing) {
            ids.push(id.clone());
            x_min.push(c.min);
            x_max.push(c.max);
        }
        Self { ids, x_min, x_max }
    }

    pub fn dim(&self) -> usize {
        self.ids.len()
    }

    pub fn identifiers(&self) -> &[String] {
        &self.ids
    }

    /// Physical values for a normalized action, clipped to `[-1, 1]` first.
    pub fn unscale(&self, action: &[f64]) -> Result<Vec<f64>, CircusError> {
        if action.len() != self.ids.len() {
            return Err(CircusError::shape(
                "geometric action",
                self.ids.len(),
                action.len(),
            ));
        }
        Ok(action
            .iter()
            .zip(self.x_min.iter().zip(&self.x_max))
            .map(|(&a, (&lo, &hi))| {
                let a = if a.is_finite() { a.clamp(-1.0, 1.0) } else { 0.0 };
                lo + (a + 1.0) / 2.0 * (hi - lo)
            })
            .collect())
    }

    pub fn to_sizing(&self, physical: &[f64]) -> ParamMap {
        self.ids.iter().cloned().zip(physical.iter().copied()).collect()
    }
}
