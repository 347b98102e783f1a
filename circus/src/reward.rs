// src/reward.rs
//
// Goal predicates and reward functions.
//
// Goal environments use a binary reward: 0 when every goal parameter
// satisfies its predicate against the desired value, -1 otherwise.
// Non-goal environments default to the sum of the observation vector.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CircusError;
use crate::rl::observation::GoalObservation;

/// Direction of a goal comparison: `achieved <op> desired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    #[serde(rename = "ge")]
    GreaterEqual,
    #[serde(rename = "le")]
    LessEqual,
}

impl Predicate {
    #[inline]
    pub fn holds(&self, achieved: f64, desired: f64) -> bool {
        match self {
            Predicate::GreaterEqual => achieved >= desired,
            Predicate::LessEqual => achieved <= desired,
        }
    }
}

/// Predicate table for op-amp performance parameters.
pub fn predicate_for(id: &str) -> Option<Predicate> {
    use Predicate::{GreaterEqual as Ge, LessEqual as Le};
    let p = match id {
        "A" => Le,
        "a_0" => Ge,
        "cmrr" => Ge,
        "cof" => Ge,
        "gm" => Ge,
        "i_out_max" => Ge,
        "i_out_min" => Ge,
        "idd" => Le,
        "iss" => Le,
        "overshoot_f" => Ge,
        "overshoot_r" => Ge,
        "pm" => Ge,
        "psrr_n" => Ge,
        "psrr_p" => Ge,
        "sr_f" => Ge,
        "sr_r" => Ge,
        "ugbw" => Ge,
        "v_ih" => Ge,
        "v_il" => Le,
        "v_oh" => Ge,
        "v_ol" => Le,
        "vn_100Hz" | "vn_100kHz" | "vn_10Hz" | "vn_10kHz" | "vn_1Hz" | "vn_1kHz" => Le,
        "voff_stat" => Le,
        "voff_sys" => Le,
        _ => return None,
    };
    Some(p)
}

/// Whether `id` is a performance parameter (as opposed to an operating
/// point quantity such as `MND11:gmoverid`).
pub fn is_performance_identifier(id: &str) -> bool {
    predicate_for(id).is_some()
}

/// Predicates for `ids`, in order. Any id without a table entry is an error.
pub fn goal_predicates<S: AsRef<str>>(ids: &[S]) -> Result<Vec<Predicate>, CircusError> {
    ids.iter()
        .map(|id| {
            predicate_for(id.as_ref()).ok_or_else(|| CircusError::UnknownPredicate {
                id: id.as_ref().to_string(),
            })
        })
        .collect()
}

/// Per-row `0.0` if every predicate holds, `-1.0` otherwise.
///
/// Both matrices must have the same number of rows and every row must
/// carry one value per predicate.
pub fn binary_reward(
    predicates: &[Predicate],
    achieved: &[Vec<f64>],
    desired: &[Vec<f64>],
) -> Result<Vec<f64>, CircusError> {
    if achieved.len() != desired.len() {
        return Err(CircusError::shape("desired goal rows", achieved.len(), desired.len()));
    }
    let n = predicates.len();
    achieved
        .iter()
        .zip(desired)
        .map(|(a, d)| {
            if a.len() != n {
                return Err(CircusError::shape("achieved goal row", n, a.len()));
            }
            if d.len() != n {
                return Err(CircusError::shape("desired goal row", n, d.len()));
            }
            let ok = predicates
                .iter()
                .zip(a.iter().zip(d))
                .all(|(p, (&a, &d))| p.holds(a, d));
            Ok(if ok { 0.0 } else { -1.0 })
        })
        .collect()
}

/// Per-row sum of the observation vector.
pub fn sum_reward(observation: &[Vec<f64>]) -> Vec<f64> {
    observation.iter().map(|row| row.iter().sum()).collect()
}

/// User-supplied reward over a full observation.
pub type RewardCallback = Arc<dyn Fn(&GoalObservation) -> Vec<f64> + Send + Sync>;

/// Reward function of an environment.
#[derive(Clone)]
pub enum RewardFn {
    /// Binary goal reward with the given predicates.
    Binary(Vec<Predicate>),
    /// Sum of the observation vector.
    Sum,
    Custom(RewardCallback),
}

impl RewardFn {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&GoalObservation) -> Vec<f64> + Send + Sync + 'static,
    {
        RewardFn::Custom(Arc::new(f))
    }

    pub fn compute(&self, obs: &GoalObservation) -> Result<Vec<f64>, CircusError> {
        match self {
            RewardFn::Binary(preds) => binary_reward(preds, &obs.achieved_goal, &obs.desired_goal),
            RewardFn::Sum => Ok(sum_reward(&obs.observation)),
            RewardFn::Custom(f) => Ok(f(obs)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RewardFn::Binary(_) => "binary",
            RewardFn::Sum => "sum",
            RewardFn::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for RewardFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardFn::Binary(preds) => f.debug_tuple("Binary").field(preds).finish(),
            other => f.write_str(other.name()),
        }
    }
}
