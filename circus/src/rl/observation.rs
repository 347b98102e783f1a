// src/rl/observation.rs
//
// Observation containers returned by the environments.
//
// Every matrix is slot-major: row `i` belongs to slot `i`, columns follow
// the environment's observation or goal parameter order.

use serde::{Deserialize, Serialize};

/// Keys of the dict observation of goal environments.
pub const OBSERVATION_KEYS: [&str; 3] = ["observation", "achieved_goal", "desired_goal"];

/// Goal-conditioned observation for all slots.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalObservation {
    pub observation: Vec<Vec<f64>>,
    pub achieved_goal: Vec<Vec<f64>>,
    pub desired_goal: Vec<Vec<f64>>,
}

/// One slot of a [`GoalObservation`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalObservationRow {
    pub observation: Vec<f64>,
    pub achieved_goal: Vec<f64>,
    pub desired_goal: Vec<f64>,
}

impl GoalObservation {
    pub fn num_envs(&self) -> usize {
        self.observation.len()
    }

    pub fn row(&self, slot: usize) -> Option<GoalObservationRow> {
        Some(GoalObservationRow {
            observation: self.observation.get(slot)?.clone(),
            achieved_goal: self.achieved_goal.get(slot)?.clone(),
            desired_goal: self.desired_goal.get(slot)?.clone(),
        })
    }

    /// Stack single-slot rows back into a batch.
    pub fn from_rows(rows: Vec<GoalObservationRow>) -> Self {
        let mut out = GoalObservation::default();
        for r in rows {
            out.observation.push(r.observation);
            out.achieved_goal.push(r.achieved_goal);
            out.desired_goal.push(r.desired_goal);
        }
        out
    }
}
