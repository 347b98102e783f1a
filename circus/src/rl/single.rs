// src/rl/single.rs
//
// Single-slot view of a `CircusEnv`: one circuit instance, observations and
// rewards without the leading slot dimension.

use serde::{Deserialize, Serialize};

use crate::config::{EnvConfig, EnvId};
use crate::error::CircusError;
use crate::prim::DevicePair;
use crate::reward::RewardFn;
use crate::sim::{CircuitBackend, CircuitSession};

use super::env::{CircusEnv, ResetTarget, StepInfo};
use super::observation::{GoalObservation, GoalObservationRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleStep {
    pub observation: GoalObservationRow,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

#[derive(Debug)]
pub struct SingleEnv<S> {
    inner: CircusEnv<S>,
}

fn first_row(obs: &GoalObservation) -> Result<GoalObservationRow, CircusError> {
    obs.row(0)
        .ok_or_else(|| CircusError::shape("observation rows", 1, obs.num_envs()))
}

impl<S: CircuitSession> SingleEnv<S> {
    /// `config.num_envs` is forced to 1.
    pub fn new<B>(backend: &B, id: EnvId, config: EnvConfig) -> Result<Self, CircusError>
    where
        B: CircuitBackend<Session = S>,
    {
        let inner = CircusEnv::new(backend, id, config.with_num_envs(1))?;
        Ok(Self { inner })
    }

    pub fn with_devices<B>(
        backend: &B,
        id: EnvId,
        config: EnvConfig,
        devices: DevicePair,
    ) -> Result<Self, CircusError>
    where
        B: CircuitBackend<Session = S>,
    {
        let inner = CircusEnv::with_devices(backend, id, config.with_num_envs(1), devices)?;
        Ok(Self { inner })
    }

    pub fn with_reward(self, reward: RewardFn) -> Self {
        Self {
            inner: self.inner.with_reward(reward),
        }
    }

    pub fn inner(&self) -> &CircusEnv<S> {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut CircusEnv<S> {
        &mut self.inner
    }

    pub fn reset(&mut self) -> Result<GoalObservationRow, CircusError> {
        let obs = self.inner.reset(&ResetTarget::all())?;
        first_row(&obs)
    }

    pub fn step(&mut self, action: &[f64]) -> Result<SingleStep, CircusError> {
        let out = self.inner.step(&[action.to_vec()])?;
        let observation = first_row(&out.observation)?;
        let (Some(&reward), Some(&done), Some(info)) =
            (out.reward.first(), out.done.first(), out.info.into_iter().next())
        else {
            return Err(CircusError::shape("step outcome rows", 1, 0));
        };
        Ok(SingleStep {
            observation,
            reward,
            done,
            info,
        })
    }

    pub fn sample_action(&mut self) -> Vec<f64> {
        self.inner.sample_actions().into_iter().next().unwrap_or_default()
    }

    pub fn seed(&mut self, seed: Option<u64>) -> u64 {
        self.inner.seed(seed)
    }

    pub fn close(&mut self) -> Result<(), CircusError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionMode, EnvVariant};
    use crate::pdk::Pdk;
    use crate::sim::SyntheticBackend;
    use crate::topology::Topology;

    #[test]
    fn test_single_env_unwraps_slot() {
        let id = EnvId::new(Topology::FoldedCascode, Pdk::Sky130, ActionMode::Geometric, EnvVariant::NonGoal);
        let cfg = EnvConfig::default().with_num_envs(4).with_num_steps(2);
        let mut env = SingleEnv::new(&SyntheticBackend::new(2), id, cfg).unwrap();
        assert_eq!(env.inner().num_envs(), 1);

        let obs = env.reset().unwrap();
        assert_eq!(obs.observation.len(), env.inner().observation_keys().len());

        let a = env.sample_action();
        let first = env.step(&a).unwrap();
        let expected: f64 = first.observation.observation.iter().sum();
        assert!((first.reward - expected).abs() < 1e-12);
        assert_eq!(first.info.steps, 1);

        let a = env.sample_action();
        let second = env.step(&a).unwrap();
        assert!(second.done);
        env.close().unwrap();
    }
}
