// src/rl/env.rs
//
// Vectorized circuit-sizing environment.
//
// `CircusEnv` owns one simulator session per slot and drives them through
// the reset/step cycle:
//
//   action in [-1, 1]^d -> sizing (geometric unscale, or electrical unscale
//   plus topology transform) -> simulator -> performance -> scaled
//   observation / achieved goal -> reward and done flags.
//
// Goal environments (`v0`) return observation, achieved goal and desired
// goal; non-goal environments (`v1`) use only the observation part and a
// sum reward by default. Goals and step counters are per slot and change
// only when that slot is reset.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ActionMode, EnvConfig, EnvId, EnvVariant, ObsFilter};
use crate::constraints::{Constraints, GeometricUnscaler, ParamMap};
use crate::error::CircusError;
use crate::goal::{GoalGenerator, GoalKind};
use crate::prim::DevicePair;
use crate::reward::{binary_reward, goal_predicates, is_performance_identifier, Predicate, RewardFn};
use crate::scaler::PerformanceScaler;
use crate::sim::{CircuitBackend, CircuitSession, SessionPool};
use crate::telemetry::{EnvRecord, TelemetrySink};
use crate::trafo::{finite_or_zero, ElectricalUnscaler};

use super::observation::{GoalObservation, GoalObservationRow};
use super::spaces::{BoxSpace, ObservationSpace};

/// Which slots a reset applies to.
///
/// A mask with at least one `true` entry wins over `ids`; with neither,
/// every slot is reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetTarget {
    pub mask: Option<Vec<bool>>,
    pub ids: Option<Vec<usize>>,
}

impl ResetTarget {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: Vec<usize>) -> Self {
        Self {
            mask: None,
            ids: Some(ids),
        }
    }

    pub fn mask(mask: Vec<bool>) -> Self {
        Self {
            mask: Some(mask),
            ids: None,
        }
    }

    /// Sorted, deduplicated slot indices.
    pub fn resolve(&self, num_envs: usize) -> Result<Vec<usize>, CircusError> {
        if let Some(mask) = self.mask.as_ref().filter(|m| m.iter().any(|&b| b)) {
            if mask.len() != num_envs {
                return Err(CircusError::shape("reset mask", num_envs, mask.len()));
            }
            return Ok(mask
                .iter()
                .enumerate()
                .filter(|(_, &b)| b)
                .map(|(i, _)| i)
                .collect());
        }
        if let Some(ids) = self.ids.as_ref().filter(|ids| !ids.is_empty()) {
            let mut slots = ids.clone();
            slots.sort_unstable();
            slots.dedup();
            if let Some(&bad) = slots.iter().find(|&&i| i >= num_envs) {
                return Err(CircusError::shape("reset slot id (exclusive bound)", num_envs, bad));
            }
            return Ok(slots);
        }
        Ok((0..num_envs).collect())
    }
}

/// Per-slot step information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Step counter after this step (before any automatic reset).
    pub steps: usize,
    /// Every goal predicate held.
    pub success: bool,
    /// Episode ended by the step limit without success.
    pub truncated: bool,
    pub observation_keys: Vec<String>,
    pub goal_keys: Vec<String>,
    pub action_keys: Vec<String>,
    /// Last observation of an automatically reset slot.
    pub terminal_observation: Option<GoalObservationRow>,
}

/// Result of one vectorized step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: GoalObservation,
    pub reward: Vec<f64>,
    pub done: Vec<bool>,
    pub info: Vec<StepInfo>,
}

/// Turns clipped actions into sizing maps.
#[derive(Debug)]
enum ActionMap {
    Geometric(GeometricUnscaler),
    Electrical {
        unscaler: ElectricalUnscaler,
        devices: DevicePair,
    },
}

/// Clipped actions and their sizing, applied once simulation succeeds.
#[derive(Debug)]
struct PendingStep {
    actions: Vec<Vec<f64>>,
    sizing: BTreeMap<usize, ParamMap>,
}

#[derive(Debug)]
pub struct CircusEnv<S> {
    id: EnvId,
    config: EnvConfig,
    pool: SessionPool<S>,
    constraints: Constraints,
    action_map: ActionMap,
    action_keys: Vec<String>,
    obs_keys: Vec<String>,
    goal_keys: Vec<String>,
    obs_scaler: PerformanceScaler,
    goal_scaler: PerformanceScaler,
    predicates: Vec<Predicate>,
    reward: RewardFn,
    goal_gen: GoalGenerator,
    /// Raw desired goal per slot.
    goal: Vec<Vec<f64>>,
    performance: Vec<ParamMap>,
    sizing: Vec<ParamMap>,
    last_action: Vec<Vec<f64>>,
    steps: Vec<usize>,
    /// Submitted by `step_async`, consumed by `step_wait`.
    pending: Option<PendingStep>,
    action_space: BoxSpace,
    observation_space: ObservationSpace,
    rng: ChaCha8Rng,
    telemetry: TelemetrySink,
}

fn select_observation(filter: &ObsFilter, reported: &[String]) -> Result<Vec<String>, CircusError> {
    match filter {
        ObsFilter::Perf => Ok(reported
            .iter()
            .filter(|id| is_performance_identifier(id))
            .cloned()
            .collect()),
        ObsFilter::All => Ok(reported.to_vec()),
        ObsFilter::List(ids) => {
            for id in ids {
                if !reported.contains(id) {
                    return Err(CircusError::ParameterOrder {
                        message: format!("observation parameter '{}' is not reported by the simulator", id),
                    });
                }
            }
            Ok(ids.clone())
        }
    }
}

fn raw_row(perf: &ParamMap, keys: &[String]) -> Vec<f64> {
    keys.iter()
        .map(|k| finite_or_zero(perf.get(k).copied().unwrap_or(0.0)))
        .collect()
}

fn all_slots(pool_len: usize) -> Vec<usize> {
    (0..pool_len).collect()
}

impl<S: CircuitSession> CircusEnv<S> {
    /// Open `config.num_envs` sessions on `backend`. Electrical environments
    /// load device models from `config.resolve_model_dir`.
    pub fn new<B>(backend: &B, id: EnvId, config: EnvConfig) -> Result<Self, CircusError>
    where
        B: CircuitBackend<Session = S>,
    {
        let devices = match id.mode {
            ActionMode::Geometric => None,
            ActionMode::Electrical => Some(DevicePair::load(&config.resolve_model_dir(id.pdk))?),
        };
        let pool = backend.make_pool(config.num_envs, id.topology, id.pdk)?;
        Self::from_pool(pool, id, config, devices)
    }

    /// Like [`new`](Self::new) with device models supplied by the caller.
    pub fn with_devices<B>(
        backend: &B,
        id: EnvId,
        config: EnvConfig,
        devices: DevicePair,
    ) -> Result<Self, CircusError>
    where
        B: CircuitBackend<Session = S>,
    {
        let pool = backend.make_pool(config.num_envs, id.topology, id.pdk)?;
        Self::from_pool(pool, id, config, Some(devices))
    }

    pub fn from_pool(
        mut pool: SessionPool<S>,
        id: EnvId,
        config: EnvConfig,
        devices: Option<DevicePair>,
    ) -> Result<Self, CircusError> {
        let num_envs = pool.len();
        if num_envs != config.num_envs {
            return Err(CircusError::shape("session pool", config.num_envs, num_envs));
        }

        let constraints = pool.parameter_dict();
        constraints.validate()?;
        let reported = pool.performance_identifiers();

        let obs_keys = select_observation(&config.obs_filter, &reported)?;
        let goal_keys = match &config.goal_filter {
            Some(ids) => ids.clone(),
            None => obs_keys
                .iter()
                .filter(|id| is_performance_identifier(id))
                .cloned()
                .collect(),
        };
        if let Some(missing) = goal_keys.iter().find(|id| !reported.contains(id)) {
            return Err(CircusError::ParameterOrder {
                message: format!("goal parameter '{}' is not reported by the simulator", missing),
            });
        }
        let predicates = goal_predicates(&goal_keys)?;

        let bounds = id.topology.performance_bounds(id.pdk, &constraints)?;
        let obs_scaler = PerformanceScaler::new(&obs_keys, &bounds)?;
        let goal_scaler = PerformanceScaler::new(&goal_keys, &bounds)?;

        let (action_map, action_keys) = match id.mode {
            ActionMode::Geometric => {
                let unscaler = GeometricUnscaler::new(&constraints);
                let keys = unscaler.identifiers().to_vec();
                (ActionMap::Geometric(unscaler), keys)
            }
            ActionMode::Electrical => {
                let unscaler = id.topology.electrical_unscaler(id.pdk)?;
                let Some(devices) = devices else {
                    return Err(CircusError::MissingArtifact {
                        path: config.resolve_model_dir(id.pdk).display().to_string(),
                    });
                };
                let keys = id
                    .topology
                    .electrical_identifiers()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                (ActionMap::Electrical { unscaler, devices }, keys)
            }
        };
        let action_space = BoxSpace::symmetric(action_keys.len());

        let column_space = |scaler: &PerformanceScaler| {
            let (low, high): (Vec<f64>, Vec<f64>) = (0..scaler.dim())
                .map(|i| {
                    if config.scale_observation && scaler.is_scaled(i) {
                        (-1.0, 1.0)
                    } else {
                        (f64::NEG_INFINITY, f64::INFINITY)
                    }
                })
                .unzip();
            BoxSpace { low, high }
        };
        let observation_space = match id.variant {
            EnvVariant::Goal => ObservationSpace::Dict {
                observation: column_space(&obs_scaler),
                achieved_goal: column_space(&goal_scaler),
                desired_goal: column_space(&goal_scaler),
            },
            EnvVariant::NonGoal => ObservationSpace::Box(column_space(&obs_scaler)),
        };

        // Reference pass at the netlist's initial sizing.
        let slots = all_slots(num_envs);
        let initial = pool.initial_sizing(&slots)?;
        let perf = pool.evaluate(&initial)?;
        let performance: Vec<ParamMap> = slots
            .iter()
            .map(|s| perf.get(s).cloned().unwrap_or_default())
            .collect();
        let sizing: Vec<ParamMap> = slots
            .iter()
            .map(|s| initial.get(s).cloned().unwrap_or_default())
            .collect();
        let simulated: Vec<Vec<f64>> = performance.iter().map(|p| raw_row(p, &goal_keys)).collect();

        let reference = match &config.goal_reference {
            Some(rows) => rows.clone(),
            None => match config.goal_kind {
                GoalKind::Noisy | GoalKind::Fix => simulated,
                GoalKind::Random => {
                    let curated = id.topology.reference_goal(id.pdk, &constraints)?;
                    let (lo, hi): (Vec<f64>, Vec<f64>) = goal_keys
                        .iter()
                        .zip(&simulated[0])
                        .map(|(k, &s)| {
                            let c = curated.get(k).copied().unwrap_or(s);
                            (s.min(c), s.max(c))
                        })
                        .unzip();
                    vec![lo, hi]
                }
            },
        };
        let mut goal_gen = GoalGenerator::new(
            config.goal_kind,
            reference,
            num_envs,
            config.goal_noise,
            config.seed,
        )?;
        let goal = goal_gen.generate();

        let reward = match id.variant {
            EnvVariant::Goal => RewardFn::Binary(predicates.clone()),
            EnvVariant::NonGoal => RewardFn::Sum,
        };

        Ok(Self {
            id,
            pool,
            constraints,
            action_map,
            last_action: vec![vec![0.0; action_keys.len()]; num_envs],
            action_keys,
            obs_keys,
            goal_keys,
            obs_scaler,
            goal_scaler,
            predicates,
            reward,
            goal_gen,
            goal,
            performance,
            sizing,
            steps: vec![0; num_envs],
            pending: None,
            action_space,
            observation_space,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            telemetry: TelemetrySink::from_env(),
            config,
        })
    }

    /// Replace the reward function.
    pub fn with_reward(mut self, reward: RewardFn) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.telemetry = telemetry;
        self
    }

    // ----- Accessors -----

    pub fn id(&self) -> EnvId {
        self.id
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn num_envs(&self) -> usize {
        self.steps.len()
    }

    pub fn num_steps(&self) -> usize {
        self.config.num_steps
    }

    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    pub fn observation_space(&self) -> &ObservationSpace {
        &self.observation_space
    }

    pub fn action_keys(&self) -> &[String] {
        &self.action_keys
    }

    pub fn observation_keys(&self) -> &[String] {
        &self.obs_keys
    }

    pub fn goal_keys(&self) -> &[String] {
        &self.goal_keys
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn reward_fn(&self) -> &RewardFn {
        &self.reward
    }

    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    /// Last raw (unsanitized) performance per slot.
    pub fn current_performance(&self) -> &[ParamMap] {
        &self.performance
    }

    /// Raw desired goal per slot, in [`goal_keys`](Self::goal_keys) order.
    pub fn current_goal(&self) -> &[Vec<f64>] {
        &self.goal
    }

    pub fn current_sizing(&self) -> &[ParamMap] {
        &self.sizing
    }

    /// Last clipped action per slot (zeros after a reset).
    pub fn last_action(&self) -> &[Vec<f64>] {
        &self.last_action
    }

    pub fn pool(&self) -> &SessionPool<S> {
        &self.pool
    }

    // ----- Observation -----

    fn scale_rows(&self, scaler: &PerformanceScaler, rows: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, CircusError> {
        if self.config.scale_observation {
            scaler.scale(&rows)
        } else {
            Ok(rows)
        }
    }

    /// Observation for every slot from the cached performance and goals.
    pub fn current_observation(&self) -> Result<GoalObservation, CircusError> {
        let observation = self.performance.iter().map(|p| raw_row(p, &self.obs_keys)).collect();
        let achieved = self.performance.iter().map(|p| raw_row(p, &self.goal_keys)).collect();
        let desired = self
            .goal
            .iter()
            .map(|g| g.iter().copied().map(finite_or_zero).collect())
            .collect();
        Ok(GoalObservation {
            observation: self.scale_rows(&self.obs_scaler, observation)?,
            achieved_goal: self.scale_rows(&self.goal_scaler, achieved)?,
            desired_goal: self.scale_rows(&self.goal_scaler, desired)?,
        })
    }

    pub fn compute_reward(&self, obs: &GoalObservation) -> Result<Vec<f64>, CircusError> {
        self.reward.compute(obs)
    }

    fn success(&self, obs: &GoalObservation, reward: &[f64]) -> Result<Vec<bool>, CircusError> {
        let reached = match self.id.variant {
            EnvVariant::Goal => reward.iter().map(|&r| r == 0.0).collect(),
            EnvVariant::NonGoal => {
                binary_reward(&self.predicates, &obs.achieved_goal, &obs.desired_goal)?
                    .into_iter()
                    .map(|r| r == 0.0)
                    .collect()
            }
        };
        Ok(reached)
    }

    // ----- Reset -----

    pub fn reset(&mut self, target: &ResetTarget) -> Result<GoalObservation, CircusError> {
        let slots = target.resolve(self.num_envs())?;
        self.reset_slots(&slots)?;
        let steps = slots.iter().map(|&s| self.steps[s]).collect();
        self.telemetry
            .record(&EnvRecord::reset(&self.id.to_string(), slots, steps));
        self.current_observation()
    }

    pub fn reset_all(&mut self) -> Result<GoalObservation, CircusError> {
        self.reset(&ResetTarget::all())
    }

    /// New sizing, performance, goal and zeroed counter for `slots` only.
    fn reset_slots(&mut self, slots: &[usize]) -> Result<(), CircusError> {
        self.pending = None;
        let sizing = match self.config.reset_sizing.as_ref().filter(|s| !s.is_empty()) {
            Some(states) => slots
                .iter()
                .map(|&s| (s, states[s % states.len()].clone()))
                .collect(),
            None => self.pool.random_sizing(slots)?,
        };
        let perf = self.pool.evaluate(&sizing)?;
        for (slot, p) in perf {
            self.performance[slot] = p;
        }
        for (slot, s) in sizing {
            self.sizing[slot] = s;
        }

        let fresh = self.goal_gen.generate();
        let dim = self.action_keys.len();
        for &slot in slots {
            if let Some(g) = fresh.get(slot) {
                self.goal[slot] = g.clone();
            }
            self.steps[slot] = 0;
            self.last_action[slot] = vec![0.0; dim];
        }
        Ok(())
    }

    // ----- Step -----

    /// Physical sizing for one clipped action.
    pub fn action_to_sizing(&self, action: &[f64]) -> Result<ParamMap, CircusError> {
        match &self.action_map {
            ActionMap::Geometric(unscaler) => {
                let physical = unscaler.unscale(action)?;
                Ok(unscaler.to_sizing(&physical))
            }
            ActionMap::Electrical { unscaler, devices } => {
                let params = unscaler.unscale(action)?;
                self.id.topology.transform(&self.constraints, devices, &params)
            }
        }
    }

    /// Clip and convert one action per slot; simulation happens in
    /// [`step_wait`](Self::step_wait).
    pub fn step_async(&mut self, actions: &[Vec<f64>]) -> Result<(), CircusError> {
        if actions.len() != self.num_envs() {
            return Err(CircusError::shape("actions", self.num_envs(), actions.len()));
        }
        let mut clipped = Vec::with_capacity(actions.len());
        let mut batch = BTreeMap::new();
        for (slot, action) in actions.iter().enumerate() {
            let a = self.action_space.clip(action)?;
            batch.insert(slot, self.action_to_sizing(&a)?);
            clipped.push(a);
        }
        self.pending = Some(PendingStep {
            actions: clipped,
            sizing: batch,
        });
        Ok(())
    }

    pub fn step_wait(&mut self) -> Result<StepOutcome, CircusError> {
        let pending = self.pending.take().ok_or_else(|| CircusError::ParameterOrder {
            message: "step_wait called without a pending step_async".to_string(),
        })?;
        let perf = self.pool.evaluate(&pending.sizing)?;
        for (slot, p) in perf {
            self.performance[slot] = p;
        }
        for (slot, s) in pending.sizing {
            self.sizing[slot] = s;
        }
        self.last_action = pending.actions;
        for s in &mut self.steps {
            *s += 1;
        }

        let mut observation = self.current_observation()?;
        let reward = self.compute_reward(&observation)?;
        if reward.len() != self.num_envs() {
            return Err(CircusError::shape("reward", self.num_envs(), reward.len()));
        }
        let success = self.success(&observation, &reward)?;
        let limit = self.config.num_steps;
        let done: Vec<bool> = success
            .iter()
            .zip(&self.steps)
            .map(|(&ok, &n)| ok || n >= limit)
            .collect();

        let mut info: Vec<StepInfo> = (0..self.num_envs())
            .map(|i| StepInfo {
                steps: self.steps[i],
                success: success[i],
                truncated: !success[i] && self.steps[i] >= limit,
                observation_keys: self.obs_keys.clone(),
                goal_keys: self.goal_keys.clone(),
                action_keys: self.action_keys.clone(),
                terminal_observation: None,
            })
            .collect();

        if self.config.auto_reset {
            let finished: Vec<usize> = (0..done.len()).filter(|&i| done[i]).collect();
            if !finished.is_empty() {
                for &i in &finished {
                    info[i].terminal_observation = observation.row(i);
                }
                self.reset_slots(&finished)?;
                observation = self.current_observation()?;
            }
        }

        self.telemetry.record(&EnvRecord::step(
            &self.id.to_string(),
            info.iter().map(|i| i.steps).collect(),
            reward.clone(),
            done.clone(),
        ));

        Ok(StepOutcome {
            observation,
            reward,
            done,
            info,
        })
    }

    pub fn step(&mut self, actions: &[Vec<f64>]) -> Result<StepOutcome, CircusError> {
        self.step_async(actions)?;
        self.step_wait()
    }

    /// One uniformly sampled action per slot.
    pub fn sample_actions(&mut self) -> Vec<Vec<f64>> {
        (0..self.num_envs())
            .map(|_| self.action_space.sample(&mut self.rng))
            .collect()
    }

    // ----- Introspection -----

    /// Evaluate the given sizings without touching counters or goals.
    pub fn restore(&mut self, sizing: &BTreeMap<usize, ParamMap>) -> Result<GoalObservation, CircusError> {
        let perf = self.pool.evaluate(sizing)?;
        for (slot, p) in perf {
            self.performance[slot] = p;
        }
        for (&slot, s) in sizing {
            self.sizing[slot] = s.clone();
        }
        self.current_observation()
    }

    /// Re-evaluate the current sizing of every slot.
    pub fn restore_last(&mut self) -> Result<GoalObservation, CircusError> {
        let sizing: BTreeMap<usize, ParamMap> = self.sizing.iter().cloned().enumerate().collect();
        self.restore(&sizing)
    }

    /// Reseed the goal generator and the action sampler. `None` reuses the
    /// configured seed.
    pub fn seed(&mut self, seed: Option<u64>) -> u64 {
        let s = seed.unwrap_or(self.config.seed);
        self.goal_gen.reseed(s);
        self.rng = ChaCha8Rng::seed_from_u64(s);
        self.config.seed = s;
        s
    }

    pub fn render(&self) {}

    /// Close every session. Failures are reported after all sessions were
    /// asked to close.
    pub fn close(&mut self) -> Result<(), CircusError> {
        self.pending = None;
        self.telemetry.flush();
        self.pool.close()
    }
}
