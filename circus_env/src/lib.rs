// circus_env/src/lib.rs
//
// Python bindings for the circus sizing environments.
//
// Provides a Gym-style API over the synthetic simulator backend:
// - GoalEnv: single environment with reset() and step(action)
// - VecEnv: vectorised environment with slot-selective resets
//
// Goal environments (`...-v0`) return observation dicts with
// `observation`, `achieved_goal` and `desired_goal`; non-goal environments
// (`...-v1`) return plain lists.

use std::path::PathBuf;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use circus::{
    CircusEnv as RustCircusEnv, CircusError, EnvConfig, EnvId, EnvVariant, GoalKind,
    GoalObservation, GoalObservationRow, Pdk, ResetTarget, SingleEnv as RustSingleEnv, StepInfo,
    SyntheticBackend, SyntheticSession, Topology,
};

type Inner = RustCircusEnv<SyntheticSession>;

fn to_py_err(e: CircusError) -> PyErr {
    match e {
        CircusError::Simulation { .. } | CircusError::SessionClose { .. } => {
            PyRuntimeError::new_err(e.to_string())
        }
        _ => PyValueError::new_err(e.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_config(
    num_envs: usize,
    num_steps: usize,
    seed: u64,
    goal_kind: &str,
    scale_observation: bool,
    auto_reset: bool,
    model_dir: Option<PathBuf>,
) -> PyResult<EnvConfig> {
    if num_envs == 0 {
        return Err(PyValueError::new_err("num_envs must be > 0"));
    }
    let mut cfg = EnvConfig::default()
        .with_num_envs(num_envs)
        .with_num_steps(num_steps)
        .with_seed(seed)
        .with_goal_kind(GoalKind::parse(goal_kind).map_err(to_py_err)?);
    cfg.scale_observation = scale_observation;
    cfg.auto_reset = auto_reset;
    cfg.model_dir = model_dir;
    Ok(cfg)
}

/// Convert a batch observation to a Python object.
fn observation_to_py(py: Python<'_>, variant: EnvVariant, obs: &GoalObservation) -> PyResult<PyObject> {
    match variant {
        EnvVariant::Goal => {
            let dict = PyDict::new_bound(py);
            dict.set_item("observation", obs.observation.clone())?;
            dict.set_item("achieved_goal", obs.achieved_goal.clone())?;
            dict.set_item("desired_goal", obs.desired_goal.clone())?;
            Ok(dict.into_any().unbind())
        }
        EnvVariant::NonGoal => Ok(PyList::new_bound(py, obs.observation.clone()).into_any().unbind()),
    }
}

/// Convert one slot's observation to a Python object.
fn row_to_py(py: Python<'_>, variant: EnvVariant, row: &GoalObservationRow) -> PyResult<PyObject> {
    match variant {
        EnvVariant::Goal => {
            let dict = PyDict::new_bound(py);
            dict.set_item("observation", row.observation.clone())?;
            dict.set_item("achieved_goal", row.achieved_goal.clone())?;
            dict.set_item("desired_goal", row.desired_goal.clone())?;
            Ok(dict.into_any().unbind())
        }
        EnvVariant::NonGoal => Ok(PyList::new_bound(py, row.observation.clone()).into_any().unbind()),
    }
}

fn step_info_to_dict(py: Python<'_>, variant: EnvVariant, info: &StepInfo) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);

    dict.set_item("steps", info.steps)?;
    dict.set_item("is_success", info.success)?;
    dict.set_item("truncated", info.truncated)?;
    dict.set_item("observation_keys", info.observation_keys.clone())?;
    dict.set_item("goal_keys", info.goal_keys.clone())?;
    dict.set_item("action_keys", info.action_keys.clone())?;
    if let Some(row) = &info.terminal_observation {
        dict.set_item("terminal_observation", row_to_py(py, variant, row)?)?;
    }

    Ok(dict.into())
}

/// Vectorised circuit sizing environment.
///
/// Args:
///     env_id: e.g. "op2-xh035-geom-v0"
///     num_envs: number of parallel circuit instances (default: 1)
///     num_steps: episode length (default: 50)
///     seed: goal and action sampling seed (default: 666)
///     goal_kind: "noisy", "random" or "fix" (default: "noisy")
///     scale_observation: map observations into [-1, 1] (default: True)
///     auto_reset: reset finished slots inside step (default: False)
///     model_dir: device model directory for electrical environments
#[pyclass]
pub struct VecEnv {
    inner: Inner,
}

#[pymethods]
impl VecEnv {
    #[new]
    #[pyo3(signature = (
        env_id,
        num_envs=1,
        num_steps=50,
        seed=666,
        goal_kind="noisy",
        scale_observation=true,
        auto_reset=false,
        model_dir=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        env_id: &str,
        num_envs: usize,
        num_steps: usize,
        seed: u64,
        goal_kind: &str,
        scale_observation: bool,
        auto_reset: bool,
        model_dir: Option<PathBuf>,
    ) -> PyResult<Self> {
        let id = EnvId::parse(env_id).map_err(to_py_err)?;
        let cfg = build_config(
            num_envs,
            num_steps,
            seed,
            goal_kind,
            scale_observation,
            auto_reset,
            model_dir,
        )?;
        let inner = RustCircusEnv::new(&SyntheticBackend::new(seed), id, cfg).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Reset the selected slots (all when neither argument is given).
    ///
    /// Returns:
    ///     Observation of every slot
    #[pyo3(signature = (env_ids=None, env_mask=None))]
    fn reset(
        &mut self,
        py: Python<'_>,
        env_ids: Option<Vec<usize>>,
        env_mask: Option<Vec<bool>>,
    ) -> PyResult<PyObject> {
        let target = ResetTarget {
            mask: env_mask,
            ids: env_ids,
        };
        let obs = self.inner.reset(&target).map_err(to_py_err)?;
        observation_to_py(py, self.inner.id().variant, &obs)
    }

    /// Step all slots.
    ///
    /// Args:
    ///     actions: one action per slot, each in [-1, 1]^d
    ///
    /// Returns:
    ///     Tuple of (observation, rewards, dones, infos)
    #[allow(clippy::type_complexity)]
    fn step(
        &mut self,
        py: Python<'_>,
        actions: Vec<Vec<f64>>,
    ) -> PyResult<(PyObject, Vec<f64>, Vec<bool>, Vec<Py<PyDict>>)> {
        self.step_async(actions)?;
        self.step_wait(py)
    }

    fn step_async(&mut self, actions: Vec<Vec<f64>>) -> PyResult<()> {
        self.inner.step_async(&actions).map_err(to_py_err)
    }

    #[allow(clippy::type_complexity)]
    fn step_wait(&mut self, py: Python<'_>) -> PyResult<(PyObject, Vec<f64>, Vec<bool>, Vec<Py<PyDict>>)> {
        let out = self.inner.step_wait().map_err(to_py_err)?;
        let variant = self.inner.id().variant;
        let infos = out
            .info
            .iter()
            .map(|i| step_info_to_dict(py, variant, i))
            .collect::<PyResult<Vec<_>>>()?;
        Ok((observation_to_py(py, variant, &out.observation)?, out.reward, out.done, infos))
    }

    /// Reward for arbitrary achieved/desired goal batches (hindsight
    /// relabelling). The observation part is set to the achieved goal.
    fn compute_reward(&self, achieved_goal: Vec<Vec<f64>>, desired_goal: Vec<Vec<f64>>) -> PyResult<Vec<f64>> {
        if achieved_goal.len() != desired_goal.len() {
            return Err(PyValueError::new_err(format!(
                "achieved_goal has {} rows but desired_goal has {}",
                achieved_goal.len(),
                desired_goal.len()
            )));
        }
        let obs = GoalObservation {
            observation: achieved_goal.clone(),
            achieved_goal,
            desired_goal,
        };
        self.inner.compute_reward(&obs).map_err(to_py_err)
    }

    fn sample_actions(&mut self) -> Vec<Vec<f64>> {
        self.inner.sample_actions()
    }

    /// Re-evaluate the current sizing of every slot.
    fn restore_last(&mut self, py: Python<'_>) -> PyResult<PyObject> {
        let obs = self.inner.restore_last().map_err(to_py_err)?;
        observation_to_py(py, self.inner.id().variant, &obs)
    }

    #[pyo3(signature = (seed=None))]
    fn seed(&mut self, seed: Option<u64>) -> u64 {
        self.inner.seed(seed)
    }

    fn render(&self) {
        self.inner.render()
    }

    fn close(&mut self) -> PyResult<()> {
        self.inner.close().map_err(to_py_err)
    }

    #[getter]
    fn env_id(&self) -> String {
        self.inner.id().to_string()
    }

    #[getter]
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    #[getter]
    fn num_steps(&self) -> usize {
        self.inner.num_steps()
    }

    #[getter]
    fn steps(&self) -> Vec<usize> {
        self.inner.steps().to_vec()
    }

    #[getter]
    fn action_keys(&self) -> Vec<String> {
        self.inner.action_keys().to_vec()
    }

    #[getter]
    fn observation_keys(&self) -> Vec<String> {
        self.inner.observation_keys().to_vec()
    }

    #[getter]
    fn goal_keys(&self) -> Vec<String> {
        self.inner.goal_keys().to_vec()
    }

    /// `(low, high)` of the action box.
    #[getter]
    fn action_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let space = self.inner.action_space();
        (space.low.clone(), space.high.clone())
    }

    /// `(low, high)` of the observation box (the `observation` entry for
    /// goal environments).
    #[getter]
    fn observation_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let space = self.inner.observation_space().observation();
        (space.low.clone(), space.high.clone())
    }
}

/// Single circuit sizing environment.
///
/// Same arguments as `VecEnv` without `num_envs`.
#[pyclass]
pub struct GoalEnv {
    inner: RustSingleEnv<SyntheticSession>,
}

#[pymethods]
impl GoalEnv {
    #[new]
    #[pyo3(signature = (
        env_id,
        num_steps=50,
        seed=666,
        goal_kind="noisy",
        scale_observation=true,
        model_dir=None
    ))]
    fn new(
        env_id: &str,
        num_steps: usize,
        seed: u64,
        goal_kind: &str,
        scale_observation: bool,
        model_dir: Option<PathBuf>,
    ) -> PyResult<Self> {
        let id = EnvId::parse(env_id).map_err(to_py_err)?;
        let cfg = build_config(1, num_steps, seed, goal_kind, scale_observation, false, model_dir)?;
        let inner = RustSingleEnv::new(&SyntheticBackend::new(seed), id, cfg).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    fn reset(&mut self, py: Python<'_>) -> PyResult<PyObject> {
        let row = self.inner.reset().map_err(to_py_err)?;
        row_to_py(py, self.inner.inner().id().variant, &row)
    }

    /// Returns:
    ///     Tuple of (observation, reward, done, info)
    fn step(&mut self, py: Python<'_>, action: Vec<f64>) -> PyResult<(PyObject, f64, bool, Py<PyDict>)> {
        let out = self.inner.step(&action).map_err(to_py_err)?;
        let variant = self.inner.inner().id().variant;
        Ok((
            row_to_py(py, variant, &out.observation)?,
            out.reward,
            out.done,
            step_info_to_dict(py, variant, &out.info)?,
        ))
    }

    fn sample_action(&mut self) -> Vec<f64> {
        self.inner.sample_action()
    }

    #[pyo3(signature = (seed=None))]
    fn seed(&mut self, seed: Option<u64>) -> u64 {
        self.inner.seed(seed)
    }

    fn close(&mut self) -> PyResult<()> {
        self.inner.close().map_err(to_py_err)
    }

    #[getter]
    fn env_id(&self) -> String {
        self.inner.inner().id().to_string()
    }

    #[getter]
    fn action_keys(&self) -> Vec<String> {
        self.inner.inner().action_keys().to_vec()
    }

    #[getter]
    fn goal_keys(&self) -> Vec<String> {
        self.inner.inner().goal_keys().to_vec()
    }
}

/// Every registered environment id.
#[pyfunction]
fn env_ids() -> Vec<String> {
    let mut ids = Vec::new();
    for topology in Topology::ALL {
        for pdk in topology.supported_pdks() {
            for space in ["geom", "elec"] {
                for v in 0..2 {
                    ids.push(format!("{}-{}-{}-v{}", topology.ace_id(), pdk.as_str(), space, v));
                }
            }
        }
    }
    ids
}

/// Process kits known to the registry.
#[pyfunction]
fn pdks() -> Vec<&'static str> {
    Pdk::ALL.iter().map(|p| p.as_str()).collect()
}

/// Python module definition.
#[pymodule]
fn circus_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<VecEnv>()?;
    m.add_class::<GoalEnv>()?;
    m.add_function(wrap_pyfunction!(env_ids, m)?)?;
    m.add_function(wrap_pyfunction!(pdks, m)?)?;
    Ok(())
}
