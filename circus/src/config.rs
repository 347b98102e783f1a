// src/config.rs
//
// Environment configuration and environment ids.
//
// `EnvConfig::default()` is the baseline used by the bindings, the server
// and the rollout harness. `EnvConfig::from_env()` layers `CIRCUS_*`
// environment overrides on top and logs each one to stderr.

use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constraints::ParamMap;
use crate::error::CircusError;
use crate::goal::{GoalKind, DEFAULT_GOAL_NOISE};
use crate::pdk::Pdk;
use crate::topology::Topology;

/// Which simulator outputs make up the observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObsFilter {
    /// Performance parameters only (those with a reward predicate).
    Perf,
    /// Everything the simulator reports, operating point included.
    All,
    /// An explicit list, in the given order.
    List(Vec<String>),
}

impl ObsFilter {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "perf" => ObsFilter::Perf,
            "all" => ObsFilter::All,
            _ => ObsFilter::List(
                s.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Number of parallel circuit instances (slots).
    pub num_envs: usize,
    /// Episode length; a slot is done after this many steps.
    pub num_steps: usize,
    /// Seed of the goal generator and the action sampler.
    pub seed: u64,
    pub obs_filter: ObsFilter,
    /// Goal parameters; `None` selects the performance subset of the
    /// observation.
    pub goal_filter: Option<Vec<String>>,
    pub goal_kind: GoalKind,
    /// Relative standard deviation of the noisy goal generator.
    pub goal_noise: f64,
    /// Explicit goal reference rows, replacing the simulated reference.
    pub goal_reference: Option<Vec<Vec<f64>>>,
    /// Sizings restored on reset instead of random ones; slot `i` uses
    /// entry `i % len`.
    pub reset_sizing: Option<Vec<ParamMap>>,
    /// Return observations in [-1, 1] instead of raw simulator values.
    pub scale_observation: bool,
    /// Reset done slots inside `step`.
    pub auto_reset: bool,
    /// Device model artifacts; defaults to `~/.circus/<backend>`.
    pub model_dir: Option<PathBuf>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            num_envs: 1,
            num_steps: 50,
            seed: 666,
            obs_filter: ObsFilter::Perf,
            goal_filter: None,
            goal_kind: GoalKind::Noisy,
            goal_noise: DEFAULT_GOAL_NOISE,
            goal_reference: None,
            reset_sizing: None,
            scale_observation: true,
            auto_reset: false,
            model_dir: None,
        }
    }
}

impl EnvConfig {
    pub fn with_num_envs(mut self, num_envs: usize) -> Self {
        self.num_envs = num_envs;
        self
    }

    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_goal_kind(mut self, kind: GoalKind) -> Self {
        self.goal_kind = kind;
        self
    }

    /// Directory holding `nmos/` and `pmos/` artifacts for `pdk`.
    pub fn resolve_model_dir(&self, pdk: Pdk) -> PathBuf {
        if let Some(dir) = &self.model_dir {
            return dir.clone();
        }
        let home = env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."));
        home.join(".circus").join(pdk.backend_id())
    }

    /// Defaults plus process environment overrides:
    ///
    ///   - CIRCUS_NUM_ENVS   (usize)
    ///   - CIRCUS_NUM_STEPS  (usize)
    ///   - CIRCUS_SEED       (u64)
    ///   - CIRCUS_GOAL_KIND  (noisy | random | fix)
    ///   - CIRCUS_GOAL_NOISE (f64)
    ///   - CIRCUS_MODEL_DIR  (path)
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_env() -> Self {
        let mut cfg = EnvConfig::default();
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg
    }

    /// Apply overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CIRCUS_NUM_ENVS") {
            match raw.trim().parse::<usize>() {
                Ok(v) if v > 0 => {
                    self.num_envs = v;
                    eprintln!("[config] CIRCUS_NUM_ENVS = {v} (overrode default)");
                }
                _ => eprintln!(
                    "[config] WARN: could not parse CIRCUS_NUM_ENVS = {:?} as a positive integer; using default {}",
                    raw, self.num_envs
                ),
            }
        }

        if let Some(raw) = lookup("CIRCUS_NUM_STEPS") {
            match raw.trim().parse::<usize>() {
                Ok(v) => {
                    self.num_steps = v;
                    eprintln!("[config] CIRCUS_NUM_STEPS = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse CIRCUS_NUM_STEPS = {:?} as usize; using default {}",
                    raw, self.num_steps
                ),
            }
        }

        if let Some(raw) = lookup("CIRCUS_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(v) => {
                    self.seed = v;
                    eprintln!("[config] CIRCUS_SEED = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse CIRCUS_SEED = {:?} as u64; using default {}",
                    raw, self.seed
                ),
            }
        }

        if let Some(raw) = lookup("CIRCUS_GOAL_KIND") {
            match GoalKind::parse(&raw) {
                Ok(kind) => {
                    self.goal_kind = kind;
                    eprintln!(
                        "[config] CIRCUS_GOAL_KIND = {} (overrode default)",
                        kind.as_str()
                    );
                }
                Err(_) => eprintln!(
                    "[config] WARN: unknown CIRCUS_GOAL_KIND = {:?}; using default {}",
                    raw,
                    self.goal_kind.as_str()
                ),
            }
        }

        if let Some(raw) = lookup("CIRCUS_GOAL_NOISE") {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => {
                    self.goal_noise = v.abs();
                    eprintln!(
                        "[config] CIRCUS_GOAL_NOISE = {} (overrode default)",
                        self.goal_noise
                    );
                }
                _ => eprintln!(
                    "[config] WARN: could not parse CIRCUS_GOAL_NOISE = {:?} as f64; using default {}",
                    raw, self.goal_noise
                ),
            }
        }

        if let Some(raw) = lookup("CIRCUS_MODEL_DIR") {
            if raw.trim().is_empty() {
                eprintln!("[config] WARN: empty CIRCUS_MODEL_DIR ignored");
            } else {
                eprintln!("[config] CIRCUS_MODEL_DIR = {raw} (overrode default)");
                self.model_dir = Some(PathBuf::from(raw));
            }
        }
    }

    /// One-line summary for startup logs.
    pub fn log_startup(&self, env_id: &EnvId) {
        eprintln!(
            "env={} | num_envs={} | num_steps={} | seed={} | goal_kind={} | goal_noise={} | scale_observation={} | auto_reset={}",
            env_id,
            self.num_envs,
            self.num_steps,
            self.seed,
            self.goal_kind.as_str(),
            self.goal_noise,
            self.scale_observation,
            self.auto_reset
        );
    }
}

/// How actions are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    /// Widths, lengths and multiplicities directly.
    Geometric,
    /// Operating points and branch currents, transformed to geometry.
    Electrical,
}

impl ActionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionMode::Geometric => "geom",
            ActionMode::Electrical => "elec",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvVariant {
    /// Goal-conditioned, dict observations (`v0`).
    Goal,
    /// Plain box observations (`v1`).
    NonGoal,
}

impl EnvVariant {
    pub fn version(&self) -> u8 {
        match self {
            EnvVariant::Goal => 0,
            EnvVariant::NonGoal => 1,
        }
    }
}

/// `<topology>-<pdk>-<space>-v<variant>`, optionally prefixed `circus:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvId {
    pub topology: Topology,
    pub pdk: Pdk,
    pub mode: ActionMode,
    pub variant: EnvVariant,
}

impl EnvId {
    pub fn new(topology: Topology, pdk: Pdk, mode: ActionMode, variant: EnvVariant) -> Self {
        Self {
            topology,
            pdk,
            mode,
            variant,
        }
    }

    pub fn parse(s: &str) -> Result<Self, CircusError> {
        let bad = |reason: &str| CircusError::UnknownEnvId {
            id: s.to_string(),
            reason: reason.to_string(),
        };
        let body = s.trim();
        let body = body.strip_prefix("circus:").unwrap_or(body);
        let parts: Vec<&str> = body.split('-').collect();
        let [topology, pdk, space, version] = parts[..] else {
            return Err(bad("expected <topology>-<pdk>-<space>-v<variant>"));
        };

        let topology = Topology::parse(topology)?;
        let pdk = Pdk::parse(pdk)?;
        let mode = match space {
            "geom" => ActionMode::Geometric,
            "elec" => ActionMode::Electrical,
            _ => return Err(bad("space must be geom or elec")),
        };
        let variant = match version {
            "v0" => EnvVariant::Goal,
            "v1" => EnvVariant::NonGoal,
            _ => return Err(bad("variant must be v0 or v1")),
        };
        Ok(Self::new(topology, pdk, mode, variant))
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-v{}",
            self.topology,
            self.pdk,
            self.mode.as_str(),
            self.variant.version()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = EnvConfig::default();
        assert_eq!(cfg.num_envs, 1);
        assert_eq!(cfg.num_steps, 50);
        assert_eq!(cfg.seed, 666);
        assert_eq!(cfg.obs_filter, ObsFilter::Perf);
        assert_eq!(cfg.goal_kind, GoalKind::Noisy);
        assert!(cfg.scale_observation);
        assert!(!cfg.auto_reset);
    }

    #[test]
    fn test_overrides_applied_and_bad_values_ignored() {
        let vars: HashMap<&str, &str> = [
            ("CIRCUS_NUM_ENVS", "4"),
            ("CIRCUS_NUM_STEPS", "not-a-number"),
            ("CIRCUS_GOAL_KIND", "random"),
            ("CIRCUS_GOAL_NOISE", "-0.05"),
            ("CIRCUS_MODEL_DIR", "/tmp/models"),
        ]
        .into_iter()
        .collect();
        let mut cfg = EnvConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.num_envs, 4);
        assert_eq!(cfg.num_steps, 50);
        assert_eq!(cfg.goal_kind, GoalKind::Random);
        assert_eq!(cfg.goal_noise, 0.05);
        assert_eq!(cfg.resolve_model_dir(Pdk::Xh035), PathBuf::from("/tmp/models"));
    }

    #[test]
    fn test_default_model_dir_uses_backend() {
        let cfg = EnvConfig::default();
        assert!(cfg.resolve_model_dir(Pdk::Sky130).ends_with(".circus/sky130-1V8"));
    }

    #[test]
    fn test_obs_filter_parse() {
        assert_eq!(ObsFilter::parse("ALL"), ObsFilter::All);
        assert_eq!(
            ObsFilter::parse("a_0, ugbw"),
            ObsFilter::List(vec!["a_0".to_string(), "ugbw".to_string()])
        );
    }

    #[test]
    fn test_env_id_round_trip() {
        let id = EnvId::parse("circus:op2-xh035-elec-v0").unwrap();
        assert_eq!(id.topology, Topology::Symmetrical);
        assert_eq!(id.pdk, Pdk::Xh035);
        assert_eq!(id.mode, ActionMode::Electrical);
        assert_eq!(id.variant, EnvVariant::Goal);
        assert_eq!(id.to_string(), "op2-xh035-elec-v0");
        assert_eq!(EnvId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_env_id_errors() {
        assert!(matches!(
            EnvId::parse("op2-xh035-elec"),
            Err(CircusError::UnknownEnvId { .. })
        ));
        assert!(matches!(
            EnvId::parse("op3-xh035-geom-v0"),
            Err(CircusError::UnknownTopology { .. })
        ));
        assert!(matches!(
            EnvId::parse("op2-tsmc-geom-v0"),
            Err(CircusError::UnknownPdk { .. })
        ));
        assert!(matches!(
            EnvId::parse("op2-xh035-geom-v2"),
            Err(CircusError::UnknownEnvId { .. })
        ));
    }
}
