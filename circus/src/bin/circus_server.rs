// src/bin/circus_server.rs
//
// HTTP server for one circus environment backed by the synthetic simulator.
//
//   circus_server --env op2 --pdk xh035 --space geom --var 0 --num 4
//
// serves `/op2-xh035-geom-v0/<route>` on `--host:--port`.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};

use circus::config::{EnvConfig, EnvId};
use circus::constraints::ParamMap;
use circus::goal::GoalKind;
use circus::rl::CircusEnv;
use circus::server::EnvServer;
use circus::sim::SyntheticBackend;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SpaceArg {
    Geom,
    Elec,
}

#[derive(Debug, Parser)]
#[command(name = "circus_server", about = "Circuit sizing environment over HTTP", version)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 6006)]
    port: u16,

    /// Topology id (op1, op2, op8, op11).
    #[arg(long, default_value = "op2")]
    env: String,

    #[arg(long, default_value = "xh035")]
    pdk: String,

    /// Action space.
    #[arg(long, value_enum, default_value_t = SpaceArg::Geom)]
    space: SpaceArg,

    /// 0: goal-conditioned, 1: plain observations.
    #[arg(long, default_value_t = 0)]
    var: u8,

    /// Number of parallel circuit instances.
    #[arg(long)]
    num: Option<usize>,

    /// Episode length.
    #[arg(long)]
    step: Option<usize>,

    /// Return raw simulator values instead of [-1, 1] observations.
    #[arg(long)]
    no_scale: bool,

    /// JSON file with goal reference rows.
    #[arg(long)]
    goals: Option<PathBuf>,

    /// JSON file with a list of sizings restored on reset.
    #[arg(long)]
    states: Option<PathBuf>,

    /// noisy, random or fix.
    #[arg(long)]
    goal_kind: Option<String>,

    #[arg(long)]
    seed: Option<u64>,

    /// Device model directory for electrical environments.
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let space = match args.space {
        SpaceArg::Geom => "geom",
        SpaceArg::Elec => "elec",
    };
    let raw_id = format!("{}-{}-{}-v{}", args.env, args.pdk, space, args.var);
    let id = EnvId::parse(&raw_id).with_context(|| format!("Invalid environment '{}'", raw_id))?;

    // CLI > env > default
    let mut cfg = EnvConfig::from_env();
    if let Some(n) = args.num {
        cfg.num_envs = n;
    }
    if let Some(n) = args.step {
        cfg.num_steps = n;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(kind) = &args.goal_kind {
        cfg.goal_kind = GoalKind::parse(kind).context("Invalid --goal-kind")?;
    }
    if let Some(dir) = args.model_dir {
        cfg.model_dir = Some(dir);
    }
    cfg.scale_observation = !args.no_scale;
    if let Some(path) = &args.goals {
        cfg.goal_reference = Some(read_json::<Vec<Vec<f64>>>(path)?);
    }
    if let Some(path) = &args.states {
        cfg.reset_sizing = Some(read_json::<Vec<ParamMap>>(path)?);
    }

    cfg.log_startup(&id);

    let backend = SyntheticBackend::new(cfg.seed);
    let env = CircusEnv::new(&backend, id, cfg)
        .with_context(|| format!("Failed to construct environment {}", id))?;

    EnvServer::new(env)
        .serve(&format!("{}:{}", args.host, args.port))
        .map_err(|e| anyhow!("server on {}:{} failed: {}", args.host, args.port, e))
}
