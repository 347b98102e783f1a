// src/bin/circus_rollout.rs
//
// Random-action rollout harness.
//
// Runs `--episodes` episodes of uniformly sampled actions on a synthetic
// environment and prints one summary line (or JSON with `--json`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use circus::config::{EnvConfig, EnvId};
use circus::goal::GoalKind;
use circus::rl::{CircusEnv, ResetTarget};
use circus::sim::SyntheticBackend;

#[derive(Debug, Parser)]
#[command(name = "circus_rollout", about = "Random-action rollouts on a circus environment", version)]
struct Args {
    /// Environment id, e.g. op2-xh035-geom-v0.
    #[arg(long, default_value = "op2-xh035-geom-v0")]
    env: String,

    #[arg(long)]
    num_envs: Option<usize>,

    #[arg(long)]
    num_steps: Option<usize>,

    #[arg(long, default_value_t = 3)]
    episodes: usize,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    goal_kind: Option<String>,

    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default, Serialize)]
struct RolloutSummary {
    env: String,
    episodes: usize,
    num_envs: usize,
    steps: usize,
    mean_reward: f64,
    successes: usize,
    truncations: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let id = EnvId::parse(&args.env).with_context(|| format!("Invalid environment '{}'", args.env))?;

    let mut cfg = EnvConfig::from_env();
    if let Some(n) = args.num_envs {
        cfg.num_envs = n;
    }
    if let Some(n) = args.num_steps {
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
    cfg.log_startup(&id);

    let backend = SyntheticBackend::new(cfg.seed);
    let mut env = CircusEnv::new(&backend, id, cfg)
        .with_context(|| format!("Failed to construct environment {}", id))?;

    let mut summary = RolloutSummary {
        env: id.to_string(),
        episodes: args.episodes,
        num_envs: env.num_envs(),
        ..Default::default()
    };
    let mut reward_sum = 0.0;
    let mut reward_count = 0usize;

    for _ in 0..args.episodes {
        env.reset(&ResetTarget::all()).context("reset failed")?;
        let mut finished = vec![false; env.num_envs()];
        while !finished.iter().all(|&f| f) {
            let actions = env.sample_actions();
            let out = env.step(&actions).context("step failed")?;
            summary.steps += 1;
            for (slot, info) in out.info.iter().enumerate() {
                if finished[slot] {
                    continue;
                }
                reward_sum += out.reward[slot];
                reward_count += 1;
                if out.done[slot] {
                    finished[slot] = true;
                    if info.success {
                        summary.successes += 1;
                    } else {
                        summary.truncations += 1;
                    }
                }
            }
        }
    }
    env.close().context("closing simulator sessions failed")?;

    summary.mean_reward = if reward_count > 0 {
        reward_sum / reward_count as f64
    } else {
        0.0
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else {
        println!(
            "circus_rollout | env={} | episodes={} | num_envs={} | steps={} | mean_reward={:.4} | successes={} | truncations={}",
            summary.env,
            summary.episodes,
            summary.num_envs,
            summary.steps,
            summary.mean_reward,
            summary.successes,
            summary.truncations
        );
    }
    Ok(())
}
