//! telemetry.rs
//!
//! JSONL trace of environment events.
//!
//! Every `reset` and `step` of a [`CircusEnv`](crate::rl::CircusEnv) can be
//! appended to a file as one [`EnvRecord`] per line, so rollouts can be
//! traced without code changes.
//!
//! # Environment variables
//!
//! - `CIRCUS_TELEMETRY_MODE`: `"off"` (default) or `"jsonl"`.
//! - `CIRCUS_TELEMETRY_PATH`: target file, required when mode is `"jsonl"`.
//! - `CIRCUS_TELEMETRY_APPEND`: `"1"`/`"true"`/`"yes"` appends instead of
//!   truncating.
//!
//! Write failures switch the sink off for the rest of the process; they
//! never reach the environment.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;

/// Version stamped on every [`EnvRecord`].
pub const SCHEMA_VERSION: i64 = 1;

/// Where records go. `path == None` means the sink is off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve the `CIRCUS_TELEMETRY_*` variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let jsonl = lookup("CIRCUS_TELEMETRY_MODE")
            .map(|m| m.trim().eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);
        if !jsonl {
            return Self::off();
        }
        let path = lookup("CIRCUS_TELEMETRY_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if path.is_none() {
            eprintln!("[config] WARN: CIRCUS_TELEMETRY_MODE = jsonl without CIRCUS_TELEMETRY_PATH; telemetry off");
        }
        let append = lookup("CIRCUS_TELEMETRY_APPEND")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        TelemetryConfig {
            path: path.map(PathBuf::from),
            append,
        }
    }

    pub fn off() -> Self {
        Self::default()
    }

    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        TelemetryConfig {
            path: Some(path.into()),
            append: false,
        }
    }
}

#[derive(Debug)]
enum SinkState {
    Off,
    /// File configured, not opened until the first record.
    Pending { path: PathBuf, append: bool },
    Open(BufWriter<File>),
}

/// Writes [`EnvRecord`]s as JSON lines.
#[derive(Debug)]
pub struct TelemetrySink {
    state: SinkState,
}

impl TelemetrySink {
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        let state = match cfg.path {
            Some(path) => SinkState::Pending {
                path,
                append: cfg.append,
            },
            None => SinkState::Off,
        };
        TelemetrySink { state }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.state, SinkState::Off)
    }

    fn writer(&mut self) -> Option<&mut BufWriter<File>> {
        if let SinkState::Pending { path, append } = &self.state {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let opened = OpenOptions::new()
                .create(true)
                .write(true)
                .append(*append)
                .truncate(!*append)
                .open(path);
            self.state = match opened {
                Ok(f) => SinkState::Open(BufWriter::new(f)),
                Err(_) => SinkState::Off,
            };
        }
        match &mut self.state {
            SinkState::Open(w) => Some(w),
            _ => None,
        }
    }

    /// Append one record. No-op when the sink is off.
    pub fn record(&mut self, record: &EnvRecord) {
        let Some(writer) = self.writer() else {
            return;
        };
        let written = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if written.is_err() {
            self.state = SinkState::Off;
        }
    }

    pub fn flush(&mut self) {
        if let SinkState::Open(w) = &mut self.state {
            let _ = w.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

/// One environment event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvRecord {
    pub schema_version: i64,
    /// `reset` or `step`.
    pub event: &'static str,
    /// Environment id, e.g. `op2-xh035-geom-v0`.
    pub env: String,
    /// Slots touched by the event.
    pub slots: Vec<usize>,
    /// Step counter per slot after the event.
    pub steps: Vec<usize>,
    /// Empty for resets.
    pub rewards: Vec<f64>,
    /// Empty for resets.
    pub dones: Vec<bool>,
}

impl EnvRecord {
    pub fn reset(env: &str, slots: Vec<usize>, steps: Vec<usize>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            event: "reset",
            env: env.to_string(),
            slots,
            steps,
            rewards: Vec::new(),
            dones: Vec::new(),
        }
    }

    pub fn step(env: &str, steps: Vec<usize>, rewards: Vec<f64>, dones: Vec<bool>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            event: "step",
            env: env.to_string(),
            slots: (0..steps.len()).collect(),
            steps,
            rewards,
            dones,
        }
    }
}
