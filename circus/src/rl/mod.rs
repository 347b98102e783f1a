// src/rl/mod.rs
//
// Gym-style environments over a pool of circuit simulator sessions.
//
// - CircusEnv: vectorized environment (goal `v0` and non-goal `v1`)
// - SingleEnv: one-slot wrapper
// - BoxSpace / ObservationSpace: action and observation spaces
// - GoalObservation: observation / achieved goal / desired goal matrices

pub mod env;
pub mod observation;
pub mod single;
pub mod spaces;

pub use env::{CircusEnv, ResetTarget, StepInfo, StepOutcome};
pub use observation::{GoalObservation, GoalObservationRow, OBSERVATION_KEYS};
pub use single::{SingleEnv, SingleStep};
pub use spaces::{BoxSpace, ObservationSpace};
