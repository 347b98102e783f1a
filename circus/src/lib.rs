//! Circus core library.
//!
//! Analog circuit sizing exposed as reinforcement-learning environments.
//! An agent proposes transistor sizings (directly, or as per-device
//! operating points that are transformed into geometry) and observes the
//! simulated performance of the circuit, normalized into [-1, 1].
//!
//! # Layout
//!
//! - **Registry** (`topology`, `pdk`): closed set of op-amp topologies and
//!   process kits, with their curated bounds and reference goals.
//! - **Device models** (`prim`): learned gm/Id lookups per transistor type.
//! - **Transforms** (`trafo`, `constraints`): bounded actions to sizing.
//! - **Scaling** (`scaler`): raw performance to bounded observations.
//! - **Goals and rewards** (`goal`, `reward`).
//! - **Simulator seam** (`sim`): session traits, slot pool, and a
//!   deterministic synthetic backend.
//! - **Environments** (`rl`): vectorized goal / non-goal environments.
//! - **Ambient** (`config`, `telemetry`, `server`): configuration, JSONL
//!   telemetry and the HTTP façade.

pub mod config;
pub mod constraints;
pub mod error;
pub mod goal;
pub mod pdk;
pub mod prim;
pub mod reward;
pub mod rl;
pub mod scaler;
pub mod server;
pub mod sim;
pub mod telemetry;
pub mod topology;
pub mod trafo;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{ActionMode, EnvConfig, EnvId, EnvVariant, ObsFilter};
pub use constraints::{Constraint, Constraints, GeometricUnscaler, ParamMap};
pub use error::CircusError;
pub use goal::{GoalGenerator, GoalKind};
pub use pdk::Pdk;
pub use prim::{DeviceKind, DevicePair, PrimitiveDevice, Regressor};
pub use reward::{Predicate, RewardFn};
pub use rl::{
    BoxSpace, CircusEnv, GoalObservation, GoalObservationRow, ObservationSpace, ResetTarget,
    SingleEnv, StepInfo, StepOutcome,
};
pub use scaler::{PerformanceBounds, PerformanceScaler};
pub use server::{EnvServer, HttpReply};
pub use sim::{CircuitBackend, CircuitSession, SessionPool, SyntheticBackend, SyntheticSession};
pub use telemetry::{TelemetryConfig, TelemetrySink};
pub use topology::Topology;
