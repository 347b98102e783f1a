// src/sim/mod.rs
//
// Simulator seam.
//
// The environment never talks to a circuit simulator directly. It holds a
// `SessionPool`: one `CircuitSession` per environment slot, created by a
// `CircuitBackend`. Sessions evaluate sizing maps and report performance
// maps; the pool fans evaluations out across worker threads.

pub mod synthetic;

use std::collections::BTreeMap;
use std::thread;

use crate::constraints::{Constraints, ParamMap};
use crate::error::CircusError;
use crate::pdk::Pdk;
use crate::topology::Topology;

pub use synthetic::{SyntheticBackend, SyntheticSession};

/// One live simulator instance bound to a netlist.
pub trait CircuitSession: Send {
    /// Constraints of every netlist parameter.
    fn parameter_dict(&self) -> Constraints;

    /// Every quantity `evaluate` reports, performance and operating point.
    fn performance_identifiers(&self) -> Vec<String>;

    /// Names of the sizing parameters, sorted.
    fn sizing_identifiers(&self) -> Vec<String>;

    /// Simulate one sizing. Missing parameters keep their initial value.
    fn evaluate(&mut self, sizing: &ParamMap) -> Result<ParamMap, CircusError>;

    /// A random sizing inside the constraints.
    fn random_sizing(&mut self) -> ParamMap;

    /// The netlist's initial sizing.
    fn initial_sizing(&self) -> ParamMap;

    /// Terminate the session. Closing twice is an error.
    fn close(&mut self) -> Result<(), CircusError>;
}

/// Factory for sessions of a given topology and process.
pub trait CircuitBackend {
    type Session: CircuitSession;

    fn name(&self) -> &str;

    fn open_session(
        &self,
        slot: usize,
        topology: Topology,
        pdk: Pdk,
    ) -> Result<Self::Session, CircusError>;

    fn make_pool(
        &self,
        num_envs: usize,
        topology: Topology,
        pdk: Pdk,
    ) -> Result<SessionPool<Self::Session>, CircusError> {
        let sessions = (0..num_envs)
            .map(|slot| self.open_session(slot, topology, pdk))
            .collect::<Result<Vec<_>, _>>()?;
        SessionPool::new(sessions)
    }
}

/// Slot-indexed sessions. Slot `i` is always `sessions[i]`.
#[derive(Debug)]
pub struct SessionPool<S> {
    sessions: Vec<S>,
}

impl<S: CircuitSession> SessionPool<S> {
    /// All sessions must agree on sizing and performance parameter names.
    pub fn new(sessions: Vec<S>) -> Result<Self, CircusError> {
        let Some(first) = sessions.first() else {
            return Err(CircusError::shape("session pool", 1, 0));
        };
        let sizing_ids = first.sizing_identifiers();
        let perf_ids = first.performance_identifiers();
        for (slot, s) in sessions.iter().enumerate().skip(1) {
            if s.sizing_identifiers() != sizing_ids || s.performance_identifiers() != perf_ids {
                return Err(CircusError::ParameterOrder {
                    message: format!("session {} reports different parameters than session 0", slot),
                });
            }
        }
        Ok(Self { sessions })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, slot: usize) -> Option<&S> {
        self.sessions.get(slot)
    }

    pub fn session_mut(&mut self, slot: usize) -> Option<&mut S> {
        self.sessions.get_mut(slot)
    }

    pub fn parameter_dict(&self) -> Constraints {
        self.sessions[0].parameter_dict()
    }

    pub fn performance_identifiers(&self) -> Vec<String> {
        self.sessions[0].performance_identifiers()
    }

    pub fn sizing_identifiers(&self) -> Vec<String> {
        self.sessions[0].sizing_identifiers()
    }

    fn check_slot(&self, slot: usize) -> Result<(), CircusError> {
        if slot < self.sessions.len() {
            Ok(())
        } else {
            Err(CircusError::Simulation {
                slot,
                message: format!("no session for slot (pool has {})", self.sessions.len()),
            })
        }
    }

    /// Evaluate the given slots in parallel. The first failing slot (in slot
    /// order) is reported.
    pub fn evaluate(
        &mut self,
        sizing: &BTreeMap<usize, ParamMap>,
    ) -> Result<BTreeMap<usize, ParamMap>, CircusError> {
        for &slot in sizing.keys() {
            self.check_slot(slot)?;
        }

        let results: Vec<(usize, Result<ParamMap, CircusError>)> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .sessions
                .iter_mut()
                .enumerate()
                .filter_map(|(slot, session)| sizing.get(&slot).map(|s| (slot, session, s)))
                .map(|(slot, session, s)| (slot, scope.spawn(move || session.evaluate(s))))
                .collect();
            handles
                .into_iter()
                .map(|(slot, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(CircusError::Simulation {
                            slot,
                            message: "evaluation worker panicked".to_string(),
                        })
                    });
                    (slot, result)
                })
                .collect()
        });

        results
            .into_iter()
            .map(|(slot, r)| r.map(|perf| (slot, perf)))
            .collect()
    }

    pub fn random_sizing(&mut self, slots: &[usize]) -> Result<BTreeMap<usize, ParamMap>, CircusError> {
        let mut out = BTreeMap::new();
        for &slot in slots {
            self.check_slot(slot)?;
            out.insert(slot, self.sessions[slot].random_sizing());
        }
        Ok(out)
    }

    pub fn initial_sizing(&self, slots: &[usize]) -> Result<BTreeMap<usize, ParamMap>, CircusError> {
        let mut out = BTreeMap::new();
        for &slot in slots {
            self.check_slot(slot)?;
            out.insert(slot, self.sessions[slot].initial_sizing());
        }
        Ok(out)
    }

    /// Close every session, then report the first failure, if any.
    pub fn close(&mut self) -> Result<(), CircusError> {
        let mut first_err = None;
        for s in &mut self.sessions {
            if let Err(e) = s.close() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
