// src/error.rs
//
// Error type shared by every construction and stepping path.
//
// Construction errors (unknown topology, missing bounds, missing device
// artifacts, unknown goal kind or predicate) are fatal: no environment is
// returned. Runtime errors surface shape mismatches and simulator failures.

/// Errors produced by the circus library.
#[derive(Debug, Clone, PartialEq)]
pub enum CircusError {
    /// Topology id not present in the registry.
    UnknownTopology { id: String },
    /// Process (PDK) id not present in the registry.
    UnknownPdk { id: String },
    /// Environment id could not be parsed or routed.
    UnknownEnvId { id: String, reason: String },
    /// No curated bounds exist for this topology/backend combination.
    MissingBounds { topology: String, backend: String },
    /// Curated bounds are degenerate (min >= max) for a parameter.
    InvalidBounds { id: String, min: f64, max: f64 },
    /// A constraint entry is inconsistent (e.g. min > max).
    InvalidConstraint { id: String, message: String },
    /// A required device-model artifact does not exist on disk.
    MissingArtifact { path: String },
    /// A device-model artifact exists but could not be parsed or is malformed.
    InvalidArtifact { path: String, message: String },
    /// Goal generator tag is not one of noisy/random/fix.
    UnknownGoalKind { kind: String },
    /// Performance identifier has no entry in the predicate table.
    UnknownPredicate { id: String },
    /// Array shape does not match what the component was built for.
    ShapeMismatch {
        what: String,
        expected: usize,
        got: usize,
    },
    /// Parameter names or ordering disagree between collaborators.
    ParameterOrder { message: String },
    /// Simulator session failed to evaluate a sizing.
    Simulation { slot: usize, message: String },
    /// Simulator session failed to terminate cleanly.
    SessionClose { slot: usize, message: String },
}

impl CircusError {
    pub(crate) fn shape(what: impl Into<String>, expected: usize, got: usize) -> Self {
        CircusError::ShapeMismatch {
            what: what.into(),
            expected,
            got,
        }
    }

    /// HTTP status code used by the server for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            CircusError::UnknownTopology { .. }
            | CircusError::UnknownPdk { .. }
            | CircusError::UnknownEnvId { .. } => 404,
            CircusError::ShapeMismatch { .. }
            | CircusError::ParameterOrder { .. }
            | CircusError::UnknownGoalKind { .. }
            | CircusError::UnknownPredicate { .. } => 400,
            _ => 500,
        }
    }
}

impl std::fmt::Display for CircusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircusError::UnknownTopology { id } => write!(f, "Unknown topology '{}'", id),
            CircusError::UnknownPdk { id } => write!(f, "Unknown PDK '{}'", id),
            CircusError::UnknownEnvId { id, reason } => {
                write!(f, "Invalid environment id '{}': {}", id, reason)
            }
            CircusError::MissingBounds { topology, backend } => write!(
                f,
                "No bounds available for topology '{}' with backend '{}'",
                topology, backend
            ),
            CircusError::InvalidBounds { id, min, max } => write!(
                f,
                "Degenerate bounds for '{}': min {} must be below max {}",
                id, min, max
            ),
            CircusError::InvalidConstraint { id, message } => {
                write!(f, "Invalid constraint '{}': {}", id, message)
            }
            CircusError::MissingArtifact { path } => {
                write!(f, "Device model artifact not found: {}", path)
            }
            CircusError::InvalidArtifact { path, message } => {
                write!(f, "Failed to load device model artifact '{}': {}", path, message)
            }
            CircusError::UnknownGoalKind { kind } => write!(
                f,
                "Unknown goal generator '{}' (expected noisy, random or fix)",
                kind
            ),
            CircusError::UnknownPredicate { id } => {
                write!(f, "No goal predicate defined for '{}'", id)
            }
            CircusError::ShapeMismatch {
                what,
                expected,
                got,
            } => write!(f, "Shape mismatch in {}: expected {}, got {}", what, expected, got),
            CircusError::ParameterOrder { message } => {
                write!(f, "Parameter order mismatch: {}", message)
            }
            CircusError::Simulation { slot, message } => {
                write!(f, "Simulation failed in slot {}: {}", slot, message)
            }
            CircusError::SessionClose { slot, message } => {
                write!(f, "Session {} failed to close: {}", slot, message)
            }
        }
    }
}

impl std::error::Error for CircusError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_identifier() {
        let err = CircusError::UnknownPredicate {
            id: "foo".to_string(),
        };
        assert!(err.to_string().contains("'foo'"));
    }

    #[test]
    fn test_http_status_mapping() {
        let not_found = CircusError::UnknownTopology { id: "op9".into() };
        assert_eq!(not_found.http_status(), 404);
        assert_eq!(CircusError::shape("action", 3, 2).http_status(), 400);
        let sim = CircusError::Simulation {
            slot: 0,
            message: "boom".into(),
        };
        assert_eq!(sim.http_status(), 500);
    }
}
