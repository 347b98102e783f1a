// src/topology.rs
//
// Closed registry of supported circuit topologies.
//
// Each topology dispatches to its module under `trafo/` for the electrical
// parameter list, the electrical action bounds, the transformation itself,
// and the curated reference goal. Performance scaling bounds are shared.

use serde::{Deserialize, Serialize};

use crate::constraints::{Constraints, ParamMap};
use crate::error::CircusError;
use crate::pdk::Pdk;
use crate::prim::DevicePair;
use crate::scaler::PerformanceBounds;
use crate::trafo::{self, folded_cascode, miller, rail_to_rail, symmetrical, ElectricalUnscaler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topology {
    /// Miller-compensated two-stage op-amp.
    Miller,
    /// Symmetrical op-amp.
    Symmetrical,
    /// Folded-cascode op-amp.
    FoldedCascode,
    /// Rail-to-rail folded cascode with wide-swing mirror.
    RailToRail,
}

impl Topology {
    pub const ALL: [Topology; 4] = [
        Topology::Miller,
        Topology::Symmetrical,
        Topology::FoldedCascode,
        Topology::RailToRail,
    ];

    /// Parse an ace id (`op1`, `op2`, `op8`, `op11`).
    pub fn parse(s: &str) -> Result<Self, CircusError> {
        match s.trim().to_lowercase().as_str() {
            "op1" => Ok(Topology::Miller),
            "op2" => Ok(Topology::Symmetrical),
            "op8" => Ok(Topology::FoldedCascode),
            "op11" => Ok(Topology::RailToRail),
            _ => Err(CircusError::UnknownTopology { id: s.to_string() }),
        }
    }

    pub fn ace_id(&self) -> &'static str {
        match self {
            Topology::Miller => "op1",
            Topology::Symmetrical => "op2",
            Topology::FoldedCascode => "op8",
            Topology::RailToRail => "op11",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Topology::Miller => "Miller operational amplifier",
            Topology::Symmetrical => "Symmetrical operational amplifier",
            Topology::FoldedCascode => "Folded-cascode operational amplifier",
            Topology::RailToRail => "Rail-to-rail folded-cascode operational amplifier",
        }
    }

    pub fn electrical_identifiers(&self) -> &'static [&'static str] {
        match self {
            Topology::Miller => &miller::INPUTS,
            Topology::Symmetrical => &symmetrical::INPUTS,
            Topology::FoldedCascode => &folded_cascode::INPUTS,
            Topology::RailToRail => &rail_to_rail::INPUTS,
        }
    }

    /// Sizing parameters produced by the transformation.
    pub fn geometric_identifiers(&self) -> &'static [&'static str] {
        match self {
            Topology::Miller => &miller::GEOMETRIC,
            Topology::Symmetrical => &symmetrical::GEOMETRIC,
            Topology::FoldedCascode => &folded_cascode::GEOMETRIC,
            Topology::RailToRail => &rail_to_rail::GEOMETRIC,
        }
    }

    pub fn supported_pdks(&self) -> &'static [Pdk] {
        match self {
            Topology::Miller => &miller::SUPPORTED,
            Topology::Symmetrical => &symmetrical::SUPPORTED,
            Topology::FoldedCascode => &folded_cascode::SUPPORTED,
            Topology::RailToRail => &rail_to_rail::SUPPORTED,
        }
    }

    pub fn supports(&self, pdk: Pdk) -> bool {
        self.supported_pdks().contains(&pdk)
    }

    fn require(&self, pdk: Pdk) -> Result<(), CircusError> {
        if self.supports(pdk) {
            Ok(())
        } else {
            Err(CircusError::MissingBounds {
                topology: self.ace_id().to_string(),
                backend: pdk.backend_id().to_string(),
            })
        }
    }

    pub fn electrical_unscaler(&self, pdk: Pdk) -> Result<ElectricalUnscaler, CircusError> {
        self.require(pdk)?;
        let (x_min, x_max, (g, f, i)) = match self {
            Topology::Miller => (&miller::X_MIN[..], &miller::X_MAX[..], miller::SPLIT),
            Topology::Symmetrical => (
                &symmetrical::X_MIN[..],
                &symmetrical::X_MAX[..],
                symmetrical::SPLIT,
            ),
            Topology::FoldedCascode => (
                &folded_cascode::X_MIN[..],
                &folded_cascode::X_MAX[..],
                folded_cascode::SPLIT,
            ),
            Topology::RailToRail => (
                &rail_to_rail::X_MIN[..],
                &rail_to_rail::X_MAX[..],
                rail_to_rail::SPLIT,
            ),
        };
        Ok(ElectricalUnscaler::new(x_min, x_max, g, f, i))
    }

    /// Curated performance scaling bounds; supply-dependent entries use the
    /// netlist's `vsup`.
    pub fn performance_bounds(
        &self,
        pdk: Pdk,
        constraints: &Constraints,
    ) -> Result<PerformanceBounds, CircusError> {
        self.require(pdk)?;
        let vdd = constraints.init_or("vsup", pdk.nominal_vdd());
        Ok(PerformanceBounds::new(
            trafo::performance_bounds(vdd)
                .into_iter()
                .map(|(id, lo, hi)| (id.to_string(), lo, hi)),
        ))
    }

    /// Curated reference goal for this topology.
    pub fn reference_goal(&self, pdk: Pdk, constraints: &Constraints) -> Result<ParamMap, CircusError> {
        self.require(pdk)?;
        let vdd = constraints.init_or("vsup", pdk.nominal_vdd());
        let table = match self {
            Topology::Miller => miller::reference_goal(vdd),
            Topology::Symmetrical => symmetrical::reference_goal(vdd),
            Topology::FoldedCascode => folded_cascode::reference_goal(vdd),
            Topology::RailToRail => rail_to_rail::reference_goal(vdd),
        };
        Ok(table.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// Electrical parameters (physical units, in [`electrical_identifiers`]
    /// order) to geometric sizing.
    ///
    /// [`electrical_identifiers`]: Self::electrical_identifiers
    pub fn transform(
        &self,
        constraints: &Constraints,
        devices: &DevicePair,
        params: &[f64],
    ) -> Result<ParamMap, CircusError> {
        Ok(match self {
            Topology::Miller => miller::transform(constraints, devices, &operating_point(params)?),
            Topology::Symmetrical => {
                symmetrical::transform(constraints, devices, &operating_point(params)?)
            }
            Topology::FoldedCascode => {
                folded_cascode::transform(constraints, devices, &operating_point(params)?)
            }
            Topology::RailToRail => {
                rail_to_rail::transform(constraints, devices, &operating_point(params)?)
            }
        })
    }
}

/// Fixed-width view of an electrical parameter vector.
fn operating_point<const N: usize>(params: &[f64]) -> Result<[f64; N], CircusError> {
    <[f64; N]>::try_from(params).map_err(|_| CircusError::shape("electrical parameters", N, params.len()))
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ace_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler::LOG_PARAMETERS;
    use crate::trafo::test_support::constant_devices;

    #[test]
    fn test_parse() {
        assert_eq!(Topology::parse("op8").unwrap(), Topology::FoldedCascode);
        assert!(matches!(
            Topology::parse("op9"),
            Err(CircusError::UnknownTopology { .. })
        ));
    }

    #[test]
    fn test_unscaler_dims_match_inputs() {
        for topology in Topology::ALL {
            let pdk = topology.supported_pdks()[0];
            let unscaler = topology.electrical_unscaler(pdk).unwrap();
            assert_eq!(unscaler.dim(), topology.electrical_identifiers().len());
            let (lo, hi) = unscaler.bounds();
            assert!(lo.iter().zip(hi).all(|(a, b)| a < b));
        }
    }

    #[test]
    fn test_missing_bounds_for_unsupported_pdk() {
        let err = Topology::Miller.performance_bounds(Pdk::Sky130, &Constraints::default());
        assert!(matches!(err, Err(CircusError::MissingBounds { .. })));
        assert!(Topology::Symmetrical
            .performance_bounds(Pdk::Sky130, &Constraints::default())
            .is_ok());
    }

    #[test]
    fn test_reference_goal_inside_log_domain() {
        for topology in Topology::ALL {
            let pdk = topology.supported_pdks()[0];
            let goal = topology.reference_goal(pdk, &Constraints::default()).unwrap();
            assert_eq!(goal.len(), 29);
            for id in LOG_PARAMETERS {
                assert!(goal.contains_key(id), "{} missing {}", topology, id);
            }
        }
    }

    #[test]
    fn test_transform_output_keys_and_multiplicities() {
        let devices = constant_devices(8.0, 0.8e-6);
        for topology in Topology::ALL {
            let pdk = topology.supported_pdks()[0];
            let unscaler = topology.electrical_unscaler(pdk).unwrap();
            for a in [-1.0, -0.3, 0.0, 0.45, 1.0] {
                let action = vec![a; unscaler.dim()];
                let params = unscaler.unscale(&action).unwrap();
                let sizing = topology
                    .transform(&Constraints::default(), &devices, &params)
                    .unwrap();
                let mut expected: Vec<&str> = topology.geometric_identifiers().to_vec();
                expected.sort_unstable();
                assert_eq!(sizing.keys().map(String::as_str).collect::<Vec<_>>(), expected);
                for (k, v) in &sizing {
                    assert!(v.is_finite());
                    if k.starts_with('M') {
                        assert!(*v >= 1.0, "{} {} = {}", topology, k, v);
                    }
                }
            }
        }
    }

    #[test]
    fn test_transform_rejects_wrong_length() {
        let devices = constant_devices(8.0, 0.8e-6);
        for topology in Topology::ALL {
            let n = topology.electrical_identifiers().len();
            for len in [0, 3, n - 1, n + 1] {
                let err = topology.transform(&Constraints::default(), &devices, &vec![1.0; len]);
                assert!(
                    matches!(err, Err(CircusError::ShapeMismatch { expected, got, .. }) if expected == n && got == len),
                    "{} accepted {} parameters",
                    topology,
                    len
                );
            }
        }
    }
}
