// src/trafo/mod.rs
//
// Electrical-to-geometric design-space transformations.
//
// An electrical action names an operating point per device (gm/Id and
// transit frequency) plus a few branch currents. The per-topology
// transforms in this module query the primitive device models for each
// device and turn the result into widths, lengths and integer
// multiplicities that a netlist understands.

pub mod folded_cascode;
pub mod miller;
pub mod rail_to_rail;
pub mod symmetrical;

use crate::constraints::{Constraints, ParamMap};
use crate::error::CircusError;
use crate::prim::{DeviceKind, DevicePair};

/// Bias current assumed when the netlist does not report `i0`.
pub const DEFAULT_BIAS_CURRENT: f64 = 3e-6;
/// Supply assumed when the netlist does not report `vsup`.
pub const DEFAULT_VDD: f64 = 3.3;
/// Width at which a device is split into parallel fingers, if the netlist
/// has no explicit maximum.
pub const DEFAULT_MAX_WIDTH: f64 = 100e-6;

/// Best rational approximation `num / den` of `x` with `den <= max_denominator`.
///
/// Continued-fraction expansion; among the last convergent and the best
/// semiconvergent, the closer one wins (ties go to the convergent).
/// Non-positive or non-finite inputs give `(0, 1)`.
pub fn limit_denominator(x: f64, max_denominator: u64) -> (u64, u64) {
    if !x.is_finite() || x <= 0.0 {
        return (0, 1);
    }
    let max_den = max_denominator.max(1);

    let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
    let mut r = x;
    loop {
        let a_f = r.floor();
        let a = if a_f >= u64::MAX as f64 { u64::MAX } else { a_f as u64 };
        let q2 = q0.saturating_add(a.saturating_mul(q1));
        if q2 > max_den {
            break;
        }
        let p2 = p0.saturating_add(a.saturating_mul(p1));
        p0 = p1;
        q0 = q1;
        p1 = p2;
        q1 = q2;
        let frac = r - a_f;
        if frac < 1e-12 {
            return (p1, q1);
        }
        r = 1.0 / frac;
    }

    let k = (max_den - q0) / q1;
    let bound1 = (p0.saturating_add(k.saturating_mul(p1)), q0 + k * q1);
    let bound2 = (p1, q1);
    let err = |(p, q): (u64, u64)| (p as f64 / q as f64 - x).abs();
    if err(bound2) <= err(bound1) {
        bound2
    } else {
        bound1
    }
}

pub(crate) fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

pub(crate) fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}

/// Split a total width into `m` equal fingers no wider than `max_width`.
/// Returns `(finger_width, m)`, `m >= 1`.
pub(crate) fn split_width(total: f64, max_width: f64) -> (f64, f64) {
    if !total.is_finite() || total <= 0.0 || max_width <= 0.0 {
        return (finite_or_zero(total), 1.0);
    }
    let m = (total / max_width).ceil().max(1.0);
    (total / m, m)
}

pub(crate) fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Query one device model at `(gm/Id, fug, Vds, Vbs)`.
pub(crate) fn operating_point(
    devices: &DevicePair,
    kind: DeviceKind,
    gmoverid: f64,
    fug: f64,
    vds: f64,
    vbs: f64,
) -> [f64; 4] {
    devices.device(kind).predict([gmoverid, fug, vds, vbs])
}

/// Supply and bias current reported by the netlist.
pub(crate) fn supply(constraints: &Constraints) -> (f64, f64) {
    (
        constraints.init_or("vsup", DEFAULT_VDD),
        constraints.init_or("i0", DEFAULT_BIAS_CURRENT),
    )
}

/// Build a sizing map, replacing non-finite entries with zero.
pub(crate) fn sizing_map(entries: &[(&str, f64)]) -> ParamMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), finite_or_zero(*v)))
        .collect()
}

/// Role of an electrical input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectricalKind {
    /// gm/Id in 1/V, used as is.
    GmOverId,
    /// Transit frequency, given as a decade exponent.
    Frequency,
    /// Branch current, given in microamps.
    Current,
}

/// Maps a normalized electrical action onto physical operating-point
/// values: linear unmap and clip, then `10^x` for frequency columns and
/// `x * 1e-6` for current columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectricalUnscaler {
    x_min: Vec<f64>,
    x_max: Vec<f64>,
    kinds: Vec<ElectricalKind>,
}

impl ElectricalUnscaler {
    pub fn new(
        x_min: &[f64],
        x_max: &[f64],
        num_gmoverid: usize,
        num_fug: usize,
        num_current: usize,
    ) -> Self {
        let kinds = std::iter::repeat(ElectricalKind::GmOverId)
            .take(num_gmoverid)
            .chain(std::iter::repeat(ElectricalKind::Frequency).take(num_fug))
            .chain(std::iter::repeat(ElectricalKind::Current).take(num_current))
            .collect();
        Self {
            x_min: x_min.to_vec(),
            x_max: x_max.to_vec(),
            kinds,
        }
    }

    pub fn dim(&self) -> usize {
        self.kinds.len()
    }

    pub fn kinds(&self) -> &[ElectricalKind] {
        &self.kinds
    }

    pub fn bounds(&self) -> (&[f64], &[f64]) {
        (&self.x_min, &self.x_max)
    }

    pub fn unscale(&self, action: &[f64]) -> Result<Vec<f64>, CircusError> {
        if action.len() != self.kinds.len() {
            return Err(CircusError::shape(
                "electrical action",
                self.kinds.len(),
                action.len(),
            ));
        }
        Ok(action
            .iter()
            .enumerate()
            .map(|(i, &a)| {
                let (lo, hi) = (self.x_min[i], self.x_max[i]);
                let a = if a.is_finite() { a } else { 0.0 };
                let y = (lo + (a + 1.0) / 2.0 * (hi - lo)).clamp(lo, hi);
                match self.kinds[i] {
                    ElectricalKind::GmOverId => y,
                    ElectricalKind::Frequency => 10f64.powf(y),
                    ElectricalKind::Current => y * 1e-6,
                }
            })
            .collect())
    }
}

/// Curated performance scaling bounds, shared by all op-amp topologies.
///
/// Members of the log set are bounded in decades, the rest in their raw
/// unit. Output and input voltage ranges scale with the supply.
pub fn performance_bounds(vdd: f64) -> Vec<(&'static str, f64, f64)> {
    vec![
        ("A", -15.0, -5.0),
        ("a_0", 25.0, 70.0),
        ("cmrr", 70.0, 150.0),
        ("cof", 5.0, 9.0),
        ("gm", 0.0, 80.0),
        ("i_out_max", -6.0, -3.0),
        ("i_out_min", -6.0, -3.0),
        ("idd", -6.0, -3.0),
        ("iss", -6.0, -3.0),
        ("overshoot_f", 0.0, 130.0),
        ("overshoot_r", 0.0, 130.0),
        ("pm", 0.0, 120.0),
        ("psrr_n", 30.0, 70.0),
        ("psrr_p", 40.0, 140.0),
        ("sr_f", 4.0, 8.0),
        ("sr_r", 4.0, 8.0),
        ("ugbw", 5.0, 10.0),
        ("v_ih", 0.0, 2.0 * vdd),
        ("v_il", 0.0, 2.0 * vdd),
        ("v_oh", 0.0, 2.0 * vdd),
        ("v_ol", 0.0, 2.0 * vdd),
        ("vn_100Hz", -10.0, -4.0),
        ("vn_100kHz", -10.0, -4.0),
        ("vn_10Hz", -10.0, -4.0),
        ("vn_10kHz", -10.0, -4.0),
        ("vn_1Hz", -10.0, -4.0),
        ("vn_1kHz", -10.0, -4.0),
        ("voff_stat", -5.0, 0.0),
        ("voff_sys", -5.0, 0.0),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_denominator_exact() {
        assert_eq!(limit_denominator(0.5, 10), (1, 2));
        assert_eq!(limit_denominator(3.0, 1), (3, 1));
    }

    #[test]
    fn test_limit_denominator_pi() {
        assert_eq!(limit_denominator(std::f64::consts::PI, 10), (22, 7));
        assert_eq!(limit_denominator(std::f64::consts::PI, 100), (311, 99));
        assert_eq!(limit_denominator(std::f64::consts::PI, 1000), (355, 113));
    }

    #[test]
    fn test_limit_denominator_third_with_small_bound() {
        // 1/3 with den <= 2 is 1/2 (error 1/6) vs 0/1 (error 1/3)
        assert_eq!(limit_denominator(1.0 / 3.0, 2), (1, 2));
        assert_eq!(limit_denominator(0.0, 5), (0, 1));
        assert_eq!(limit_denominator(f64::NAN, 5), (0, 1));
    }

    #[test]
    fn test_lcm() {
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(1, 7), 7);
        assert_eq!(lcm(0, 7), 0);
    }

    #[test]
    fn test_split_width() {
        let (w, m) = split_width(250e-6, 100e-6);
        assert_eq!(m, 3.0);
        assert!((w * m - 250e-6).abs() < 1e-15);
        assert_eq!(split_width(f64::INFINITY, 100e-6), (0.0, 1.0));
        assert_eq!(split_width(10e-6, 100e-6).1, 1.0);
    }

    #[test]
    fn test_electrical_unscaler_kinds() {
        let u = ElectricalUnscaler::new(&[5.0, 7.0, 3.0], &[15.0, 9.0, 9.0], 1, 1, 1);
        let y = u.unscale(&[-1.0, 0.0, 1.0]).unwrap();
        assert!((y[0] - 5.0).abs() < 1e-12);
        assert!((y[1] - 1e8).abs() < 1e-3);
        assert!((y[2] - 9e-6).abs() < 1e-18);
        // out-of-range actions are clipped
        let y = u.unscale(&[3.0, -3.0, 0.0]).unwrap();
        assert!((y[0] - 15.0).abs() < 1e-12);
        assert!((y[1] - 1e7).abs() < 1e-3);
    }

    #[test]
    fn test_performance_bounds_ordered() {
        for (id, lo, hi) in performance_bounds(3.3) {
            assert!(lo < hi, "{} bounds inverted", id);
        }
    }
}
