// src/trafo/miller.rs
//
// Miller-compensated two-stage operational amplifier (ace id `op1`).

use crate::constraints::{Constraints, ParamMap};
use crate::pdk::Pdk;
use crate::prim::{DeviceKind, DevicePair, IDOVERW, LENGTH};

use super::{limit_denominator, lcm, operating_point, sizing_map, supply};

pub const INPUTS: [&str; 10] = [
    "MNCM1R:gmoverid",
    "MPCM2R:gmoverid",
    "MPCS1:gmoverid",
    "MND1A:gmoverid",
    "MNCM1R:fug",
    "MPCM2R:fug",
    "MPCS1:fug",
    "MND1A:fug",
    "MNCM1A:id",
    "MNCM1B:id",
];

pub const GEOMETRIC: [&str; 19] = [
    "Ld", "Lcm1", "Lcm2", "Lcs", "Lres", "Wd", "Wcm1", "Wcm2", "Wcs", "Wres", "Wcap", "Md",
    "Mcm11", "Mcm21", "Mcs", "Mcap", "Mcm12", "Mcm22", "Mcm13",
];

pub const SUPPORTED: [Pdk; 2] = [Pdk::Xh035, Pdk::Xh018];

pub(crate) const X_MIN: [f64; 10] = [5.0, 10.0, 5.0, 10.0, 7.0, 7.0, 7.0, 7.0, 3.0, 40.0];
pub(crate) const X_MAX: [f64; 10] = [15.0, 20.0, 15.0, 20.0, 9.0, 9.0, 9.0, 9.0, 9.0, 80.0];
pub(crate) const SPLIT: (usize, usize, usize) = (4, 4, 2);

/// `params` follows [`INPUTS`] in physical units.
pub fn transform(constraints: &Constraints, devices: &DevicePair, params: &[f64; 10]) -> ParamMap {
    let [gmid_cm1, gmid_cm2, gmid_cs1, gmid_dp1, fug_cm1, fug_cm2, fug_cs1, fug_dp1, i1, i2] = *params;

    let (vdd, i0) = supply(constraints);

    let w_res = constraints.init_or("Wres", 2e-6);
    let l_res = constraints.init_or("Lres", 113e-6);
    let w_cap = constraints.init_or("Wcap", 69e-6);
    let m_cap = constraints.init_or("Mcap", 1.0);

    let m_cm21 = constraints.init_or("Mcm21", 2.0);
    let m_cm22 = constraints.init_or("Mcm22", 2.0);
    let m_dp1 = constraints.init_or("Md", 2.0);

    let m1_lim = (constraints.max_or("Mcm12", 40.0) as u64 / 20).max(1);
    let m3_lim = (constraints.max_or("Mcm13", 40.0) as u64).max(1);

    // i0 : i1 and i0 : i2 share the reference mirror Mcm11
    let (n1, d1) = limit_denominator(i0 / i1, m1_lim);
    let (n3, d3) = limit_denominator(i0 / i2, m3_lim);
    let m_cm11 = lcm(n1.max(1), n3.max(1)).max(1);
    let m_cm12 = (m_cm11 / n1.max(1) * d1).max(1);
    let m_cm13 = (m_cm11 / n3.max(1) * d3).max(1);
    let m_cs = m_cm13;

    let cm1 = operating_point(devices, DeviceKind::Nmos, gmid_cm1, fug_cm1, vdd / 4.20, 0.0);
    let cm2 = operating_point(devices, DeviceKind::Pmos, gmid_cm2, fug_cm2, -(vdd / 3.55), 0.0);
    let cs1 = operating_point(devices, DeviceKind::Pmos, gmid_cs1, fug_cs1, -(vdd / 2.0), 0.0);
    let dp1 = operating_point(
        devices,
        DeviceKind::Nmos,
        gmid_dp1,
        fug_dp1,
        vdd / 2.24,
        -(vdd / 4.25),
    );

    let m_cm11 = m_cm11 as f64;
    let m_cs = m_cs as f64;

    let w_cm1 = i0 / cm1[IDOVERW] / m_cm11;
    let w_cm2 = i1 / 2.0 / cm2[IDOVERW] / m_cm21;
    let w_dp1 = i1 / 2.0 / dp1[IDOVERW] / m_dp1;
    let w_cs = i2 / cs1[IDOVERW] / m_cs;

    sizing_map(&[
        ("Ld", dp1[LENGTH]),
        ("Lcm1", cm1[LENGTH]),
        ("Lcm2", cm2[LENGTH]),
        ("Lcs", cs1[LENGTH]),
        ("Lres", l_res),
        ("Wd", w_dp1),
        ("Wcm1", w_cm1),
        ("Wcm2", w_cm2),
        ("Wcs", w_cs),
        ("Wres", w_res),
        ("Wcap", w_cap),
        ("Md", m_dp1),
        ("Mcm11", m_cm11),
        ("Mcm21", m_cm21),
        ("Mcs", m_cs),
        ("Mcap", m_cap),
        ("Mcm12", m_cm12 as f64),
        ("Mcm22", m_cm22),
        ("Mcm13", m_cm13 as f64),
    ])
}

pub fn reference_goal(vdd: f64) -> Vec<(&'static str, f64)> {
    vec![
        ("A", 5.5e-9),
        ("a_0", 100.0),
        ("ugbw", 1.0e6),
        ("sr_r", 600.0e3),
        ("sr_f", -600.0e3),
        ("pm", 90.0),
        ("gm", -90.0),
        ("cmrr", 120.0),
        ("psrr_n", 100.0),
        ("psrr_p", 100.0),
        ("idd", 7.0e-5),
        ("iss", -7.5e-5),
        ("vn_1Hz", 5.0e-6),
        ("vn_10Hz", 1.5e-6),
        ("vn_100Hz", 4.5e-7),
        ("vn_1kHz", 1.5e-7),
        ("vn_10kHz", 5.5e-8),
        ("vn_100kHz", 4.0e-8),
        ("cof", 2.0e9),
        ("overshoot_r", 0.5e-3),
        ("overshoot_f", 0.5e-3),
        ("i_out_min", -5.0e-3),
        ("i_out_max", 7.0e-5),
        ("v_ol", vdd * 0.0333),
        ("v_oh", vdd * 0.82),
        ("v_il", vdd * 0.25),
        ("v_ih", vdd * 0.82),
        ("voff_stat", 3.0e-3),
        ("voff_sys", -250.0e-6),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraint;
    use crate::trafo::test_support::constant_devices;

    fn constraints() -> Constraints {
        let mut c = Constraints::default();
        c.insert("i0", Constraint::fixed(3e-6));
        c.insert("vsup", Constraint::fixed(3.3));
        c.insert("Mcm12", Constraint::sizing(1.0, 40.0, 2.0));
        c.insert("Mcm13", Constraint::sizing(1.0, 40.0, 10.0));
        c
    }

    #[test]
    fn test_keys_and_multiplicities() {
        let devices = constant_devices(10.0, 1e-6);
        let params = [10.0, 15.0, 10.0, 15.0, 1e8, 1e8, 1e8, 1e8, 3e-6, 60e-6];
        let sizing = transform(&constraints(), &devices, &params);

        let mut keys: Vec<&str> = GEOMETRIC.to_vec();
        keys.sort_unstable();
        assert_eq!(sizing.keys().map(String::as_str).collect::<Vec<_>>(), keys);

        // i0 / i2 = 1/20 -> one reference finger, twenty output fingers
        assert_eq!(sizing["Mcm11"], 1.0);
        assert_eq!(sizing["Mcm12"], 1.0);
        assert_eq!(sizing["Mcm13"], 20.0);
        assert_eq!(sizing["Mcs"], 20.0);
        // W = I / (I/W) / M
        assert!((sizing["Wcm1"] - 3e-6 / 10.0).abs() < 1e-15);
        assert!((sizing["Wcs"] - 60e-6 / 10.0 / 20.0).abs() < 1e-15);
        assert!((sizing["Ld"] - 1e-6).abs() < 1e-15);
    }

    #[test]
    fn test_multiplicities_at_least_one() {
        let devices = constant_devices(10.0, 1e-6);
        for i1 in [3e-6, 4.5e-6, 9e-6] {
            for i2 in [40e-6, 57e-6, 80e-6] {
                let params = [5.0, 10.0, 5.0, 10.0, 1e7, 1e7, 1e7, 1e7, i1, i2];
                let sizing = transform(&constraints(), &devices, &params);
                for (k, v) in &sizing {
                    if k.starts_with('M') {
                        assert!(*v >= 1.0, "{} = {}", k, v);
                        assert_eq!(v.fract(), 0.0);
                    }
                }
            }
        }
    }
}
