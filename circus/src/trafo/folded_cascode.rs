// src/trafo/folded_cascode.rs
//
// Folded-cascode operational amplifier (ace id `op8`).
//
// The cascode branch carries half the differential-pair current plus the
// cascode bias current: i3 = i1 / 2 + i4. Cascode devices wider than the
// netlist's width limit are split into parallel fingers.

use crate::constraints::{Constraints, ParamMap};
use crate::pdk::Pdk;
use crate::prim::{DeviceKind, DevicePair, IDOVERW, LENGTH};

use super::{limit_denominator, operating_point, sizing_map, split_width, supply, DEFAULT_MAX_WIDTH};

pub const INPUTS: [&str; 14] = [
    "MNCM51:gmoverid",
    "MPCM41:gmoverid",
    "MPCM31:gmoverid",
    "MNCM21:gmoverid",
    "MNCM11:gmoverid",
    "MND11:gmoverid",
    "MNCM51:fug",
    "MPCM41:fug",
    "MPCM31:fug",
    "MNCM21:fug",
    "MNCM11:fug",
    "MND11:fug",
    "MNCM53:id",
    "MNCM21:id",
];

pub const GEOMETRIC: [&str; 22] = [
    "Ld1", "Lcm1", "Lcm2", "Lcm3", "Lcm4", "Lcm5", "Wd1", "Wcm1", "Wcm2", "Wcm3", "Wcm4", "Wcm5",
    "Md1", "Mcm1", "Mcm2", "Mcm3", "Mcm41", "Mcm51", "Mcm42", "Mcm52", "Mcm43", "Mcm53",
];

pub const SUPPORTED: [Pdk; 7] = Pdk::ALL;

pub(crate) const X_MIN: [f64; 14] = [
    5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 1.0, 4.0,
];
pub(crate) const X_MAX: [f64; 14] = [
    15.0, 15.0, 15.0, 15.0, 15.0, 15.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 4.0, 8.0,
];
pub(crate) const SPLIT: (usize, usize, usize) = (6, 6, 2);

pub fn transform(constraints: &Constraints, devices: &DevicePair, params: &[f64; 14]) -> ParamMap {
    let [gmid_cm1, gmid_cm2, gmid_cm3, gmid_cm4, gmid_cm5, gmid_dp1, fug_cm1, fug_cm2, fug_cm3, fug_cm4, fug_cm5, fug_dp1, i1, i4] =
        *params;

    let i2 = i1;
    let i3 = i1 / 2.0 + i4;

    let (vdd, i0) = supply(constraints);

    let m5_lim = (constraints.max_or("Mcm53", 42.0) as u64).max(1);
    let m4_lim = (constraints.max_or("Mcm43", 42.0) as u64).max(1);

    let w1_lim = constraints.max_or("Wcm1", DEFAULT_MAX_WIDTH);
    let w2_lim = constraints.max_or("Wcm2", DEFAULT_MAX_WIDTH);
    let w3_lim = constraints.max_or("Wcm3", DEFAULT_MAX_WIDTH);

    let (n5, d5) = limit_denominator(i0 / i1, m5_lim);
    let (n4, d4) = limit_denominator(i2 / i3, m4_lim);

    let m_dp1 = constraints.init_or("Md1", 2.0);
    let m_cm51 = n5.max(1) as f64;
    let m_cm53 = d5.max(1) as f64;
    let m_cm41 = n4.max(1) as f64;
    let m_cm43 = d4.max(1) as f64;

    let cm1 = operating_point(devices, DeviceKind::Nmos, gmid_cm1, fug_cm1, vdd / 5.0, 0.0);
    let cm2 = operating_point(
        devices,
        DeviceKind::Nmos,
        gmid_cm2,
        fug_cm2,
        vdd / 3.5,
        -(vdd / 5.0),
    );
    let cm3 = operating_point(
        devices,
        DeviceKind::Pmos,
        gmid_cm3,
        fug_cm3,
        -(vdd / 3.0),
        vdd / 5.0,
    );
    let cm4 = operating_point(devices, DeviceKind::Pmos, gmid_cm4, fug_cm4, -(vdd / 3.5), 0.0);
    let cm5 = operating_point(devices, DeviceKind::Nmos, gmid_cm5, fug_cm5, vdd / 4.5, 0.0);
    let dp1 = operating_point(
        devices,
        DeviceKind::Nmos,
        gmid_dp1,
        fug_dp1,
        vdd / 2.0,
        -(vdd / 4.5),
    );

    let (w_cm1, m_cm1) = split_width(i4 / cm1[IDOVERW], w1_lim);
    let (w_cm2, m_cm2) = split_width(i4 / cm2[IDOVERW], w2_lim);
    let (w_cm3, m_cm3) = split_width(i4 / cm3[IDOVERW], w3_lim);

    sizing_map(&[
        ("Ld1", dp1[LENGTH]),
        ("Lcm1", cm1[LENGTH]),
        ("Lcm2", cm2[LENGTH]),
        ("Lcm3", cm3[LENGTH]),
        ("Lcm4", cm4[LENGTH]),
        ("Lcm5", cm5[LENGTH]),
        ("Wd1", i1 / 2.0 / dp1[IDOVERW] / m_dp1),
        ("Wcm1", w_cm1),
        ("Wcm2", w_cm2),
        ("Wcm3", w_cm3),
        ("Wcm4", i2 / cm4[IDOVERW] / m_cm41),
        ("Wcm5", i0 / cm5[IDOVERW] / m_cm51),
        ("Md1", m_dp1),
        ("Mcm1", m_cm1),
        ("Mcm2", m_cm2),
        ("Mcm3", m_cm3),
        ("Mcm41", m_cm41),
        ("Mcm51", m_cm51),
        ("Mcm42", m_cm43),
        ("Mcm52", m_cm53),
        ("Mcm43", m_cm43),
        ("Mcm53", m_cm53),
    ])
}

pub fn reference_goal(vdd: f64) -> Vec<(&'static str, f64)> {
    vec![
        ("A", 5.5e-10),
        ("a_0", 65.0),
        ("ugbw", 750.0e3),
        ("sr_r", 750.0e3),
        ("sr_f", 750.0e3),
        ("pm", 80.0),
        ("gm", -65.0),
        ("cmrr", 120.0),
        ("psrr_n", 100.0),
        ("psrr_p", 120.0),
        ("idd", 1.75e-5),
        ("iss", -2.0e-5),
        ("vn_1Hz", 1.5e-5),
        ("vn_10Hz", 4.5e-6),
        ("vn_100Hz", 1.5e-6),
        ("vn_1kHz", 4.0e-7),
        ("vn_10kHz", 1.5e-7),
        ("vn_100kHz", 1.0e-7),
        ("cof", 300.0e6),
        ("overshoot_r", 250.0e-6),
        ("overshoot_f", 250.0e-6),
        ("i_out_min", -6.0e-6),
        ("i_out_max", 8.5e-6),
        ("v_ol", vdd * 0.45),
        ("v_oh", vdd * 0.50),
        ("v_il", vdd * 0.22),
        ("v_ih", vdd),
        ("voff_stat", 5.0e-3),
        ("voff_sys", -5.0e-7),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraint;
    use crate::trafo::test_support::constant_devices;

    #[test]
    fn test_cascode_split_and_ratio() {
        let mut c = Constraints::default();
        c.insert("i0", Constraint::fixed(3e-6));
        c.insert("Wcm1", Constraint::sizing(1e-6, 20e-6, 5e-6));
        let devices = constant_devices(0.1, 1e-6);
        // i1 = 3 uA, i4 = 4.5 uA -> i3 = 6 uA, i2 / i3 = 1/2
        let mut params = [10.0; 14];
        params[12] = 3e-6;
        params[13] = 4.5e-6;
        let sizing = transform(&c, &devices, &params);

        assert_eq!(sizing["Mcm51"], 1.0);
        assert_eq!(sizing["Mcm53"], 1.0);
        assert_eq!(sizing["Mcm41"], 1.0);
        assert_eq!(sizing["Mcm43"], 2.0);
        assert_eq!(sizing["Mcm42"], sizing["Mcm43"]);

        // 4.5 uA at 0.1 A/m is 45 um; limit 20 um -> 3 fingers of 15 um
        assert_eq!(sizing["Mcm1"], 3.0);
        assert!((sizing["Wcm1"] - 15e-6).abs() < 1e-12);
        // default limit 100 um keeps a single finger
        assert_eq!(sizing["Mcm2"], 1.0);
        assert!((sizing["Wcm2"] - 45e-6).abs() < 1e-12);
        assert_eq!(sizing.len(), GEOMETRIC.len());
    }
}
