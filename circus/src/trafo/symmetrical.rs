// src/trafo/symmetrical.rs
//
// Symmetrical operational amplifier (ace id `op2`).

use crate::constraints::{Constraints, ParamMap};
use crate::pdk::Pdk;
use crate::prim::{DeviceKind, DevicePair, IDOVERW, LENGTH};

use super::{limit_denominator, operating_point, sizing_map, supply};

pub const INPUTS: [&str; 10] = [
    "MNCM11:gmoverid",
    "MPCM221:gmoverid",
    "MNCM31:gmoverid",
    "MND11:gmoverid",
    "MNCM11:fug",
    "MPCM221:fug",
    "MNCM31:fug",
    "MND11:fug",
    "MNCM12:id",
    "MNCM32:id",
];

pub const GEOMETRIC: [&str; 15] = [
    "Ld", "Lcm1", "Lcm2", "Lcm3", "Wd", "Wcm1", "Wcm2", "Wcm3", "Md", "Mcm11", "Mcm21", "Mcm31",
    "Mcm12", "Mcm22", "Mcm32",
];

pub const SUPPORTED: [Pdk; 7] = Pdk::ALL;

pub(crate) const X_MIN: [f64; 10] = [5.0, 5.0, 5.0, 5.0, 6.0, 6.0, 6.0, 6.0, 1.0, 1.0];
pub(crate) const X_MAX: [f64; 10] = [15.0, 15.0, 15.0, 15.0, 9.0, 9.0, 9.0, 9.0, 30.0, 30.0];
pub(crate) const SPLIT: (usize, usize, usize) = (4, 4, 2);

pub fn transform(constraints: &Constraints, devices: &DevicePair, params: &[f64; 10]) -> ParamMap {
    let [gmid_cm1, gmid_cm2, gmid_cm3, gmid_dp1, fug_cm1, fug_cm2, fug_cm3, fug_dp1, i1, i2] = *params;

    let (vdd, i0) = supply(constraints);

    let m1_lim = (constraints.max_or("Mcm12", 42.0) as u64).max(1);
    let m2_lim = (constraints.max_or("Mcm22", 42.0) as u64).max(1);

    let (n1, d1) = limit_denominator(i0 / i1, m1_lim);
    let (n2, d2) = limit_denominator(i1 / 2.0 / i2, m2_lim);

    let m_cm11 = n1.max(1) as f64;
    let m_cm12 = d1.max(1) as f64;
    let m_cm21 = n2.max(1) as f64;
    let m_cm22 = d2.max(1) as f64;

    let m_dp1 = constraints.init_or("Md", 2.0);
    let m_cm31 = constraints.init_or("Mcm31", 2.0);
    let m_cm32 = constraints.init_or("Mcm32", 2.0);

    let cm1 = operating_point(devices, DeviceKind::Nmos, gmid_cm1, fug_cm1, vdd / 4.0, 0.0);
    let cm2 = operating_point(devices, DeviceKind::Pmos, gmid_cm2, fug_cm2, -(vdd / 3.0), 0.0);
    let cm3 = operating_point(devices, DeviceKind::Nmos, gmid_cm3, fug_cm3, vdd / 4.0, 0.0);
    let dp1 = operating_point(
        devices,
        DeviceKind::Nmos,
        gmid_dp1,
        fug_dp1,
        vdd / 3.0,
        -(vdd / 4.0),
    );

    sizing_map(&[
        ("Ld", dp1[LENGTH]),
        ("Lcm1", cm1[LENGTH]),
        ("Lcm2", cm2[LENGTH]),
        ("Lcm3", cm3[LENGTH]),
        ("Wd", i1 / 2.0 / dp1[IDOVERW] / m_dp1),
        ("Wcm1", i0 / cm1[IDOVERW] / m_cm11),
        ("Wcm2", i1 / 2.0 / cm2[IDOVERW] / m_cm21),
        ("Wcm3", i2 / cm3[IDOVERW] / m_cm31),
        ("Md", m_dp1),
        ("Mcm11", m_cm11),
        ("Mcm21", m_cm21),
        ("Mcm31", m_cm31),
        ("Mcm12", m_cm12),
        ("Mcm22", m_cm22),
        ("Mcm32", m_cm32),
    ])
}

pub fn reference_goal(vdd: f64) -> Vec<(&'static str, f64)> {
    vec![
        ("A", 5.0e-10),
        ("a_0", 55.0),
        ("ugbw", 3.5e6),
        ("sr_r", 3.5e6),
        ("sr_f", 3.5e6),
        ("pm", 65.0),
        ("gm", -30.0),
        ("cmrr", 100.0),
        ("psrr_n", 55.0),
        ("psrr_p", 90.0),
        ("idd", 3.0e-5),
        ("iss", 3.3e-5),
        ("vn_1Hz", 6.5e-6),
        ("vn_10Hz", 2.0e-6),
        ("vn_100Hz", 5.5e-7),
        ("vn_1kHz", 1.75e-7),
        ("vn_10kHz", 6.5e-8),
        ("vn_100kHz", 4.5e-8),
        ("cof", 35.0e6),
        ("overshoot_r", 2.5),
        ("overshoot_f", 2.0),
        ("i_out_min", -2.5e-5),
        ("i_out_max", 2.5e-5),
        ("v_ol", vdd * 0.50),
        ("v_oh", vdd * 0.95),
        ("v_il", vdd * 0.25),
        ("v_ih", vdd * 0.95),
        ("voff_stat", 3.0e-3),
        ("voff_sys", -1.5e-3),
    ]
}
