// src/trafo/rail_to_rail.rs
//
// Rail-to-rail folded-cascode amplifier with wide-swing current mirror
// (ace id `op11`). Complementary input pairs feed a shared folded cascode;
// mirror ratios are integer current ratios floored at one.

use crate::constraints::{Constraints, ParamMap};
use crate::pdk::Pdk;
use crate::prim::{DeviceKind, DevicePair, IDOVERW, LENGTH};

use super::{operating_point, sizing_map, split_width, supply, DEFAULT_MAX_WIDTH};

pub const INPUTS: [&str; 23] = [
    "MND11:gmoverid",
    "MPD21:gmoverid",
    "MNCM11:gmoverid",
    "MNLS11:gmoverid",
    "MNR1:gmoverid",
    "MPCM21:gmoverid",
    "MPR2:gmoverid",
    "MPCM31:gmoverid",
    "MNCM41:gmoverid",
    "MND11:fug",
    "MPD21:fug",
    "MNCM11:fug",
    "MNLS11:fug",
    "MNR1:fug",
    "MPCM21:fug",
    "MPR2:fug",
    "MPCM31:fug",
    "MNCM41:fug",
    "MNCM43:id",
    "MNCM32:id",
    "MNCM44:id",
    "MPCM33:id",
    "MPCM34:id",
];

pub const GEOMETRIC: [&str; 31] = [
    "Ld1", "Ld2", "Lcm1", "Lls1", "Lr1", "Lcm2", "Lr2", "Lcm3", "Lcm4", "Wd1", "Wd2", "Wcm1",
    "Wls1", "Wr1", "Wcm2", "Wr2", "Wcm3", "Wcm4", "Md1", "Md2", "Mcm1", "Mls1", "Mcm2", "Mcm31",
    "Mcm32", "Mcm33", "Mcm34", "Mcm41", "Mcm42", "Mcm43", "Mcm44",
];

pub const SUPPORTED: [Pdk; 2] = [Pdk::Xh035, Pdk::Xh018];

pub(crate) const X_MIN: [f64; 23] = [
    5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 7.0, 7.0, 7.0, 7.0, 7.0, 7.0, 7.0, 7.0, 7.0, 3.0,
    3.0, 3.0, 1.0, 3.0,
];
pub(crate) const X_MAX: [f64; 23] = [
    15.0, 15.0, 15.0, 15.0, 15.0, 15.0, 15.0, 15.0, 15.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
    9.0, 9.0, 9.0, 9.0, 2.0, 9.0,
];
pub(crate) const SPLIT: (usize, usize, usize) = (9, 9, 5);

fn ratio(num: f64, den: f64) -> f64 {
    let r = (num / den).trunc();
    if r.is_finite() {
        r.max(1.0)
    } else {
        1.0
    }
}

pub fn transform(constraints: &Constraints, devices: &DevicePair, p: &[f64; 23]) -> ParamMap {
    let (gmid, fug) = (&p[0..9], &p[9..18]);
    let [i1, i2, i3, i4, i_x] = [p[18], p[19], p[20], p[21], p[22]];

    let (vdd, i0) = supply(constraints);

    let w1_lim = constraints.max_or("Wcm1", DEFAULT_MAX_WIDTH);
    let w2_lim = constraints.max_or("Wcm2", DEFAULT_MAX_WIDTH);

    let i_u = i0 / 2.0;
    let i_v = (i1 / 2.0).abs() + i_x;
    let i_y = (i2 / 2.0).abs() + i_x;

    let m_dp1 = constraints.init_or("Md1", 2.0);
    let m_dp2 = constraints.init_or("Md2", 2.0);
    let m_cm31 = 1.0;
    let m_cm32 = ratio(i2, i_u) * m_cm31;
    let m_cm33 = ratio(i4, i_u) * m_cm31;
    let m_cm34 = ratio(i_v, i_u) * m_cm31;
    let m_cm41 = 2.0;
    let m_cm42 = m_cm41 / 2.0;
    let m_cm43 = ratio(i1, i0) * m_cm41;
    let m_cm44 = ratio(i3, i0) * m_cm41;

    let op = |i: usize, kind: DeviceKind, vds: f64, vbs: f64| {
        operating_point(devices, kind, gmid[i], fug[i], vds, vbs)
    };
    let dp1 = op(0, DeviceKind::Nmos, vdd / 1.65, -(vdd / 5.0));
    let dp2 = op(1, DeviceKind::Pmos, -(vdd / 1.65), vdd / 5.0);
    let cm1 = op(2, DeviceKind::Nmos, vdd / 16.6, 0.0);
    let ls1 = op(3, DeviceKind::Nmos, vdd / 6.0, -(vdd / 16.5));
    let rs1 = op(4, DeviceKind::Nmos, vdd / 3.5, 0.0);
    let cm2 = op(5, DeviceKind::Pmos, -(vdd / 1.65), vdd / 5.5);
    let rs2 = op(6, DeviceKind::Pmos, -(vdd / 2.0), 0.0);
    let cm3 = op(7, DeviceKind::Pmos, -(vdd / 3.5), 0.0);
    let cm4 = op(8, DeviceKind::Nmos, vdd / 4.5, 0.0);

    let (w_cm1, m_cm1) = split_width(i_y / cm1[IDOVERW], w1_lim);
    let (w_ls1, m_ls1) = split_width(i_x / ls1[IDOVERW], w1_lim);
    let (w_cm2, m_cm2) = split_width(i_x / cm2[IDOVERW], w2_lim);

    sizing_map(&[
        ("Ld1", dp1[LENGTH]),
        ("Ld2", dp2[LENGTH]),
        ("Lcm1", cm1[LENGTH]),
        ("Lls1", ls1[LENGTH]),
        ("Lr1", rs1[LENGTH]),
        ("Lcm2", cm2[LENGTH]),
        ("Lr2", rs2[LENGTH]),
        ("Lcm3", cm3[LENGTH]),
        ("Lcm4", cm4[LENGTH]),
        ("Wd1", i1 / 2.0 / dp1[IDOVERW] / m_dp1),
        ("Wd2", i2 / 2.0 / dp2[IDOVERW] / m_dp2),
        ("Wcm1", w_cm1),
        ("Wls1", w_ls1),
        ("Wr1", i4 / rs1[IDOVERW]),
        ("Wcm2", w_cm2),
        ("Wr2", i3 / rs2[IDOVERW]),
        ("Wcm3", i_u / cm3[IDOVERW]),
        ("Wcm4", i0 / cm4[IDOVERW]),
        ("Md1", m_dp1),
        ("Md2", m_dp2),
        ("Mcm1", m_cm1),
        ("Mls1", m_ls1),
        ("Mcm2", m_cm2),
        ("Mcm31", m_cm31),
        ("Mcm32", m_cm32),
        ("Mcm33", m_cm33),
        ("Mcm34", m_cm34),
        ("Mcm41", m_cm41),
        ("Mcm42", m_cm42),
        ("Mcm43", m_cm43),
        ("Mcm44", m_cm44),
    ])
}

pub fn reference_goal(vdd: f64) -> Vec<(&'static str, f64)> {
    vec![
        ("A", 1.5e-10),
        ("a_0", 65.0),
        ("ugbw", 5.0e6),
        ("sr_r", 2.5e6),
        ("sr_f", 2.5e6),
        ("pm", 45.0),
        ("gm", -50.0),
        ("cmrr", 120.0),
        ("psrr_n", 80.0),
        ("psrr_p", 100.0),
        ("idd", 1.0e-4),
        ("iss", -1.0e-4),
        ("vn_1Hz", 3.5e-6),
        ("vn_10Hz", 1.0e-6),
        ("vn_100Hz", 5.0e-7),
        ("vn_1kHz", 1.65e-7),
        ("vn_10kHz", 5.0e-8),
        ("vn_100kHz", 2.5e-8),
        ("cof", 150.0e6),
        ("overshoot_r", 8.0),
        ("overshoot_f", 25.0),
        ("i_out_min", -2.0e-5),
        ("i_out_max", 3.5e-5),
        ("v_ol", vdd * 0.45),
        ("v_oh", vdd * 0.55),
        ("v_il", vdd * 0.1),
        ("v_ih", vdd),
        ("voff_stat", 1.5e-3),
        ("voff_sys", 0.05),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trafo::test_support::constant_devices;

    #[test]
    fn test_integer_ratios_floor_at_one() {
        let c = Constraints::default();
        let devices = constant_devices(1.0, 1e-6);
        let mut params = [10.0; 23];
        // i1 = 9.5 uA, i2 = 3.2 uA, i3 = 6.5 uA, i4 = 1 uA, iX = 3.1 uA
        params[18..].copy_from_slice(&[9.5e-6, 3.2e-6, 6.5e-6, 1e-6, 3.1e-6]);
        let sizing = transform(&c, &devices, &params);

        assert_eq!(sizing["Mcm31"], 1.0);
        assert_eq!(sizing["Mcm32"], 2.0); // 3.2 / 1.5
        assert_eq!(sizing["Mcm33"], 1.0); // 1 / 1.5 floors to 0, clamped
        assert_eq!(sizing["Mcm34"], 5.0); // (4.75 + 3.1) / 1.5
        assert_eq!(sizing["Mcm42"], 1.0);
        assert_eq!(sizing["Mcm43"], 6.0); // 9.5 / 3 -> 3, times 2
        assert_eq!(sizing["Mcm44"], 4.0); // 6.5 / 3 -> 2, times 2
        assert_eq!(sizing.len(), GEOMETRIC.len());
        assert!(sizing.values().all(|v| v.is_finite()));
    }
}
