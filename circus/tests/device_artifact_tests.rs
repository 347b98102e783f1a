// tests/device_artifact_tests.rs
//
// Device-model artifacts on disk and electrical environments built on them.
//
// These tests verify:
// - a `<dir>/{nmos,pmos}/{scale.X,scale.Y,model}.json` tree loads
// - missing or malformed artifacts are construction errors
// - electrical environments map actions through the topology transform

use std::fs;
use std::path::Path;

use serde_json::json;

use circus::config::{ActionMode, EnvConfig, EnvId, EnvVariant};
use circus::pdk::Pdk;
use circus::prim::{
    DeviceKind, DevicePair, MinMaxStats, PrimitiveDevice, Regressor, GDSOVERW, IDOVERW, LENGTH,
    MODEL_FILE, SCALE_X_FILE, SCALE_Y_FILE, VGS,
};
use circus::rl::{CircusEnv, ResetTarget};
use circus::sim::SyntheticBackend;
use circus::topology::Topology;
use circus::CircusError;

const IDOVERW_VALUE: f64 = 8.0;
const LENGTH_VALUE: f64 = 1e-6;

/// Write one device directory whose network ignores its inputs and emits
/// `[log10(id/w), L, log10(gds/w), Vgs]` through the bias of a zero layer.
fn write_device(dir: &Path) {
    fs::create_dir_all(dir).expect("device dir");
    let unit = json!({ "data_min": [0.0, 0.0, 0.0, 0.0], "data_max": [1.0, 1.0, 1.0, 1.0] });
    fs::write(dir.join(SCALE_X_FILE), unit.to_string()).expect("scale.X");
    fs::write(dir.join(SCALE_Y_FILE), unit.to_string()).expect("scale.Y");
    let weights = vec![vec![0.0; 4]; 4];
    let bias = vec![IDOVERW_VALUE.log10(), LENGTH_VALUE, -6.0, 0.7];
    let model = json!({
        "layers": [
            { "weights": weights, "bias": bias, "activation": "identity" }
        ]
    });
    fs::write(dir.join(MODEL_FILE), model.to_string()).expect("model");
}

fn write_models(root: &Path) {
    write_device(&root.join("nmos"));
    write_device(&root.join("pmos"));
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_device_pair_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_models(dir.path());

    let pair = DevicePair::load(dir.path()).expect("load");
    assert_eq!(pair.nmos.kind(), DeviceKind::Nmos);
    assert_eq!(pair.device(DeviceKind::Pmos).kind(), DeviceKind::Pmos);

    let y = pair.nmos.predict([10.0, 1e8, 1.65, 0.0]);
    assert!((y[IDOVERW] - IDOVERW_VALUE).abs() < 1e-9);
    assert!((y[LENGTH] - LENGTH_VALUE).abs() < 1e-15);
    assert!((y[GDSOVERW] - 1e-6).abs() < 1e-15);
    assert!((y[VGS] - 0.7).abs() < 1e-12);
}

#[test]
fn test_missing_artifact_is_reported_with_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_models(dir.path());
    fs::remove_file(dir.path().join("pmos").join(MODEL_FILE)).expect("remove");

    match DevicePair::load(dir.path()) {
        Err(CircusError::MissingArtifact { path }) => {
            assert!(path.ends_with(MODEL_FILE), "unexpected path {}", path);
            assert!(path.contains("pmos"));
        }
        other => panic!("expected MissingArtifact, got {:?}", other),
    }
}

#[test]
fn test_malformed_artifacts_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_models(dir.path());
    fs::write(dir.path().join("nmos").join(SCALE_X_FILE), "not json").expect("write");
    assert!(matches!(
        DevicePair::load(dir.path()),
        Err(CircusError::InvalidArtifact { .. })
    ));

    // well-formed JSON with a 3-feature scaler
    let three = json!({ "data_min": [0.0, 0.0, 0.0], "data_max": [1.0, 1.0, 1.0] });
    fs::write(dir.path().join("nmos").join(SCALE_X_FILE), three.to_string()).expect("write");
    assert!(matches!(
        DevicePair::load(dir.path()),
        Err(CircusError::InvalidArtifact { .. })
    ));
}

// =============================================================================
// Electrical environments
// =============================================================================

#[test]
fn test_electrical_env_from_model_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_models(dir.path());

    let id = EnvId::parse("op2-xh035-elec-v0").expect("id");
    let mut cfg = EnvConfig::default().with_num_envs(2).with_num_steps(4);
    cfg.model_dir = Some(dir.path().to_path_buf());
    let mut env = CircusEnv::new(&SyntheticBackend::new(5), id, cfg).expect("elec env");

    assert_eq!(env.action_keys().len(), Topology::Symmetrical.electrical_identifiers().len());
    env.reset(&ResetTarget::all()).expect("reset");
    let a = env.sample_actions();
    let out = env.step(&a).expect("step");
    assert_eq!(out.reward.len(), 2);

    let mut expected: Vec<&str> = Topology::Symmetrical.geometric_identifiers().to_vec();
    expected.sort_unstable();
    for sizing in env.current_sizing() {
        let keys: Vec<&str> = sizing.keys().map(String::as_str).collect();
        assert_eq!(keys, expected);
        assert!(sizing.values().all(|v| v.is_finite()));
    }
    for (k, v) in &env.current_sizing()[0] {
        if k.starts_with('L') {
            assert!((v - LENGTH_VALUE).abs() < 1e-15, "{} = {}", k, v);
        }
    }
}

/// Analytic stand-in for a trained network.
struct Square;

impl Regressor for Square {
    fn predict(&self, x: &[f64; 4]) -> [f64; 4] {
        [x[0] * x[0], 0.5, -x[1], 0.6]
    }
}

fn analytic_devices() -> DevicePair {
    let make = |kind| {
        PrimitiveDevice::from_parts(
            kind,
            MinMaxStats::new(vec![5.0, 6.0, 0.0, -1.0], vec![20.0, 10.0, 3.3, 0.0]),
            MinMaxStats::new(vec![-1.0, 0.2e-6, -9.0, 0.0], vec![2.0, 10e-6, -3.0, 1.5]),
            Box::new(Square),
        )
        .expect("device")
    };
    DevicePair {
        nmos: make(DeviceKind::Nmos),
        pmos: make(DeviceKind::Pmos),
    }
}

#[test]
fn test_electrical_env_with_supplied_devices() {
    for (topology, pdk) in [
        (Topology::Miller, Pdk::Xh035),
        (Topology::FoldedCascode, Pdk::Gpdk090),
        (Topology::RailToRail, Pdk::Xh018),
    ] {
        let id = EnvId::new(topology, pdk, ActionMode::Electrical, EnvVariant::Goal);
        let mut env = CircusEnv::with_devices(
            &SyntheticBackend::default(),
            id,
            EnvConfig::default(),
            analytic_devices(),
        )
        .expect("elec env");

        let d = env.action_space().dim();
        for a in [-1.0, 0.0, 1.0] {
            let out = env.step(&[vec![a; d]]).expect("step");
            assert!(out.observation.observation[0].iter().all(|v| v.is_finite()));
            let sizing = env.action_to_sizing(&vec![a; d]).expect("sizing");
            assert_eq!(sizing.len(), topology.geometric_identifiers().len());
            for (k, v) in &sizing {
                if k.starts_with('M') {
                    assert!(*v >= 1.0, "{} {} = {}", topology, k, v);
                }
            }
        }
    }
}

#[test]
fn test_electrical_action_dimension_checked() {
    let id = EnvId::new(Topology::Symmetrical, Pdk::Xh035, ActionMode::Electrical, EnvVariant::NonGoal);
    let env = CircusEnv::with_devices(
        &SyntheticBackend::default(),
        id,
        EnvConfig::default(),
        analytic_devices(),
    )
    .expect("elec env");
    assert!(matches!(
        env.action_to_sizing(&[0.0; 3]),
        Err(CircusError::ShapeMismatch { .. })
    ));
}
