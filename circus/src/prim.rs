// src/prim.rs
//
// Primitive device model: predicts sizing-relevant quantities of a single
// transistor from its electrical operating point.
//
// Inputs  : [gmoverid, fug, Vds, Vbs]
// Outputs : [idoverw, L, gdsoverw, Vgs]
//
// `fug` is modeled in log10 space on the way in; `idoverw` and `gdsoverw`
// are exponentiated on the way out. Artifacts for one device live in a
// directory holding `scale.X.json`, `scale.Y.json` and `model.json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CircusError;

pub const DEVICE_INPUTS: [&str; 4] = ["gmoverid", "fug", "Vds", "Vbs"];
pub const DEVICE_OUTPUTS: [&str; 4] = ["idoverw", "L", "gdsoverw", "Vgs"];

const LOG_INPUTS: [&str; 1] = ["fug"];
const LOG_OUTPUTS: [&str; 2] = ["idoverw", "gdsoverw"];

pub const SCALE_X_FILE: &str = "scale.X.json";
pub const SCALE_Y_FILE: &str = "scale.Y.json";
pub const MODEL_FILE: &str = "model.json";

/// Index of each output column.
pub const IDOVERW: usize = 0;
pub const LENGTH: usize = 1;
pub const GDSOVERW: usize = 2;
pub const VGS: usize = 3;

/// Device polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Nmos,
    Pmos,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Nmos => "nmos",
            DeviceKind::Pmos => "pmos",
        }
    }
}

/// Anything that maps a scaled 4-vector onto a scaled 4-vector.
pub trait Regressor: Send + Sync {
    fn predict(&self, x: &[f64; 4]) -> [f64; 4];
}

/// Per-feature min-max scaler (same semantics as scikit-learn's
/// `MinMaxScaler`). Zero-range features use unit scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxStats {
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
    #[serde(default = "default_feature_range")]
    pub feature_range: (f64, f64),
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

impl MinMaxStats {
    pub fn new(data_min: Vec<f64>, data_max: Vec<f64>) -> Self {
        Self {
            data_min,
            data_max,
            feature_range: default_feature_range(),
        }
    }

    fn coefficients(&self, i: usize) -> (f64, f64) {
        let (lo, hi) = self.feature_range;
        let range = self.data_max[i] - self.data_min[i];
        let range = if range == 0.0 { 1.0 } else { range };
        let scale = (hi - lo) / range;
        let offset = lo - self.data_min[i] * scale;
        (scale, offset)
    }

    pub fn transform(&self, x: &[f64; 4]) -> [f64; 4] {
        let mut out = [0.0; 4];
        for i in 0..4 {
            let (scale, offset) = self.coefficients(i);
            out[i] = x[i] * scale + offset;
        }
        out
    }

    pub fn inverse_transform(&self, x: &[f64; 4]) -> [f64; 4] {
        let mut out = [0.0; 4];
        for i in 0..4 {
            let (scale, offset) = self.coefficients(i);
            out[i] = (x[i] - offset) / scale;
        }
        out
    }

    fn validate(&self, path: &str) -> Result<(), CircusError> {
        if self.data_min.len() != 4 || self.data_max.len() != 4 {
            return Err(CircusError::InvalidArtifact {
                path: path.to_string(),
                message: format!(
                    "expected 4 features, got data_min={} data_max={}",
                    self.data_min.len(),
                    self.data_max.len()
                ),
            });
        }
        if self.feature_range.0 >= self.feature_range.1 {
            return Err(CircusError::InvalidArtifact {
                path: path.to_string(),
                message: "feature_range must be increasing".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(&self, v: f64) -> f64 {
        match self {
            Activation::Identity => v,
            Activation::Relu => v.max(0.0),
            Activation::Tanh => v.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
        }
    }
}

/// Fully connected layer; `weights` is `[out][in]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

/// Feed-forward network exported as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub layers: Vec<DenseLayer>,
}

impl Mlp {
    /// Check that layer shapes chain from 4 inputs to 4 outputs.
    pub fn validate(&self, path: &str) -> Result<(), CircusError> {
        let invalid = |message: String| CircusError::InvalidArtifact {
            path: path.to_string(),
            message,
        };
        if self.layers.is_empty() {
            return Err(invalid("model has no layers".to_string()));
        }
        let mut width = 4;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.len() != layer.bias.len() {
                return Err(invalid(format!(
                    "layer {}: {} weight rows but {} biases",
                    i,
                    layer.weights.len(),
                    layer.bias.len()
                )));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != width) {
                return Err(invalid(format!(
                    "layer {}: expected {} inputs, got {}",
                    i,
                    width,
                    row.len()
                )));
            }
            width = layer.weights.len();
        }
        if width != 4 {
            return Err(invalid(format!("model produces {} outputs, expected 4", width)));
        }
        Ok(())
    }
}

impl Regressor for Mlp {
    fn predict(&self, x: &[f64; 4]) -> [f64; 4] {
        let mut h: Vec<f64> = x.to_vec();
        for layer in &self.layers {
            h = layer
                .weights
                .iter()
                .zip(&layer.bias)
                .map(|(row, b)| {
                    let z = row.iter().zip(&h).map(|(w, v)| w * v).sum::<f64>() + b;
                    layer.activation.apply(z)
                })
                .collect();
        }
        let mut out = [0.0; 4];
        for (o, v) in out.iter_mut().zip(h) {
            *o = v;
        }
        out
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CircusError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(CircusError::MissingArtifact { path: display });
    }
    let contents = fs::read_to_string(path).map_err(|e| CircusError::InvalidArtifact {
        path: display.clone(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| CircusError::InvalidArtifact {
        path: display,
        message: e.to_string(),
    })
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Learned model of one transistor type, wrapped with its input/output
/// scalers and log transforms.
pub struct PrimitiveDevice {
    kind: DeviceKind,
    mask_x: [bool; 4],
    mask_y: [bool; 4],
    scaler_x: MinMaxStats,
    scaler_y: MinMaxStats,
    model: Box<dyn Regressor>,
}

impl std::fmt::Debug for PrimitiveDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveDevice")
            .field("kind", &self.kind)
            .field("scaler_x", &self.scaler_x)
            .field("scaler_y", &self.scaler_y)
            .finish_non_exhaustive()
    }
}

impl PrimitiveDevice {
    pub fn from_parts(
        kind: DeviceKind,
        scaler_x: MinMaxStats,
        scaler_y: MinMaxStats,
        model: Box<dyn Regressor>,
    ) -> Result<Self, CircusError> {
        scaler_x.validate("scale.X")?;
        scaler_y.validate("scale.Y")?;
        Ok(Self {
            kind,
            mask_x: DEVICE_INPUTS.map(|p| LOG_INPUTS.contains(&p)),
            mask_y: DEVICE_OUTPUTS.map(|p| LOG_OUTPUTS.contains(&p)),
            scaler_x,
            scaler_y,
            model,
        })
    }

    /// Load the artifacts in `dir`. A missing file is fatal.
    pub fn load(dir: &Path, kind: DeviceKind) -> Result<Self, CircusError> {
        let scale_x_path = dir.join(SCALE_X_FILE);
        let scale_y_path = dir.join(SCALE_Y_FILE);
        let model_path = dir.join(MODEL_FILE);

        let scaler_x: MinMaxStats = read_json(&scale_x_path)?;
        scaler_x.validate(&scale_x_path.display().to_string())?;
        let scaler_y: MinMaxStats = read_json(&scale_y_path)?;
        scaler_y.validate(&scale_y_path.display().to_string())?;
        let model: Mlp = read_json(&model_path)?;
        model.validate(&model_path.display().to_string())?;

        Self::from_parts(kind, scaler_x, scaler_y, Box::new(model))
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Predict `[idoverw, L, gdsoverw, Vgs]` for one operating point.
    /// Non-finite values on either side are replaced by zero.
    pub fn predict(&self, x: [f64; 4]) -> [f64; 4] {
        let mut x = x.map(sanitize);
        for (v, &log) in x.iter_mut().zip(&self.mask_x) {
            if log && *v > 0.0 {
                *v = v.log10();
            }
        }
        let scaled = self.scaler_x.transform(&x);
        let raw = self.model.predict(&scaled);
        let mut y = self.scaler_y.inverse_transform(&raw);
        for (v, &exp) in y.iter_mut().zip(&self.mask_y) {
            if exp {
                *v = 10f64.powf(*v);
            }
        }
        y.map(sanitize)
    }
}

/// The n-type and p-type models of one process.
#[derive(Debug)]
pub struct DevicePair {
    pub nmos: PrimitiveDevice,
    pub pmos: PrimitiveDevice,
}

impl DevicePair {
    /// Load `<dir>/nmos` and `<dir>/pmos`.
    pub fn load(dir: &Path) -> Result<Self, CircusError> {
        Ok(Self {
            nmos: PrimitiveDevice::load(&dir.join("nmos"), DeviceKind::Nmos)?,
            pmos: PrimitiveDevice::load(&dir.join("pmos"), DeviceKind::Pmos)?,
        })
    }

    pub fn device(&self, kind: DeviceKind) -> &PrimitiveDevice {
        match kind {
            DeviceKind::Nmos => &self.nmos,
            DeviceKind::Pmos => &self.pmos,
        }
    }
}
