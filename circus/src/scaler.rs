// src/scaler.rs
//
// Performance scaler: maps raw simulator performance into roughly [-1, 1].
//
// Per column, in order:
//   1. absolute value, if the parameter is in the abs set
//   2. log10, if in the log set and the value is positive
//   3. clip to the curated [min, max] and map linearly onto [-1, 1],
//      if curated bounds exist for the parameter
// Columns without curated bounds pass through raw. Column masks are
// computed once at construction.

use std::collections::BTreeMap;

use crate::error::CircusError;

/// Parameters scaled by magnitude.
pub const ABS_PARAMETERS: [&str; 19] = [
    "A",
    "cof",
    "gm",
    "i_out_max",
    "i_out_min",
    "pm",
    "sr_f",
    "sr_r",
    "ugbw",
    "voff_stat",
    "voff_sys",
    "vn_1Hz",
    "vn_10Hz",
    "vn_100Hz",
    "vn_1kHz",
    "vn_10kHz",
    "vn_100kHz",
    "idd",
    "iss",
];

/// Parameters scaled in decades.
pub const LOG_PARAMETERS: [&str; 17] = [
    "A",
    "cof",
    "i_out_max",
    "i_out_min",
    "sr_f",
    "sr_r",
    "ugbw",
    "voff_stat",
    "voff_sys",
    "vn_1Hz",
    "vn_10Hz",
    "vn_100Hz",
    "vn_1kHz",
    "vn_10kHz",
    "vn_100kHz",
    "idd",
    "iss",
];

/// Curated `(min, max)` per performance parameter, in the transformed
/// (abs/log) domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceBounds {
    entries: BTreeMap<String, (f64, f64)>,
}

impl PerformanceBounds {
    pub fn new(entries: impl IntoIterator<Item = (String, f64, f64)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(id, lo, hi)| (id, (lo, hi)))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<(f64, f64)> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Column {
    abs: bool,
    log: bool,
    bounds: Option<(f64, f64)>,
}

/// Forward and inverse performance scaling over a fixed parameter order.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceScaler {
    ids: Vec<String>,
    columns: Vec<Column>,
}

impl PerformanceScaler {
    /// Build a scaler for `ids` in the given order.
    ///
    /// Duplicate ids and degenerate bounds are construction errors.
    pub fn new(ids: &[String], bounds: &PerformanceBounds) -> Result<Self, CircusError> {
        let mut columns = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(CircusError::ParameterOrder {
                    message: format!("duplicate performance parameter '{}'", id),
                });
            }
            let b = bounds.get(id);
            if let Some((lo, hi)) = b {
                if !(lo < hi) {
                    return Err(CircusError::InvalidBounds {
                        id: id.clone(),
                        min: lo,
                        max: hi,
                    });
                }
            }
            columns.push(Column {
                abs: ABS_PARAMETERS.contains(&id.as_str()),
                log: LOG_PARAMETERS.contains(&id.as_str()),
                bounds: b,
            });
        }
        Ok(Self {
            ids: ids.to_vec(),
            columns,
        })
    }

    pub fn identifiers(&self) -> &[String] {
        &self.ids
    }

    pub fn dim(&self) -> usize {
        self.ids.len()
    }

    /// Whether column `i` is mapped onto [-1, 1].
    pub fn is_scaled(&self, i: usize) -> bool {
        self.columns.get(i).is_some_and(|c| c.bounds.is_some())
    }

    pub fn scale_row(&self, raw: &[f64]) -> Result<Vec<f64>, CircusError> {
        if raw.len() != self.columns.len() {
            return Err(CircusError::shape(
                "performance row",
                self.columns.len(),
                raw.len(),
            ));
        }
        Ok(raw
            .iter()
            .zip(&self.columns)
            .map(|(&x, col)| {
                let Some((lo, hi)) = col.bounds else {
                    return x;
                };
                let a = if col.abs { x.abs() } else { x };
                let l = if col.log && a > 0.0 { a.log10() } else { a };
                let c = l.clamp(lo, hi);
                2.0 * (c - lo) / (hi - lo) - 1.0
            })
            .collect())
    }

    /// Inverse of [`scale_row`](Self::scale_row) for values inside the
    /// curated bounds. Sign lost to the abs step is not recovered.
    pub fn unscale_row(&self, scaled: &[f64]) -> Result<Vec<f64>, CircusError> {
        if scaled.len() != self.columns.len() {
            return Err(CircusError::shape(
                "performance row",
                self.columns.len(),
                scaled.len(),
            ));
        }
        Ok(scaled
            .iter()
            .zip(&self.columns)
            .map(|(&y, col)| {
                let Some((lo, hi)) = col.bounds else {
                    return y;
                };
                let x = lo + (y + 1.0) / 2.0 * (hi - lo);
                if col.log {
                    10f64.powf(x)
                } else {
                    x
                }
            })
            .collect())
    }

    pub fn scale(&self, raw: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, CircusError> {
        raw.iter().map(|row| self.scale_row(row)).collect()
    }

    pub fn unscale(&self, scaled: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, CircusError> {
        scaled.iter().map(|row| self.unscale_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn bounds() -> PerformanceBounds {
        PerformanceBounds::new(vec![
            ("ugbw".to_string(), 5.0, 10.0),
            ("a_0".to_string(), 25.0, 70.0),
            ("pm".to_string(), 0.0, 120.0),
            ("vn_1Hz".to_string(), -10.0, -4.0),
        ])
    }

    #[test]
    fn test_log_roundtrip_within_bounds() {
        let scaler =
            PerformanceScaler::new(&ids(&["ugbw", "vn_1Hz", "a_0"]), &bounds()).unwrap();
        let raw = vec![3.2e7, 5.0e-6, 42.0];
        let back = scaler.unscale_row(&scaler.scale_row(&raw).unwrap()).unwrap();
        for (a, b) in raw.iter().zip(&back) {
            assert!(((a - b) / a).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_scaled_columns_bounded() {
        let scaler = PerformanceScaler::new(&ids(&["ugbw", "pm", "a_0"]), &bounds()).unwrap();
        for raw in [
            vec![1e12, -400.0, 1e6],
            vec![0.0, 0.0, -1e6],
            vec![-5e7, 60.0, 47.5],
        ] {
            for v in scaler.scale_row(&raw).unwrap() {
                assert!((-1.0..=1.0).contains(&v), "{} out of range", v);
            }
        }
        // pm is abs-scaled: -60 and 60 land on the same point
        let a = scaler.scale_row(&[1e7, -60.0, 30.0]).unwrap();
        let b = scaler.scale_row(&[1e7, 60.0, 30.0]).unwrap();
        assert_eq!(a[1], b[1]);
        assert!((a[1] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_unbounded_columns_pass_through() {
        let scaler = PerformanceScaler::new(&ids(&["MND1:id", "ugbw"]), &bounds()).unwrap();
        let row = scaler.scale_row(&[-3.5e-6, 1e10]).unwrap();
        assert_eq!(row[0], -3.5e-6);
        assert!((row[1] - 1.0).abs() < 1e-12);
        assert!(!scaler.is_scaled(0));
        assert!(scaler.is_scaled(1));
    }

    #[test]
    fn test_construction_errors() {
        let dup = PerformanceScaler::new(&ids(&["ugbw", "ugbw"]), &bounds());
        assert!(matches!(dup, Err(CircusError::ParameterOrder { .. })));

        let flat = PerformanceBounds::new(vec![("pm".to_string(), 1.0, 1.0)]);
        let err = PerformanceScaler::new(&ids(&["pm"]), &flat);
        assert!(matches!(err, Err(CircusError::InvalidBounds { .. })));

        let scaler = PerformanceScaler::new(&ids(&["pm"]), &bounds()).unwrap();
        assert!(matches!(
            scaler.scale_row(&[1.0, 2.0]),
            Err(CircusError::ShapeMismatch { .. })
        ));
    }
}
