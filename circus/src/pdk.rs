// src/pdk.rs
//
// Process design kits known to the registry.

use serde::{Deserialize, Serialize};

use crate::error::CircusError;

/// A process design kit (technology node plus supply corner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pdk {
    Xh035,
    Xh018,
    Xt018,
    Sky130,
    Gpdk045,
    Gpdk090,
    Gpdk180,
}

impl Pdk {
    pub const ALL: [Pdk; 7] = [
        Pdk::Xh035,
        Pdk::Xh018,
        Pdk::Xt018,
        Pdk::Sky130,
        Pdk::Gpdk045,
        Pdk::Gpdk090,
        Pdk::Gpdk180,
    ];

    pub fn parse(s: &str) -> Result<Self, CircusError> {
        match s.trim().to_lowercase().as_str() {
            "xh035" => Ok(Pdk::Xh035),
            "xh018" => Ok(Pdk::Xh018),
            "xt018" => Ok(Pdk::Xt018),
            "sky130" => Ok(Pdk::Sky130),
            "gpdk045" => Ok(Pdk::Gpdk045),
            "gpdk090" => Ok(Pdk::Gpdk090),
            "gpdk180" => Ok(Pdk::Gpdk180),
            _ => Err(CircusError::UnknownPdk { id: s.to_string() }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pdk::Xh035 => "xh035",
            Pdk::Xh018 => "xh018",
            Pdk::Xt018 => "xt018",
            Pdk::Sky130 => "sky130",
            Pdk::Gpdk045 => "gpdk045",
            Pdk::Gpdk090 => "gpdk090",
            Pdk::Gpdk180 => "gpdk180",
        }
    }

    /// Backend id including the supply corner, e.g. `xh035-3V3`.
    ///
    /// Default device-model artifacts live under `~/.circus/<backend_id>/{nmos,pmos}`.
    pub fn backend_id(&self) -> &'static str {
        match self {
            Pdk::Xh035 => "xh035-3V3",
            Pdk::Xh018 => "xh018-1V8",
            Pdk::Xt018 => "xt018-1V8",
            Pdk::Sky130 => "sky130-1V8",
            Pdk::Gpdk045 => "gpdk045-1V0",
            Pdk::Gpdk090 => "gpdk090-1V2",
            Pdk::Gpdk180 => "gpdk180-1V8",
        }
    }

    /// Nominal supply voltage in volts.
    pub fn nominal_vdd(&self) -> f64 {
        match self {
            Pdk::Xh035 => 3.3,
            Pdk::Gpdk045 => 1.0,
            Pdk::Gpdk090 => 1.2,
            _ => 1.8,
        }
    }

    /// Minimum drawn channel length in meters.
    pub fn min_length(&self) -> f64 {
        match self {
            Pdk::Xh035 => 0.35e-6,
            Pdk::Xh018 | Pdk::Xt018 | Pdk::Gpdk180 => 0.18e-6,
            Pdk::Sky130 => 0.15e-6,
            Pdk::Gpdk090 => 0.09e-6,
            Pdk::Gpdk045 => 0.045e-6,
        }
    }

    /// Maximum width of a single finger before a device must be split.
    pub fn max_width(&self) -> f64 {
        match self {
            Pdk::Xh035 => 150e-6,
            _ => 100e-6,
        }
    }
}

impl std::fmt::Display for Pdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_all() {
        for pdk in Pdk::ALL {
            assert_eq!(Pdk::parse(pdk.as_str()).unwrap(), pdk);
        }
    }

    #[test]
    fn test_backend_ids() {
        assert_eq!(Pdk::Xh035.backend_id(), "xh035-3V3");
        assert_eq!(Pdk::Sky130.backend_id(), "sky130-1V8");
        assert_eq!(Pdk::Gpdk045.backend_id(), "gpdk045-1V0");
        assert_eq!(Pdk::Gpdk090.backend_id(), "gpdk090-1V2");
        assert!(Pdk::parse("tsmc7").is_err());
    }

    #[test]
    fn test_backend_suffix_matches_supply() {
        for pdk in Pdk::ALL {
            let suffix = format!("{:.1}", pdk.nominal_vdd()).replace('.', "V");
            assert_eq!(pdk.backend_id(), format!("{}-{}", pdk.as_str(), suffix));
        }
    }
}
