//! Scalar depth parameterizations.
//!
//! A feature's distance along its bearing is not stored directly. The filter
//! keeps an internal parameter `p` and maps it to the physical depth `d`
//! through one of four encodings:
//!
//! ```text
//! Direct:       p = d
//! Inverse:      p = 1/d
//! Logarithmic:  p = ln(d)
//! Hyperbolic:   p = asinh(d)
//! ```
//!
//! Alongside the depth, [`DepthMap::evaluate`] returns the derivatives needed
//! to linearize measurement models: `d_p = dd/dp`, `p_d = dp/dd` and
//! `p_d_p = d(p_d)/dp`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Smallest magnitude allowed for an inverse-depth parameter.
pub const INVERSE_DEPTH_EPSILON: f64 = 1e-6;

/// Encoding used for the internal depth parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "DepthSelector", into = "u8")]
pub enum DepthEncoding {
    Direct,
    #[default]
    Inverse,
    Logarithmic,
    Hyperbolic,
}

impl DepthEncoding {
    pub const ALL: [DepthEncoding; 4] = [
        DepthEncoding::Direct,
        DepthEncoding::Inverse,
        DepthEncoding::Logarithmic,
        DepthEncoding::Hyperbolic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DepthEncoding::Direct => "direct",
            DepthEncoding::Inverse => "inverse",
            DepthEncoding::Logarithmic => "logarithmic",
            DepthEncoding::Hyperbolic => "hyperbolic",
        }
    }
}

impl fmt::Display for DepthEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<DepthEncoding> for u8 {
    fn from(encoding: DepthEncoding) -> Self {
        match encoding {
            DepthEncoding::Direct => 0,
            DepthEncoding::Inverse => 1,
            DepthEncoding::Logarithmic => 2,
            DepthEncoding::Hyperbolic => 3,
        }
    }
}

/// Integer selector as found in configuration files (0..=3).
impl TryFrom<i64> for DepthEncoding {
    type Error = StateError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(DepthEncoding::Direct),
            1 => Ok(DepthEncoding::Inverse),
            2 => Ok(DepthEncoding::Logarithmic),
            3 => Ok(DepthEncoding::Hyperbolic),
            other => Err(StateError::InvalidDepthEncoding(other.to_string())),
        }
    }
}

impl FromStr for DepthEncoding {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "direct" | "regular" => Ok(DepthEncoding::Direct),
            "inverse" => Ok(DepthEncoding::Inverse),
            "log" | "logarithmic" => Ok(DepthEncoding::Logarithmic),
            "hyperbolic" => Ok(DepthEncoding::Hyperbolic),
            _ => match lowered.parse::<i64>() {
                Ok(index) => DepthEncoding::try_from(index),
                Err(_) => Err(StateError::InvalidDepthEncoding(s.to_string())),
            },
        }
    }
}

/// Accepts either the integer selector or the encoding name.
#[derive(Deserialize)]
#[serde(untagged)]
enum DepthSelector {
    Index(i64),
    Name(String),
}

impl TryFrom<DepthSelector> for DepthEncoding {
    type Error = StateError;

    fn try_from(selector: DepthSelector) -> Result<Self> {
        match selector {
            DepthSelector::Index(index) => DepthEncoding::try_from(index),
            DepthSelector::Name(name) => name.parse(),
        }
    }
}

/// Depth and derivative values for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthValues {
    /// Physical depth `d`.
    pub depth: f64,
    /// `dd/dp`
    pub d_p: f64,
    /// `dp/dd`
    pub p_d: f64,
    /// `d(p_d)/dp`
    pub p_d_p: f64,
}

/// Maps an internal depth parameter to a physical depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepthMap {
    encoding: DepthEncoding,
}

impl DepthMap {
    pub fn new(encoding: DepthEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> DepthEncoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: DepthEncoding) {
        self.encoding = encoding;
    }

    /// Set the encoding from its integer selector. Unknown selectors leave
    /// the current encoding untouched and return an error.
    pub fn set_encoding_index(&mut self, index: i64) -> Result<()> {
        self.encoding = DepthEncoding::try_from(index)?;
        Ok(())
    }

    /// Evaluate depth and derivatives for parameter `p`.
    pub fn evaluate(&self, p: f64) -> DepthValues {
        match self.encoding {
            DepthEncoding::Direct => evaluate_direct(p),
            DepthEncoding::Inverse => evaluate_inverse(p),
            DepthEncoding::Logarithmic => evaluate_logarithmic(p),
            DepthEncoding::Hyperbolic => evaluate_hyperbolic(p),
        }
    }

    /// Physical depth for parameter `p`.
    pub fn depth(&self, p: f64) -> f64 {
        self.evaluate(p).depth
    }

    /// Internal parameter for a physical depth.
    ///
    /// Inverse and logarithmic encodings need `depth > 0`.
    pub fn parameter(&self, depth: f64) -> Result<f64> {
        if !depth.is_finite() {
            return Err(self.invalid_depth(depth));
        }
        match self.encoding {
            DepthEncoding::Direct => Ok(depth),
            DepthEncoding::Inverse if depth > 0.0 => Ok(1.0 / depth),
            DepthEncoding::Logarithmic if depth > 0.0 => Ok(depth.ln()),
            DepthEncoding::Hyperbolic => Ok(depth.asinh()),
            _ => Err(self.invalid_depth(depth)),
        }
    }

    fn invalid_depth(&self, depth: f64) -> StateError {
        StateError::InvalidDepth {
            depth,
            encoding: self.encoding.name(),
        }
    }
}

fn evaluate_direct(p: f64) -> DepthValues {
    DepthValues {
        depth: p,
        d_p: 1.0,
        p_d: 1.0,
        p_d_p: 0.0,
    }
}

fn evaluate_inverse(p: f64) -> DepthValues {
    // p ~ 0 is a point at infinity; keep it finite and keep the sign.
    let p = if p.abs() < INVERSE_DEPTH_EPSILON {
        if p >= 0.0 {
            INVERSE_DEPTH_EPSILON
        } else {
            -INVERSE_DEPTH_EPSILON
        }
    } else {
        p
    };
    let depth = 1.0 / p;
    DepthValues {
        depth,
        d_p: -depth * depth,
        p_d: -p * p,
        p_d_p: -2.0 * p,
    }
}

fn evaluate_logarithmic(p: f64) -> DepthValues {
    let depth = p.exp();
    let d_p = depth;
    DepthValues {
        depth,
        d_p,
        p_d: 1.0 / depth,
        p_d_p: -d_p / (depth * depth),
    }
}

fn evaluate_hyperbolic(p: f64) -> DepthValues {
    let depth = p.sinh();
    let d_p = p.cosh();
    let denom = depth * depth + 1.0;
    DepthValues {
        depth,
        d_p,
        p_d: 1.0 / denom.sqrt(),
        p_d_p: -depth * d_p / denom.powf(1.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    const STEP: f64 = 1e-6;

    /// Valid parameter range per encoding (positive depth).
    fn sample_parameter(encoding: DepthEncoding, rng: &mut impl Rng) -> f64 {
        match encoding {
            DepthEncoding::Direct => rng.gen_range(0.1..20.0),
            DepthEncoding::Inverse => rng.gen_range(0.05..5.0),
            DepthEncoding::Logarithmic => rng.gen_range(-2.0..3.0),
            DepthEncoding::Hyperbolic => rng.gen_range(0.1..4.0),
        }
    }

    #[test]
    fn test_depth_derivative_matches_finite_difference() {
        let mut rng = rand::thread_rng();
        for encoding in DepthEncoding::ALL {
            let map = DepthMap::new(encoding);
            for _ in 0..50 {
                let p = sample_parameter(encoding, &mut rng);
                let values = map.evaluate(p);
                let numeric = (map.depth(p + STEP) - map.depth(p - STEP)) / (2.0 * STEP);
                assert_relative_eq!(values.d_p, numeric, max_relative = 1e-5, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_param_wrt_depth_is_reciprocal() {
        let mut rng = rand::thread_rng();
        for encoding in DepthEncoding::ALL {
            let map = DepthMap::new(encoding);
            for _ in 0..50 {
                let p = sample_parameter(encoding, &mut rng);
                let values = map.evaluate(p);
                assert_relative_eq!(values.p_d * values.d_p, 1.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_second_derivative_matches_finite_difference() {
        let mut rng = rand::thread_rng();
        for encoding in DepthEncoding::ALL {
            let map = DepthMap::new(encoding);
            for _ in 0..50 {
                let p = sample_parameter(encoding, &mut rng);
                let values = map.evaluate(p);
                let numeric =
                    (map.evaluate(p + STEP).p_d - map.evaluate(p - STEP).p_d) / (2.0 * STEP);
                assert_relative_eq!(values.p_d_p, numeric, max_relative = 1e-5, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_inverse_clamps_near_zero() {
        let map = DepthMap::new(DepthEncoding::Inverse);
        let boundary = map.evaluate(INVERSE_DEPTH_EPSILON);
        let negative_boundary = map.evaluate(-INVERSE_DEPTH_EPSILON);

        for p in [0.0, 1e-9, 5e-7, 9.99e-7] {
            let values = map.evaluate(p);
            assert!(values.depth.is_finite());
            assert_eq!(values, boundary);
        }
        for p in [-1e-9, -5e-7] {
            assert_eq!(map.evaluate(p), negative_boundary);
        }
        assert_relative_eq!(boundary.depth, 1e6, epsilon = 1e-6);
    }

    #[test]
    fn test_parameter_inverts_depth() {
        for encoding in DepthEncoding::ALL {
            let map = DepthMap::new(encoding);
            for depth in [0.3, 1.0, 2.0, 17.5] {
                let p = map.parameter(depth).unwrap();
                assert_relative_eq!(map.depth(p), depth, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_parameter_rejects_non_positive_depth() {
        assert!(DepthMap::new(DepthEncoding::Inverse).parameter(0.0).is_err());
        assert!(DepthMap::new(DepthEncoding::Logarithmic).parameter(-1.0).is_err());
        assert!(DepthMap::new(DepthEncoding::Direct).parameter(f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let mut map = DepthMap::new(DepthEncoding::Logarithmic);
        let err = map.set_encoding_index(7).unwrap_err();
        assert_eq!(err, StateError::InvalidDepthEncoding("7".to_string()));
        assert_eq!(map.encoding(), DepthEncoding::Logarithmic);

        assert!("cubic".parse::<DepthEncoding>().is_err());
        assert_eq!("3".parse::<DepthEncoding>().unwrap(), DepthEncoding::Hyperbolic);
        assert_eq!("regular".parse::<DepthEncoding>().unwrap(), DepthEncoding::Direct);
    }

    #[test]
    fn test_selector_deserializes_from_index_or_name() {
        let from_index: DepthEncoding = serde_yaml::from_str("2").unwrap();
        let from_name: DepthEncoding = serde_yaml::from_str("hyperbolic").unwrap();
        assert_eq!(from_index, DepthEncoding::Logarithmic);
        assert_eq!(from_name, DepthEncoding::Hyperbolic);
        assert!(serde_yaml::from_str::<DepthEncoding>("9").is_err());
    }
}
