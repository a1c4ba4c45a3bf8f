//! Normal-density evaluation with precomputed coefficients.
//!
//! [`CurveParams`] stores `1/(σ·√(2π))` and `2σ²` alongside the mean and
//! deviation so each evaluation is one subtraction, one division and one
//! `exp`. The generic [`curve_value`] works over any [`Float`], so tests can
//! cross-check `f32` against `f64`.

use num_traits::Float;
use serde::{Deserialize, Serialize};

use ebb_core::constants::PRECISION;
use ebb_core::error::ConfigError;

/// Deviation used when none is configured (≈ 1.3773).
pub const DEFAULT_DEVIATION: f64 = 1.377_336_426_5;

/// Precomputed normal-curve coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct CurveParams {
    /// Peak location μ.
    pub mean: f64,
    /// Standard deviation σ.
    pub deviation: f64,
    /// `1 / (σ·√(2π))`.
    pub inv_dev_sqrt_two_pi: f64,
    /// `2σ²`.
    pub two_dev_squared: f64,
}

impl CurveParams {
    /// Build the coefficients for a curve with the given mean and deviation.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] unless both are finite and `deviation > 0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ebb_curve::CurveParams;
    /// let c = CurveParams::from_deviation(0.0, 1.0).unwrap();
    /// assert!((c.value(0.0) - 0.398_942_280_4).abs() < 1e-9);
    /// ```
    pub fn from_deviation(mean: f64, deviation: f64) -> Result<Self, ConfigError> {
        let params = Self {
            mean,
            deviation,
            inv_dev_sqrt_two_pi: 1.0 / (deviation * (2.0 * std::f64::consts::PI).sqrt()),
            two_dev_squared: 2.0 * deviation * deviation,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check that the stored coefficients describe a usable curve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mean.is_finite() {
            return Err(ConfigError::Invalid { field: "curve.mean", reason: format!("{} is not finite", self.mean) });
        }
        if !(self.deviation.is_finite() && self.deviation > 0.0) {
            return Err(ConfigError::Invalid {
                field: "curve.deviation",
                reason: format!("{} must be positive and finite", self.deviation),
            });
        }
        if !(self.inv_dev_sqrt_two_pi.is_finite() && self.inv_dev_sqrt_two_pi > 0.0) {
            return Err(ConfigError::Invalid {
                field: "curve.inv_dev_sqrt_two_pi",
                reason: format!("{} must be positive and finite", self.inv_dev_sqrt_two_pi),
            });
        }
        if !(self.two_dev_squared.is_finite() && self.two_dev_squared > 0.0) {
            return Err(ConfigError::Invalid {
                field: "curve.two_dev_squared",
                reason: format!("{} must be positive and finite", self.two_dev_squared),
            });
        }
        Ok(())
    }

    /// Curve height at `offset`.
    pub fn value(&self, offset: f64) -> f64 {
        curve_value(offset, self.mean, self.inv_dev_sqrt_two_pi, self.two_dev_squared)
    }

    /// Curve height at `offset` as an 18-decimal fixed-point value.
    pub fn value_fixed(&self, offset: f64) -> u128 {
        to_fixed(self.value(offset))
    }
}

impl Default for CurveParams {
    fn default() -> Self {
        let deviation = DEFAULT_DEVIATION;
        Self {
            mean: 0.0,
            deviation,
            inv_dev_sqrt_two_pi: 1.0 / (deviation * (2.0 * std::f64::consts::PI).sqrt()),
            two_dev_squared: 2.0 * deviation * deviation,
        }
    }
}

/// Evaluate `inv · exp(-(offset - mean)² / two_dev_squared)`.
pub fn curve_value<F: Float>(offset: F, mean: F, inv_dev_sqrt_two_pi: F, two_dev_squared: F) -> F {
    let d = offset - mean;
    inv_dev_sqrt_two_pi * (-(d * d) / two_dev_squared).exp()
}

/// Convert a non-negative float to 18-decimal fixed point.
///
/// Negative and NaN inputs map to 0; values beyond `u128` saturate.
pub fn to_fixed(value: f64) -> u128 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    // `as` saturates on overflow, including +inf.
    (value * PRECISION as f64) as u128
}

/// Convert an 18-decimal fixed-point value to `f64`.
pub fn from_fixed(value: u128) -> f64 {
    value as f64 / PRECISION as f64
}
