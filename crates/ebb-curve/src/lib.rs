//! # ebb-curve: Gaussian reward-intensity curve.
//!
//! The curve-weighted stabilizer converts each epoch's expansion percentage
//! into a reward multiplier by evaluating a normal density:
//!
//! ```text
//! f(x) = 1 / (σ·√(2π)) · exp(-(x - μ)² / (2σ²))
//! ```
//!
//! Evaluation is in `f64`; results cross into the engine's 18-decimal
//! fixed point through [`to_fixed`] and [`from_fixed`].

pub mod gaussian;

pub use gaussian::{curve_value, from_fixed, to_fixed, CurveParams};
