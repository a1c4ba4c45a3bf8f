//! Rebase-aware stabilizer reward engines.
//!
//! A stabilizer pool accepts LP-token stakes and streams reward tokens of
//! an elastic-supply token to stakers. On each epoch the supply-policy
//! controller calls [`Engine::check_stabilizer_and_get_reward`]; the pool's
//! [`GatingPolicy`] decides how much reward share to inject:
//!
//! - **percentage**: a fixed fraction of the controller's pool on every
//!   positive rebase
//! - **curve_weighted**: a Gaussian-weighted compounding accumulator paid
//!   out over expansion runs, with coupons sold on contraction
//! - **random_threshold**: a speculative claim confirmed or refunded by a
//!   verifiable random draw
//!
//! All reward bookkeeping is in shares of total supply, so rebases scale
//! promises without touching them.

pub mod config;
pub mod engine;
pub mod gate;
pub mod revocation;
pub mod scheduler;
pub mod skim;
pub mod staking;
pub mod state;

pub use config::{CurveGateConfig, EngineConfig, GateConfig, ThresholdGateConfig};
pub use engine::{Engine, Env};
pub use gate::GatingPolicy;
pub use state::EngineState;
