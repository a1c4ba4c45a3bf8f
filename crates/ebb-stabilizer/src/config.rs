//! Deployment configuration for one stabilizer pool.
//!
//! [`EngineConfig`] can be built in code or loaded with
//! [`EngineConfig::from_file`], which reads TOML, JSON or YAML (chosen by
//! extension) and layers `EBB__`-prefixed environment variables on top,
//! with `__` separating nested keys:
//!
//! ```text
//! EBB__POOL_ENABLED=true
//! EBB__LIMITS__USER_LIMIT=5000000000000000000
//! ```
//!
//! Token amounts may be written as integers or decimal strings; TOML
//! integers stop at `i64::MAX`, so anything above ~9.2 tokens needs the
//! string form there.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ebb_core::constants::{DEFAULT_EPOCHS_PER_CYCLE, DEFAULT_ORACLE_PERIOD, PRECISION};
use ebb_core::error::ConfigError;
use ebb_core::types::{amount, Address};

use crate::revocation::RevocationPolicy;
use crate::skim::MultiSigSkim;
use crate::staking::StakeLimits;

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "EBB";

/// Everything needed to construct an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Account the engine holds tokens under.
    pub engine: Address,
    /// Administrator allowed to call setters.
    pub owner: Address,
    /// Supply-policy controller allowed to run epochs; also the reward pool.
    pub policy: Address,
    /// Randomness consumer allowed to deliver callbacks.
    #[serde(default)]
    pub randomness_consumer: Address,
    #[serde(default)]
    pub pool_enabled: bool,
    /// Allow a new cycle to stack onto a running one.
    #[serde(default)]
    pub before_period_finish: bool,
    #[serde(default)]
    pub limits: StakeLimits,
    #[serde(default)]
    pub revocation: RevocationPolicy,
    #[serde(default)]
    pub skim: MultiSigSkim,
    pub gate: GateConfig,
}

/// Policy-specific settings, tagged by `variant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum GateConfig {
    Percentage {
        #[serde(with = "amount")]
        reward_percentage: u128,
        duration: u64,
    },
    CurveWeighted(CurveGateConfig),
    RandomThreshold(ThresholdGateConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGateConfig {
    #[serde(default)]
    pub mean: f64,
    #[serde(default = "default_deviation")]
    pub deviation: f64,
    #[serde(default)]
    pub curve_shifter: f64,
    #[serde(default = "default_epochs_per_cycle")]
    pub epochs_per_cycle: u64,
    #[serde(with = "amount")]
    pub initial_reward_share: u128,
    pub block_duration: u64,
    #[serde(default = "default_oracle_period")]
    pub oracle_period: u64,
    #[serde(with = "amount")]
    pub coupon_price_threshold: u128,
    #[serde(default)]
    pub sibling_pools: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdGateConfig {
    #[serde(with = "amount")]
    pub reward_percentage: u128,
    pub block_duration: u64,
    #[serde(default = "default_true")]
    pub count_in_sequence: bool,
    pub mean: u64,
    pub deviation: u64,
    pub table: Vec<u64>,
}

fn default_deviation() -> f64 {
    ebb_curve::gaussian::DEFAULT_DEVIATION
}

fn default_epochs_per_cycle() -> u64 {
    DEFAULT_EPOCHS_PER_CYCLE
}

fn default_oracle_period() -> u64 {
    DEFAULT_ORACLE_PERIOD
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Load from `path`, apply `EBB__*` overrides and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load(path, ENV_PREFIX)
    }

    fn load(path: &Path, env_prefix: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        let cfg: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check field ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner.is_zero() {
            return Err(ConfigError::Invalid { field: "owner", reason: "must be set".into() });
        }
        if self.policy.is_zero() {
            return Err(ConfigError::Invalid { field: "policy", reason: "must be set".into() });
        }
        if self.engine.is_zero() {
            return Err(ConfigError::Invalid { field: "engine", reason: "must be set".into() });
        }
        if self.skim.share > PRECISION {
            return Err(ConfigError::Invalid { field: "skim.share", reason: "exceeds 1e18 (100%)".into() });
        }
        if self.revocation.enabled && self.revocation.duration == 0 {
            return Err(ConfigError::Invalid {
                field: "revocation.duration",
                reason: "must be non-zero when revocation is enabled".into(),
            });
        }
        if matches!(self.gate, GateConfig::RandomThreshold(_)) && self.randomness_consumer.is_zero() {
            return Err(ConfigError::Invalid {
                field: "randomness_consumer",
                reason: "required by the random_threshold gate".into(),
            });
        }
        crate::gate::GatingPolicy::from_config(&self.gate).map(|_| ())
    }
}
