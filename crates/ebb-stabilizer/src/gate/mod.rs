//! Gating policies: how much reward share to inject on each epoch.
//!
//! A deployed engine runs exactly one [`GatingPolicy`], fixed at
//! construction. Policies mutate only their own state; token movement,
//! scheduling and event emission belong to the engine, which acts on the
//! returned [`RewardInstruction`].

pub mod curve;
pub mod percentage;
pub mod threshold;

use serde::{Deserialize, Serialize};

use ebb_core::error::{ConfigError, EngineError, MathError};
use ebb_core::types::{Address, EpochSignal, RebaseDirection, RequestId};

use crate::config::GateConfig;
use crate::skim::MultiSigSkim;

pub use curve::{CurveWeightedGate, RewardCycle};
pub use percentage::PercentageGate;
pub use threshold::{DistributionTable, RandomThresholdGate, Resolution};

/// Engine-side facts a policy needs to decide an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateContext {
    pub block: u64,
    /// Reward-token total supply, read fresh this call.
    pub supply: u128,
    /// Direction of the previous epoch.
    pub last_rebase: RebaseDirection,
    /// Whether the reward stream is still emitting.
    pub stream_running: bool,
    pub before_period_finish: bool,
    pub skim: MultiSigSkim,
    /// Whether the randomness consumer can pay for a request.
    pub randomness_funded: bool,
}

impl GateContext {
    /// A new cycle may start when none is running or stacking is allowed.
    pub fn can_start_cycle(&self) -> bool {
        !self.stream_running || self.before_period_finish
    }
}

/// What to do about randomness after a threshold epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Issue a new request.
    Issue,
    /// Throttled, unfunded or nothing to judge.
    Skip,
    /// A request is already in flight; the second one is refused.
    Rejected(RequestId),
}

/// Action the engine must carry out for an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardInstruction {
    /// No reward this epoch.
    Idle,
    /// Pull `share + skim_share` worth of tokens, pay the skim and stream
    /// `share` over `duration` blocks.
    Commit { share: u128, skim_share: u128, duration: u64, before_period_finish: bool },
    /// Replace the held speculative claim. `previous_share` is what was
    /// held before (claim plus skim); the token difference is settled
    /// with the policy.
    Hold { previous_share: u128, claim_share: u128, skim_share: u128, request: RequestDecision },
    /// A reward cycle was recorded and a coupon window opened.
    OpenCouponCycle { index: u64, share: u128, epochs: u64, sibling_pools: Vec<Address> },
}

/// The reward policy an engine runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "snake_case")]
pub enum GatingPolicy {
    Percentage(PercentageGate),
    CurveWeighted(CurveWeightedGate),
    RandomThreshold(RandomThresholdGate),
}

impl GatingPolicy {
    /// Build initial policy state from configuration.
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        Ok(match config {
            GateConfig::Percentage { reward_percentage, duration } => {
                Self::Percentage(PercentageGate::new(*reward_percentage, *duration)?)
            }
            GateConfig::CurveWeighted(curve) => Self::CurveWeighted(CurveWeightedGate::from_config(curve)?),
            GateConfig::RandomThreshold(threshold) => {
                Self::RandomThreshold(RandomThresholdGate::from_config(threshold)?)
            }
        })
    }

    /// Short name of the variant, as used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Percentage(_) => "percentage",
            Self::CurveWeighted(_) => "curve_weighted",
            Self::RandomThreshold(_) => "random_threshold",
        }
    }

    /// Decide this epoch.
    pub fn evaluate(
        &mut self,
        signal: &EpochSignal,
        ctx: &GateContext,
    ) -> Result<RewardInstruction, MathError> {
        match self {
            Self::Percentage(gate) => gate.evaluate(signal, ctx),
            Self::CurveWeighted(gate) => gate.evaluate(signal, ctx),
            Self::RandomThreshold(gate) => gate.evaluate(signal, ctx),
        }
    }

    /// Share held for a speculative claim that is not yet streaming.
    pub fn held_share(&self) -> u128 {
        match self {
            Self::RandomThreshold(gate) => gate.held_share(),
            _ => 0,
        }
    }

    /// Distribution window for newly committed share.
    pub fn block_duration(&self) -> u64 {
        match self {
            Self::Percentage(gate) => gate.duration,
            Self::CurveWeighted(gate) => gate.block_duration,
            Self::RandomThreshold(gate) => gate.block_duration,
        }
    }

    pub fn set_block_duration(&mut self, duration: u64) -> Result<(), ConfigError> {
        if duration == 0 {
            return Err(ConfigError::Invalid { field: "block_duration", reason: "must be non-zero".into() });
        }
        match self {
            Self::Percentage(gate) => gate.duration = duration,
            Self::CurveWeighted(gate) => gate.block_duration = duration,
            Self::RandomThreshold(gate) => gate.block_duration = duration,
        }
        Ok(())
    }

    /// Set the fixed reward percentage of a percentage or threshold policy.
    pub fn set_reward_percentage(&mut self, percentage: u128) -> Result<(), EngineError> {
        percentage::check_percentage("reward_percentage", percentage)?;
        match self {
            Self::Percentage(gate) => gate.reward_percentage = percentage,
            Self::RandomThreshold(gate) => gate.reward_percentage = percentage,
            Self::CurveWeighted(_) => {
                return Err(EngineError::GateMismatch { expected: "percentage or random_threshold" });
            }
        }
        Ok(())
    }

    pub fn as_threshold(&self) -> Option<&RandomThresholdGate> {
        match self {
            Self::RandomThreshold(gate) => Some(gate),
            _ => None,
        }
    }

    pub fn as_threshold_mut(&mut self) -> Result<&mut RandomThresholdGate, EngineError> {
        match self {
            Self::RandomThreshold(gate) => Ok(gate),
            _ => Err(EngineError::GateMismatch { expected: "random_threshold" }),
        }
    }

    pub fn as_curve(&self) -> Option<&CurveWeightedGate> {
        match self {
            Self::CurveWeighted(gate) => Some(gate),
            _ => None,
        }
    }

    pub fn as_curve_mut(&mut self) -> Result<&mut CurveWeightedGate, EngineError> {
        match self {
            Self::CurveWeighted(gate) => Ok(gate),
            _ => Err(EngineError::GateMismatch { expected: "curve_weighted" }),
        }
    }
}
