//! Fixed-percentage policy: every positive epoch streams a fixed slice of
//! the policy's pool balance.

use serde::{Deserialize, Serialize};

use ebb_core::constants::PRECISION;
use ebb_core::error::{ConfigError, MathError};
use ebb_core::math::{mul_fixed, share_of};
use ebb_core::types::{EpochSignal, RebaseDirection};

use super::{GateContext, RewardInstruction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct PercentageGate {
    /// Fraction of the pool balance released per positive epoch.
    pub reward_percentage: u128,
    /// Vesting window in blocks.
    pub duration: u64,
}

/// Reject percentages above 100%.
pub(crate) fn check_percentage(field: &'static str, value: u128) -> Result<(), ConfigError> {
    if value > PRECISION {
        return Err(ConfigError::Invalid { field, reason: format!("{value} exceeds 1e18 (100%)") });
    }
    Ok(())
}

impl PercentageGate {
    pub fn new(reward_percentage: u128, duration: u64) -> Result<Self, ConfigError> {
        check_percentage("reward_percentage", reward_percentage)?;
        if duration == 0 {
            return Err(ConfigError::Invalid { field: "duration", reason: "must be non-zero".into() });
        }
        Ok(Self { reward_percentage, duration })
    }

    pub fn evaluate(&self, signal: &EpochSignal, ctx: &GateContext) -> Result<RewardInstruction, MathError> {
        if signal.direction() != RebaseDirection::Positive || !ctx.can_start_cycle() || ctx.supply == 0 {
            return Ok(RewardInstruction::Idle);
        }
        let reward = mul_fixed(signal.pool_balance, self.reward_percentage)?;
        if reward == 0 {
            return Ok(RewardInstruction::Idle);
        }
        let share = share_of(reward, ctx.supply)?;
        Ok(RewardInstruction::Commit {
            share,
            skim_share: ctx.skim.skim_of(share)?,
            duration: self.duration,
            before_period_finish: ctx.before_period_finish,
        })
    }
}
