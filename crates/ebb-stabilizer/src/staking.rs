//! Per-staker accounting against a [`RewardStream`].
//!
//! Every mutation settles the stream and the affected account first, so
//! `pending_reward` always holds the share earned up to the current block.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ebb_core::constants::PRECISION;
use ebb_core::error::{EngineError, MathError, StakeError};
use ebb_core::math::mul_div;
use ebb_core::types::{amount, Address};

use crate::scheduler::RewardStream;

/// Optional per-user and pool-wide LP caps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode,
    bincode::Decode,
)]
pub struct StakeLimits {
    #[serde(default)]
    pub user_limit_enabled: bool,
    #[serde(default, with = "amount")]
    pub user_limit: u128,
    #[serde(default)]
    pub pool_limit_enabled: bool,
    #[serde(default, with = "amount")]
    pub pool_limit: u128,
}

impl StakeLimits {
    /// Check that adding `amount` keeps both the user and the pool at or under their caps.
    pub fn check(&self, staked: u128, total: u128, amount: u128) -> Result<(), StakeError> {
        if self.user_limit_enabled && staked.saturating_add(amount) > self.user_limit {
            return Err(StakeError::UserLimitExceeded { staked, amount, limit: self.user_limit });
        }
        if self.pool_limit_enabled && total.saturating_add(amount) > self.pool_limit {
            return Err(StakeError::PoolLimitExceeded { total, amount, limit: self.pool_limit });
        }
        Ok(())
    }
}

/// One staker's position.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode,
    bincode::Decode,
)]
pub struct Account {
    pub stake: u128,
    pub reward_per_share_paid: u128,
    /// Settled but unclaimed reward, in share units.
    pub pending_reward: u128,
}

impl Account {
    /// Reward share owed at `reward_per_share`.
    pub fn earned(&self, reward_per_share: u128) -> Result<u128, MathError> {
        let delta = reward_per_share.saturating_sub(self.reward_per_share_paid);
        mul_div(self.stake, delta, PRECISION)?
            .checked_add(self.pending_reward)
            .ok_or(MathError::ArithmeticOverflow)
    }
}

/// LP stakes and their reward bookkeeping.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct StakerLedger {
    total_staked: u128,
    accounts: BTreeMap<Address, Account>,
    pub limits: StakeLimits,
}

impl StakerLedger {
    pub fn new(limits: StakeLimits) -> Self {
        Self { limits, ..Self::default() }
    }

    pub fn total_staked(&self) -> u128 {
        self.total_staked
    }

    pub fn account(&self, user: &Address) -> Account {
        self.accounts.get(user).copied().unwrap_or_default()
    }

    pub fn stake_of(&self, user: &Address) -> u128 {
        self.account(user).stake
    }

    /// Iterate over every known account.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Settle the stream and, if given, `user`'s pending reward at `now`.
    pub fn settle(
        &mut self,
        stream: &mut RewardStream,
        now: u64,
        user: Option<&Address>,
    ) -> Result<(), MathError> {
        stream.update(now, self.total_staked)?;
        if let Some(user) = user {
            let rps = stream.reward_per_share_stored;
            let account = self.accounts.entry(*user).or_default();
            account.pending_reward = account.earned(rps)?;
            account.reward_per_share_paid = rps;
        }
        Ok(())
    }

    /// Reward share `user` could claim at `now`, without settling.
    pub fn earned(&self, stream: &RewardStream, now: u64, user: &Address) -> Result<u128, MathError> {
        let rps = stream.reward_per_share(now, self.total_staked)?;
        self.account(user).earned(rps)
    }

    /// Add `amount` to `user`'s stake after checking caps.
    pub fn stake(
        &mut self,
        stream: &mut RewardStream,
        now: u64,
        user: &Address,
        amount: u128,
    ) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(StakeError::ZeroAmount.into());
        }
        self.limits.check(self.stake_of(user), self.total_staked, amount)?;
        self.settle(stream, now, Some(user))?;

        let total = self.total_staked.checked_add(amount).ok_or(MathError::ArithmeticOverflow)?;
        let account = self.accounts.entry(*user).or_default();
        account.stake = account.stake.checked_add(amount).ok_or(MathError::ArithmeticOverflow)?;
        self.total_staked = total;
        Ok(())
    }

    /// Remove `amount` from `user`'s stake.
    pub fn withdraw(
        &mut self,
        stream: &mut RewardStream,
        now: u64,
        user: &Address,
        amount: u128,
    ) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(StakeError::ZeroAmount.into());
        }
        let staked = self.stake_of(user);
        if amount > staked {
            return Err(StakeError::WithdrawExceedsStake { staked, requested: amount }.into());
        }
        self.settle(stream, now, Some(user))?;

        let account = self.accounts.entry(*user).or_default();
        account.stake -= amount;
        self.total_staked -= amount;
        Ok(())
    }

    /// Settle `user` and zero their pending reward, returning the share taken.
    pub fn take_reward(
        &mut self,
        stream: &mut RewardStream,
        now: u64,
        user: &Address,
    ) -> Result<u128, MathError> {
        self.settle(stream, now, Some(user))?;
        let account = self.accounts.entry(*user).or_default();
        Ok(std::mem::take(&mut account.pending_reward))
    }

    /// Credit `share` back to `user`'s pending reward after a capped payout.
    pub fn restore_reward(&mut self, user: &Address, share: u128) -> Result<(), MathError> {
        let account = self.accounts.entry(*user).or_default();
        account.pending_reward = account
            .pending_reward
            .checked_add(share)
            .ok_or(MathError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Sum of all account stakes. Equals [`total_staked`](Self::total_staked) between calls.
    pub fn sum_of_stakes(&self) -> u128 {
        self.accounts.values().map(|a| a.stake).sum()
    }
}
