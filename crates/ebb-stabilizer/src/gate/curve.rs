//! Curve-weighted policy with coupon cycles.
//!
//! Positive epochs compound `rewards_accrued` by the Gaussian weight of the
//! expansion percentage and drip the open reward cycle into the stream.
//! The first negative epoch of a run closes the accrued multiplier into a
//! new [`RewardCycle`] and opens a coupon window: while the last rebase is
//! negative and the oracle price sits below `coupon_price_threshold`,
//! holders may burn reward tokens for coupon credit against that cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ebb_core::error::{ConfigError, CouponError, MathError};
use ebb_core::math::{mul_fixed, share_of};
use ebb_core::types::{Address, EpochSignal, RebaseDirection};
use ebb_curve::{from_fixed, CurveParams};

use super::percentage::check_percentage;
use super::{GateContext, RewardInstruction};
use crate::config::CurveGateConfig;

/// Reward share set aside by one negative epoch, released over later positive epochs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct RewardCycle {
    pub share: u128,
    pub epochs_target: u64,
    pub epochs_rewarded: u64,
    /// Total reward tokens burned for coupons against this cycle.
    pub coupons_issued: u128,
    pub coupons: BTreeMap<Address, u128>,
}

impl RewardCycle {
    /// Whether positive epochs still draw from this cycle.
    pub fn is_open(&self) -> bool {
        self.epochs_rewarded < self.epochs_target
    }

    /// Coupon credit held by `user`.
    pub fn coupons_of(&self, user: &Address) -> u128 {
        self.coupons.get(user).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct CurveWeightedGate {
    pub curve: CurveParams,
    /// Subtracted from `expansion * 100` before evaluating the curve.
    pub curve_shifter: f64,
    pub epochs_per_cycle: u64,
    /// Baseline multiplier `rewards_accrued` resets to.
    pub initial_reward_share: u128,
    pub rewards_accrued: u128,
    pub reward_cycles: Vec<RewardCycle>,
    pub block_duration: u64,
    pub oracle_period: u64,
    pub last_oracle_update: Option<u64>,
    pub coupon_price_threshold: u128,
    /// Pools that share this pool's coupon cycles. Recorded and reported only.
    pub sibling_pools: Vec<Address>,
}

impl CurveWeightedGate {
    pub fn from_config(config: &CurveGateConfig) -> Result<Self, ConfigError> {
        let curve = CurveParams::from_deviation(config.mean, config.deviation)?;
        if !config.curve_shifter.is_finite() {
            return Err(ConfigError::Invalid { field: "curve_shifter", reason: "must be finite".into() });
        }
        if config.epochs_per_cycle == 0 {
            return Err(ConfigError::Invalid { field: "epochs_per_cycle", reason: "must be non-zero".into() });
        }
        if config.block_duration == 0 {
            return Err(ConfigError::Invalid { field: "block_duration", reason: "must be non-zero".into() });
        }
        check_percentage("initial_reward_share", config.initial_reward_share)?;
        Ok(Self {
            curve,
            curve_shifter: config.curve_shifter,
            epochs_per_cycle: config.epochs_per_cycle,
            initial_reward_share: config.initial_reward_share,
            rewards_accrued: config.initial_reward_share,
            reward_cycles: Vec::new(),
            block_duration: config.block_duration,
            oracle_period: config.oracle_period,
            last_oracle_update: None,
            coupon_price_threshold: config.coupon_price_threshold,
            sibling_pools: config.sibling_pools.clone(),
        })
    }

    /// Curve weight of an expansion fraction (1e18 = 100%), as 18-decimal fixed point.
    pub fn curve_weight(&self, expansion: u128) -> u128 {
        self.curve.value_fixed(from_fixed(expansion) * 100.0 - self.curve_shifter)
    }

    /// The most recent reward cycle, if any.
    pub fn current_cycle(&self) -> Option<&RewardCycle> {
        self.reward_cycles.last()
    }

    /// Whether the price oracle is due for a refresh at `now`.
    pub fn oracle_due(&self, now: u64) -> bool {
        self.last_oracle_update
            .is_none_or(|last| now.saturating_sub(last) >= self.oracle_period)
    }

    pub fn record_oracle_update(&mut self, now: u64) {
        self.last_oracle_update = Some(now);
    }

    pub fn evaluate(&mut self, signal: &EpochSignal, ctx: &GateContext) -> Result<RewardInstruction, MathError> {
        if ctx.supply == 0 {
            return Ok(RewardInstruction::Idle);
        }
        match signal.direction() {
            RebaseDirection::Positive => self.on_expansion(signal, ctx),
            RebaseDirection::Negative if ctx.last_rebase != RebaseDirection::Negative => {
                self.open_cycle(signal, ctx)
            }
            _ => Ok(RewardInstruction::Idle),
        }
    }

    fn on_expansion(&mut self, signal: &EpochSignal, ctx: &GateContext) -> Result<RewardInstruction, MathError> {
        let expansion = share_of(signal.supply_delta.unsigned_abs(), ctx.supply)?;
        let growth = mul_fixed(self.curve_weight(expansion), expansion)?;
        self.rewards_accrued = self
            .rewards_accrued
            .checked_add(mul_fixed(self.rewards_accrued, growth)?)
            .ok_or(MathError::ArithmeticOverflow)?;

        let Some(cycle) = self.reward_cycles.last_mut().filter(|c| c.is_open()) else {
            return Ok(RewardInstruction::Idle);
        };
        let share = cycle.share / cycle.epochs_target as u128;
        cycle.epochs_rewarded += 1;

        Ok(RewardInstruction::Commit {
            share,
            skim_share: ctx.skim.skim_of(share)?,
            duration: self.block_duration,
            before_period_finish: true,
        })
    }

    fn open_cycle(&mut self, signal: &EpochSignal, ctx: &GateContext) -> Result<RewardInstruction, MathError> {
        let reward = mul_fixed(signal.pool_balance, self.rewards_accrued)?;
        let share = share_of(reward, ctx.supply)?;
        self.reward_cycles.push(RewardCycle {
            share,
            epochs_target: self.epochs_per_cycle,
            ..RewardCycle::default()
        });
        self.rewards_accrued = self.initial_reward_share;

        Ok(RewardInstruction::OpenCouponCycle {
            index: (self.reward_cycles.len() - 1) as u64,
            share,
            epochs: self.epochs_per_cycle,
            sibling_pools: self.sibling_pools.clone(),
        })
    }

    /// Record `amount` of coupons for `user` against the current cycle.
    ///
    /// The caller burns the tokens; this only checks the window and books
    /// the credit. Returns the cycle index.
    pub fn buy_coupons(
        &mut self,
        user: &Address,
        amount: u128,
        price: u128,
        last_rebase: RebaseDirection,
    ) -> Result<u64, CouponError> {
        if last_rebase != RebaseDirection::Negative {
            return Err(CouponError::WindowClosed);
        }
        if amount == 0 {
            return Err(CouponError::ZeroAmount);
        }
        if price >= self.coupon_price_threshold {
            return Err(CouponError::PriceAboveThreshold { price, threshold: self.coupon_price_threshold });
        }
        let index = self.reward_cycles.len().checked_sub(1).ok_or(CouponError::NoCycle)?;
        let cycle = &mut self.reward_cycles[index];
        cycle.coupons_issued = cycle.coupons_issued.saturating_add(amount);
        let credit = cycle.coupons.entry(*user).or_default();
        *credit = credit.saturating_add(amount);
        Ok(index as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skim::MultiSigSkim;
    use ebb_core::constants::{PRECISION, TOKEN};

    const SUPPLY: u128 = 1_000_000 * TOKEN;

    fn config() -> CurveGateConfig {
        CurveGateConfig {
            mean: 0.0,
            deviation: 1.0,
            curve_shifter: 0.0,
            epochs_per_cycle: 5,
            initial_reward_share: PRECISION / 20,
            block_duration: 10,
            oracle_period: 1_000,
            coupon_price_threshold: 95 * PRECISION / 100,
            sibling_pools: vec![Address::repeat_byte(0xB1)],
        }
    }

    fn ctx(last_rebase: RebaseDirection) -> GateContext {
        GateContext {
            block: 100,
            supply: SUPPLY,
            last_rebase,
            stream_running: false,
            before_period_finish: false,
            skim: MultiSigSkim::default(),
            randomness_funded: false,
        }
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(CurveWeightedGate::from_config(&CurveGateConfig { deviation: 0.0, ..config() }).is_err());
        assert!(CurveWeightedGate::from_config(&CurveGateConfig { epochs_per_cycle: 0, ..config() }).is_err());
        assert!(CurveWeightedGate::from_config(&CurveGateConfig { curve_shifter: f64::NAN, ..config() }).is_err());
    }

    #[test]
    fn expansion_compounds_accrued() {
        let mut g = CurveWeightedGate::from_config(&config()).unwrap();
        let base = g.rewards_accrued;
        // 1% expansion: offset 1.0 on a standard normal.
        let ix = g.evaluate(&EpochSignal::new((SUPPLY / 100) as i128, 0), &ctx(RebaseDirection::Neutral)).unwrap();
        assert_eq!(ix, RewardInstruction::Idle);
        assert!(g.rewards_accrued > base);
        let after_one = g.rewards_accrued;
        g.evaluate(&EpochSignal::new((SUPPLY / 100) as i128, 0), &ctx(RebaseDirection::Positive)).unwrap();
        assert!(g.rewards_accrued - after_one > after_one - base);
    }

    #[test]
    fn curve_weight_peaks_at_shifted_mean() {
        let g = CurveWeightedGate::from_config(&CurveGateConfig { curve_shifter: 2.0, ..config() }).unwrap();
        let at_peak = g.curve_weight(PRECISION / 50);
        assert!(at_peak > g.curve_weight(PRECISION / 100));
        assert!(at_peak > g.curve_weight(3 * PRECISION / 100));
    }

    #[test]
    fn first_negative_opens_cycle() {
        let mut g = CurveWeightedGate::from_config(&config()).unwrap();
        let ix = g.evaluate(&EpochSignal::new(-1, 1_000 * TOKEN), &ctx(RebaseDirection::Positive)).unwrap();
        // 5% of 1000 tokens at 1M supply.
        let share = share_of(50 * TOKEN, SUPPLY).unwrap();
        assert_eq!(
            ix,
            RewardInstruction::OpenCouponCycle {
                index: 0,
                share,
                epochs: 5,
                sibling_pools: vec![Address::repeat_byte(0xB1)],
            }
        );
        assert_eq!(g.rewards_accrued, g.initial_reward_share);
    }

    #[test]
    fn consecutive_negatives_open_one_cycle() {
        let mut g = CurveWeightedGate::from_config(&config()).unwrap();
        g.evaluate(&EpochSignal::new(-1, 1_000 * TOKEN), &ctx(RebaseDirection::Neutral)).unwrap();
        let ix = g.evaluate(&EpochSignal::new(-1, 1_000 * TOKEN), &ctx(RebaseDirection::Negative)).unwrap();
        assert_eq!(ix, RewardInstruction::Idle);
        assert_eq!(g.reward_cycles.len(), 1);
    }

    #[test]
    fn open_cycle_drips_over_target_epochs() {
        let mut g = CurveWeightedGate::from_config(&config()).unwrap();
        g.evaluate(&EpochSignal::new(-1, 1_000 * TOKEN), &ctx(RebaseDirection::Neutral)).unwrap();
        let cycle_share = g.current_cycle().unwrap().share;
        for _ in 0..5 {
            let ix = g.evaluate(&EpochSignal::new(1, 0), &ctx(RebaseDirection::Positive)).unwrap();
            assert_eq!(
                ix,
                RewardInstruction::Commit { share: cycle_share / 5, skim_share: 0, duration: 10, before_period_finish: true }
            );
        }
        assert!(!g.current_cycle().unwrap().is_open());
        let ix = g.evaluate(&EpochSignal::new(1, 0), &ctx(RebaseDirection::Positive)).unwrap();
        assert_eq!(ix, RewardInstruction::Idle);
    }

    #[test]
    fn coupons_need_negative_window_and_low_price() {
        let mut g = CurveWeightedGate::from_config(&config()).unwrap();
        let user = Address::repeat_byte(1);
        let low = 90 * PRECISION / 100;
        assert_eq!(g.buy_coupons(&user, TOKEN, low, RebaseDirection::Positive), Err(CouponError::WindowClosed));
        assert_eq!(g.buy_coupons(&user, TOKEN, low, RebaseDirection::Negative), Err(CouponError::NoCycle));

        g.evaluate(&EpochSignal::new(-1, 1_000 * TOKEN), &ctx(RebaseDirection::Neutral)).unwrap();
        assert!(matches!(
            g.buy_coupons(&user, TOKEN, PRECISION, RebaseDirection::Negative),
            Err(CouponError::PriceAboveThreshold { .. })
        ));
        assert_eq!(g.buy_coupons(&user, 0, low, RebaseDirection::Negative), Err(CouponError::ZeroAmount));
        assert_eq!(g.buy_coupons(&user, TOKEN, low, RebaseDirection::Negative), Ok(0));
        g.buy_coupons(&user, TOKEN, low, RebaseDirection::Negative).unwrap();
        let cycle = g.current_cycle().unwrap();
        assert_eq!(cycle.coupons_of(&user), 2 * TOKEN);
        assert_eq!(cycle.coupons_issued, 2 * TOKEN);
    }

    #[test]
    fn price_at_threshold_is_rejected() {
        let mut g = CurveWeightedGate::from_config(&config()).unwrap();
        g.evaluate(&EpochSignal::new(-1, TOKEN), &ctx(RebaseDirection::Neutral)).unwrap();
        let at = g.coupon_price_threshold;
        assert!(g.buy_coupons(&Address::ZERO, 1, at, RebaseDirection::Negative).is_err());
    }

    #[test]
    fn oracle_due_respects_period() {
        let mut g = CurveWeightedGate::from_config(&config()).unwrap();
        assert!(g.oracle_due(0));
        g.record_oracle_update(100);
        assert!(!g.oracle_due(1_099));
        assert!(g.oracle_due(1_100));
    }
}
