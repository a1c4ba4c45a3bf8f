//! Linear per-block vesting of a committed reward share.
//!
//! A [`RewardStream`] releases `reward_rate` share per block until
//! `period_finish`. Stakers accrue against `reward_per_share_stored`, which
//! is scaled by [`PRECISION`] so that
//! `earned = stake * (reward_per_share - paid) / PRECISION` yields share
//! units directly.
//!
//! Rates are in share per block, never in tokens, so a rebase changes what
//! a block's emission is worth without touching the stream.

use serde::{Deserialize, Serialize};

use ebb_core::constants::PRECISION;
use ebb_core::error::{MathError, SchedulerError};
use ebb_core::math::mul_div;

/// Vesting state shared by every gating policy.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct RewardStream {
    /// Share released per block.
    pub reward_rate: u128,
    /// Accumulated share per staked unit, scaled by `PRECISION`.
    pub reward_per_share_stored: u128,
    /// Block at which `reward_per_share_stored` was last settled.
    pub last_update_block: u64,
    /// Block at which the current cycle stops emitting.
    pub period_finish: u64,
    /// Share committed to the current cycle and not yet revoked.
    pub reward_share_committed: u128,
}

/// Parameters of a freshly started or extended cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStart {
    /// Total share scheduled, including any folded-in remainder.
    pub share: u128,
    pub reward_rate: u128,
    pub period_finish: u64,
    pub duration: u64,
}

impl RewardStream {
    /// Last block that still emits, as seen from `now`.
    pub fn last_block_applicable(&self, now: u64) -> u64 {
        now.min(self.period_finish)
    }

    /// Whether a cycle is still emitting at `now`.
    pub fn is_running(&self, now: u64) -> bool {
        now < self.period_finish
    }

    /// Accumulated reward per staked unit at `now`, without settling.
    ///
    /// Unchanged when nothing is staked: emission for those blocks is not
    /// attributed to anyone.
    pub fn reward_per_share(&self, now: u64, total_staked: u128) -> Result<u128, MathError> {
        if total_staked == 0 {
            return Ok(self.reward_per_share_stored);
        }
        let elapsed = self.last_block_applicable(now).saturating_sub(self.last_update_block);
        let emitted = (elapsed as u128)
            .checked_mul(self.reward_rate)
            .ok_or(MathError::ArithmeticOverflow)?;
        let delta = mul_div(emitted, PRECISION, total_staked)?;
        self.reward_per_share_stored
            .checked_add(delta)
            .ok_or(MathError::ArithmeticOverflow)
    }

    /// Settle `reward_per_share_stored` up to `now`.
    pub fn update(&mut self, now: u64, total_staked: u128) -> Result<(), MathError> {
        self.reward_per_share_stored = self.reward_per_share(now, total_staked)?;
        self.last_update_block = self.last_block_applicable(now);
        Ok(())
    }

    /// Share still scheduled to vest after `now`.
    pub fn remaining_share(&self, now: u64) -> Result<u128, MathError> {
        let blocks = self.period_finish.saturating_sub(now) as u128;
        blocks.checked_mul(self.reward_rate).ok_or(MathError::ArithmeticOverflow)
    }

    /// Commit `new_share` to vest over `duration` blocks starting at `now`.
    ///
    /// Any unvested remainder of a running cycle is folded into the new one.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::CycleRunning`] when a cycle is running and
    ///   `before_period_finish` is false
    /// - [`SchedulerError::ZeroDuration`] when `duration == 0`
    pub fn start_or_extend(
        &mut self,
        now: u64,
        new_share: u128,
        duration: u64,
        before_period_finish: bool,
        total_staked: u128,
    ) -> Result<CycleStart, SchedulerError> {
        if duration == 0 {
            return Err(SchedulerError::ZeroDuration);
        }
        if !before_period_finish && self.is_running(now) {
            return Err(SchedulerError::CycleRunning { period_finish: self.period_finish });
        }

        self.update(now, total_staked)?;

        let remainder = self.remaining_share(now)?;
        let share = new_share.checked_add(remainder).ok_or(MathError::ArithmeticOverflow)?;
        let period_finish = now.checked_add(duration).ok_or(MathError::ArithmeticOverflow)?;

        self.reward_rate = share / duration as u128;
        self.period_finish = period_finish;
        self.last_update_block = now;
        self.reward_share_committed = share;

        Ok(CycleStart {
            share,
            reward_rate: self.reward_rate,
            period_finish,
            duration,
        })
    }

    /// Pull `duration` blocks off the end of the running cycle.
    ///
    /// Returns the revoked share, or `None` (leaving the stream untouched)
    /// when `duration` is zero or longer than the window left at `now`.
    pub fn revoke(
        &mut self,
        now: u64,
        duration: u64,
        total_staked: u128,
    ) -> Result<Option<u128>, MathError> {
        let remaining = self.period_finish.saturating_sub(now);
        if duration == 0 || duration > remaining {
            return Ok(None);
        }

        self.update(now, total_staked)?;

        let share = (duration as u128)
            .checked_mul(self.reward_rate)
            .ok_or(MathError::ArithmeticOverflow)?;
        self.period_finish -= duration;
        self.reward_share_committed = self.reward_share_committed.saturating_sub(share);
        Ok(Some(share))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebb_core::constants::TOKEN;
    use proptest::prelude::*;

    fn running(rate: u128, now: u64, finish: u64) -> RewardStream {
        RewardStream {
            reward_rate: rate,
            last_update_block: now,
            period_finish: finish,
            reward_share_committed: rate * (finish - now) as u128,
            ..RewardStream::default()
        }
    }

    #[test]
    fn fresh_cycle_sets_rate_and_finish() {
        let mut s = RewardStream::default();
        let c = s.start_or_extend(100, 500, 5, false, 0).unwrap();
        assert_eq!(c, CycleStart { share: 500, reward_rate: 100, period_finish: 105, duration: 5 });
        assert_eq!(s.last_update_block, 100);
        assert_eq!(s.reward_share_committed, 500);
    }

    #[test]
    fn running_cycle_rejects_new_start() {
        let mut s = running(10, 100, 110);
        let before = s.clone();
        assert_eq!(
            s.start_or_extend(105, 50, 10, false, 0),
            Err(SchedulerError::CycleRunning { period_finish: 110 })
        );
        assert_eq!(s, before);
    }

    #[test]
    fn finished_cycle_accepts_new_start() {
        let mut s = running(10, 100, 110);
        assert!(s.start_or_extend(110, 50, 10, false, 0).is_ok());
    }

    #[test]
    fn extension_folds_remainder() {
        let mut s = running(10, 100, 110);
        // 4 blocks left at 10/block = 40 folded in.
        let c = s.start_or_extend(106, 60, 10, true, 1).unwrap();
        assert_eq!(c.share, 100);
        assert_eq!(s.reward_rate, 10);
        assert_eq!(s.period_finish, 116);
    }

    #[test]
    fn zero_duration_rejected() {
        let mut s = RewardStream::default();
        assert_eq!(s.start_or_extend(1, 1, 0, true, 0), Err(SchedulerError::ZeroDuration));
    }

    #[test]
    fn accrual_stops_at_period_finish() {
        let s = running(TOKEN, 0, 10);
        let at_end = s.reward_per_share(10, TOKEN).unwrap();
        let later = s.reward_per_share(50, TOKEN).unwrap();
        assert_eq!(at_end, 10 * PRECISION);
        assert_eq!(at_end, later);
    }

    #[test]
    fn nothing_staked_strands_emission() {
        let mut s = running(TOKEN, 0, 10);
        s.update(5, 0).unwrap();
        assert_eq!(s.reward_per_share_stored, 0);
        assert_eq!(s.last_update_block, 5);
    }

    #[test]
    fn revoke_shortens_window_exactly() {
        let mut s = running(7, 100, 120);
        let share = s.revoke(110, 4, 1).unwrap();
        assert_eq!(share, Some(28));
        assert_eq!(s.period_finish, 116);
        assert_eq!(s.reward_share_committed, 140 - 28);
    }

    #[test]
    fn revoke_whole_remaining_window() {
        let mut s = running(7, 100, 120);
        assert_eq!(s.revoke(110, 10, 1).unwrap(), Some(70));
        assert_eq!(s.period_finish, 110);
    }

    #[test]
    fn revoke_longer_than_window_is_noop() {
        let mut s = running(7, 100, 120);
        let before = s.clone();
        assert_eq!(s.revoke(110, 11, 1).unwrap(), None);
        assert_eq!(s, before);
    }

    #[test]
    fn revoke_without_cycle_is_noop() {
        let mut s = RewardStream::default();
        assert_eq!(s.revoke(5, 1, 0).unwrap(), None);
    }

    // --- proptest ---

    proptest! {
        #[test]
        fn stacked_start_always_ends_duration_after_now(
            rate in 0u128..1_000_000,
            start in 0u64..1_000,
            len in 1u64..1_000,
            now_off in 0u64..2_000,
            share in 0u128..1_000_000_000,
            duration in 1u64..1_000,
        ) {
            let mut s = running(rate, start, start + len);
            let now = start + now_off;
            s.start_or_extend(now, share, duration, true, 1).unwrap();
            prop_assert_eq!(s.period_finish, now + duration);
            prop_assert_eq!(s.last_update_block, now);
        }

        #[test]
        fn revoke_reduces_by_exactly_d_times_rate(
            rate in 1u128..1_000_000,
            remaining in 1u64..500,
            d in 1u64..600,
        ) {
            let mut s = running(rate, 0, remaining);
            let committed = s.reward_share_committed;
            match s.revoke(0, d, 1).unwrap() {
                Some(share) => {
                    prop_assert!(d <= remaining);
                    prop_assert_eq!(share, d as u128 * rate);
                    prop_assert_eq!(s.period_finish, remaining - d);
                    prop_assert_eq!(s.reward_share_committed, committed - share);
                }
                None => prop_assert!(d > remaining),
            }
        }
    }
}
