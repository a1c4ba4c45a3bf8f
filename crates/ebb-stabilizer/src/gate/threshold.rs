//! Randomized-threshold policy.
//!
//! Each positive epoch bumps `count` and replaces a speculative claim held
//! by the engine. A verifiable random value later picks a target from a
//! 100-entry distribution table: `count >= target` confirms the claim into
//! the reward stream, anything else refunds it.
//!
//! ```text
//! Idle --positive epoch, request issued--> AwaitingRandomness
//! AwaitingRandomness --fulfill--> Resolved (Confirm | Revoke) --> Idle
//! ```
//!
//! Judgment reads `count` and the pending claim at callback time, since
//! any number of epochs and staker calls may land between request and
//! answer. While a request is in flight, further requests are refused.

use serde::{Deserialize, Serialize};

use ebb_core::constants::DISTRIBUTION_TABLE_LEN;
use ebb_core::error::{ConfigError, EngineError, MathError};
use ebb_core::math::{mul_fixed, share_of};
use ebb_core::types::{Address, EpochSignal, RebaseDirection, RequestId};

use super::percentage::check_percentage;
use super::{GateContext, RequestDecision, RewardInstruction};
use crate::config::ThresholdGateConfig;

/// Percentile table of claim thresholds, with the parameters it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct DistributionTable {
    pub mean: u64,
    pub deviation: u64,
    entries: Vec<u64>,
}

impl DistributionTable {
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] unless `entries` has exactly
    /// [`DISTRIBUTION_TABLE_LEN`] values.
    pub fn new(mean: u64, deviation: u64, entries: Vec<u64>) -> Result<Self, ConfigError> {
        if entries.len() != DISTRIBUTION_TABLE_LEN {
            return Err(ConfigError::Invalid {
                field: "distribution.table",
                reason: format!("expected {DISTRIBUTION_TABLE_LEN} entries, got {}", entries.len()),
            });
        }
        Ok(Self { mean, deviation, entries })
    }

    /// Table where every entry is `value`.
    pub fn constant(value: u64) -> Self {
        Self { mean: value, deviation: 0, entries: vec![value; DISTRIBUTION_TABLE_LEN] }
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    /// Threshold selected by a random value.
    ///
    /// A table with the wrong length (only reachable through a hand-built
    /// state) yields `u64::MAX`, which never confirms.
    pub fn target(&self, random_value: u128) -> u64 {
        let index = (random_value % DISTRIBUTION_TABLE_LEN as u128) as usize;
        if self.entries.len() != DISTRIBUTION_TABLE_LEN {
            return u64::MAX;
        }
        self.entries.get(index).copied().unwrap_or(u64::MAX)
    }
}

/// Outcome of a randomness callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Stream `claim_share` and pay `skim_share` to `skim_to`, the multisig
    /// recorded when the claim was held.
    Confirm { claim_share: u128, skim_share: u128, skim_to: Address, count: u64, target: u64 },
    /// Refund the held claim and skim to the policy.
    Revoke { claim_share: u128, skim_share: u128, count: u64, target: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct RandomThresholdGate {
    pub reward_percentage: u128,
    /// Request throttle and distribution window, in blocks.
    pub block_duration: u64,
    /// Positive epochs since the last resolution (or reset).
    pub count: u64,
    /// Reset `count` on every non-positive epoch.
    pub count_in_sequence: bool,
    pub distribution: DistributionTable,
    pub last_request_block: Option<u64>,
    pub in_flight: Option<RequestId>,
    pub pending_claim_share: u128,
    pub pending_skim_share: u128,
    /// Multisig the pending skim was reserved for.
    pub pending_skim_to: Address,
}

impl RandomThresholdGate {
    pub fn from_config(config: &ThresholdGateConfig) -> Result<Self, ConfigError> {
        check_percentage("reward_percentage", config.reward_percentage)?;
        if config.block_duration == 0 {
            return Err(ConfigError::Invalid { field: "block_duration", reason: "must be non-zero".into() });
        }
        Ok(Self {
            reward_percentage: config.reward_percentage,
            block_duration: config.block_duration,
            count: 0,
            count_in_sequence: config.count_in_sequence,
            distribution: DistributionTable::new(config.mean, config.deviation, config.table.clone())?,
            last_request_block: None,
            in_flight: None,
            pending_claim_share: 0,
            pending_skim_share: 0,
            pending_skim_to: Address::ZERO,
        })
    }

    /// Claim plus skim currently held by the engine.
    pub fn held_share(&self) -> u128 {
        self.pending_claim_share.saturating_add(self.pending_skim_share)
    }

    /// Whether `block_duration` has passed since the last request.
    pub fn throttle_elapsed(&self, now: u64) -> bool {
        self.last_request_block
            .is_none_or(|last| now.saturating_sub(last) >= self.block_duration)
    }

    pub fn evaluate(&mut self, signal: &EpochSignal, ctx: &GateContext) -> Result<RewardInstruction, MathError> {
        if signal.direction() != RebaseDirection::Positive {
            if self.count_in_sequence {
                self.count = 0;
            }
            return Ok(RewardInstruction::Idle);
        }

        self.count = self.count.saturating_add(1);
        if !ctx.can_start_cycle() || ctx.supply == 0 {
            return Ok(RewardInstruction::Idle);
        }

        let claim_share = share_of(mul_fixed(signal.pool_balance, self.reward_percentage)?, ctx.supply)?;
        let skim_share = ctx.skim.skim_of(claim_share)?;
        let previous_share = self.held_share();
        self.pending_claim_share = claim_share;
        self.pending_skim_share = skim_share;
        self.pending_skim_to = ctx.skim.address;

        let request = match self.in_flight {
            Some(id) => RequestDecision::Rejected(id),
            None if claim_share == 0 => RequestDecision::Skip,
            None if !self.throttle_elapsed(ctx.block) => RequestDecision::Skip,
            None if !ctx.randomness_funded => RequestDecision::Skip,
            None => RequestDecision::Issue,
        };

        Ok(RewardInstruction::Hold { previous_share, claim_share, skim_share, request })
    }

    /// Mark `request_id` as in flight.
    pub fn record_request(&mut self, request_id: RequestId, block: u64) {
        self.in_flight = Some(request_id);
        self.last_request_block = Some(block);
    }

    /// Judge the in-flight request against live state and reset for the next round.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NoRequestInFlight`] if nothing is pending
    /// - [`EngineError::StaleRequest`] if `request_id` is not the in-flight one
    pub fn resolve(&mut self, request_id: RequestId, random_value: u128) -> Result<Resolution, EngineError> {
        let expected = self.in_flight.ok_or(EngineError::NoRequestInFlight)?;
        if expected != request_id {
            return Err(EngineError::StaleRequest { got: request_id, expected });
        }

        let target = self.distribution.target(random_value);
        let count = std::mem::take(&mut self.count);
        let claim_share = std::mem::take(&mut self.pending_claim_share);
        let skim_share = std::mem::take(&mut self.pending_skim_share);
        let skim_to = std::mem::take(&mut self.pending_skim_to);
        self.in_flight = None;

        Ok(if count >= target {
            Resolution::Confirm { claim_share, skim_share, skim_to, count, target }
        } else {
            Resolution::Revoke { claim_share, skim_share, count, target }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skim::MultiSigSkim;
    use ebb_core::constants::{PRECISION, TOKEN};
    use ebb_core::types::Address;

    fn gate(table: DistributionTable) -> RandomThresholdGate {
        RandomThresholdGate {
            reward_percentage: PRECISION / 10,
            block_duration: 5,
            count: 0,
            count_in_sequence: true,
            distribution: table,
            last_request_block: None,
            in_flight: None,
            pending_claim_share: 0,
            pending_skim_share: 0,
            pending_skim_to: Address::ZERO,
        }
    }

    fn ctx(block: u64) -> GateContext {
        GateContext {
            block,
            supply: 1_000_000 * TOKEN,
            last_rebase: RebaseDirection::Neutral,
            stream_running: false,
            before_period_finish: false,
            skim: MultiSigSkim { address: Address::repeat_byte(4), share: PRECISION / 10 },
            randomness_funded: true,
        }
    }

    fn up() -> EpochSignal {
        EpochSignal::new(1, 100 * TOKEN)
    }

    fn id(n: u8) -> RequestId {
        RequestId([n; 32])
    }

    #[test]
    fn table_requires_hundred_entries() {
        assert!(DistributionTable::new(5, 2, vec![1; 99]).is_err());
        assert!(DistributionTable::new(5, 2, vec![1; 100]).is_ok());
    }

    #[test]
    fn target_indexes_modulo_hundred() {
        let mut entries = vec![0; 100];
        entries[1] = 2;
        let table = DistributionTable::new(0, 0, entries).unwrap();
        assert_eq!(table.target(2001), 2);
        assert_eq!(table.target(2100), 0);
    }

    #[test]
    fn positive_epoch_counts_and_requests() {
        let mut g = gate(DistributionTable::constant(3));
        let ix = g.evaluate(&up(), &ctx(10)).unwrap();
        assert_eq!(g.count, 1);
        assert_eq!(
            ix,
            RewardInstruction::Hold {
                previous_share: 0,
                claim_share: 10u128.pow(13),
                skim_share: 10u128.pow(12),
                request: RequestDecision::Issue,
            }
        );
    }

    #[test]
    fn pending_claim_replaces_not_accumulates() {
        let mut g = gate(DistributionTable::constant(3));
        g.evaluate(&up(), &ctx(10)).unwrap();
        g.record_request(id(1), 10);
        let ix = g.evaluate(&up(), &ctx(11)).unwrap();
        assert_eq!(g.pending_claim_share, 10u128.pow(13));
        assert_eq!(g.count, 2);
        match ix {
            RewardInstruction::Hold { previous_share, request, .. } => {
                assert_eq!(previous_share, 11 * 10u128.pow(12));
                assert_eq!(request, RequestDecision::Rejected(id(1)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unfunded_consumer_skips_but_counts() {
        let mut g = gate(DistributionTable::constant(3));
        let ctx = GateContext { randomness_funded: false, ..ctx(10) };
        let ix = g.evaluate(&up(), &ctx).unwrap();
        assert!(matches!(ix, RewardInstruction::Hold { request: RequestDecision::Skip, .. }));
        assert_eq!(g.count, 1);
    }

    #[test]
    fn throttle_blocks_early_requests() {
        let mut g = gate(DistributionTable::constant(3));
        g.last_request_block = Some(10);
        assert!(!g.throttle_elapsed(14));
        assert!(g.throttle_elapsed(15));
        let ix = g.evaluate(&up(), &ctx(12)).unwrap();
        assert!(matches!(ix, RewardInstruction::Hold { request: RequestDecision::Skip, .. }));
    }

    #[test]
    fn non_positive_resets_only_in_sequence() {
        let mut g = gate(DistributionTable::constant(3));
        g.evaluate(&up(), &ctx(10)).unwrap();
        g.evaluate(&EpochSignal::new(0, 0), &ctx(11)).unwrap();
        assert_eq!(g.count, 0);

        g.count_in_sequence = false;
        g.evaluate(&up(), &ctx(12)).unwrap();
        g.evaluate(&EpochSignal::new(-1, 0), &ctx(13)).unwrap();
        assert_eq!(g.count, 1);
    }

    #[test]
    fn running_cycle_counts_without_claim() {
        let mut g = gate(DistributionTable::constant(3));
        let ctx = GateContext { stream_running: true, ..ctx(10) };
        assert_eq!(g.evaluate(&up(), &ctx).unwrap(), RewardInstruction::Idle);
        assert_eq!(g.count, 1);
        assert_eq!(g.held_share(), 0);
    }

    #[test]
    fn resolve_confirms_at_threshold() {
        let mut g = gate(DistributionTable::constant(2));
        g.evaluate(&up(), &ctx(10)).unwrap();
        g.record_request(id(1), 10);
        g.evaluate(&up(), &ctx(11)).unwrap();
        let r = g.resolve(id(1), 77).unwrap();
        assert!(matches!(r, Resolution::Confirm { count: 2, target: 2, .. }));
        assert_eq!(g.count, 0);
        assert_eq!(g.in_flight, None);
        assert_eq!(g.held_share(), 0);
    }

    #[test]
    fn confirm_pays_skim_to_multisig_recorded_at_hold() {
        let mut g = gate(DistributionTable::constant(1));
        g.evaluate(&up(), &ctx(10)).unwrap();
        g.record_request(id(1), 10);
        assert_eq!(g.pending_skim_to, Address::repeat_byte(4));
        match g.resolve(id(1), 0).unwrap() {
            Resolution::Confirm { skim_to, .. } => assert_eq!(skim_to, Address::repeat_byte(4)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(g.pending_skim_to, Address::ZERO);
    }

    #[test]
    fn resolve_revokes_below_threshold() {
        let mut g = gate(DistributionTable::constant(2));
        g.evaluate(&up(), &ctx(10)).unwrap();
        g.record_request(id(1), 10);
        let r = g.resolve(id(1), 5).unwrap();
        assert_eq!(
            r,
            Resolution::Revoke { claim_share: 10u128.pow(13), skim_share: 10u128.pow(12), count: 1, target: 2 }
        );
    }

    #[test]
    fn resolve_requires_matching_request() {
        let mut g = gate(DistributionTable::constant(0));
        assert_eq!(g.resolve(id(1), 0), Err(EngineError::NoRequestInFlight));
        g.record_request(id(1), 0);
        assert_eq!(g.resolve(id(2), 0), Err(EngineError::StaleRequest { got: id(2), expected: id(1) }));
        assert_eq!(g.in_flight, Some(id(1)));
    }

    #[test]
    fn short_table_never_confirms() {
        let table = DistributionTable { mean: 0, deviation: 0, entries: vec![0; 3] };
        assert_eq!(table.target(1), u64::MAX);
    }
}
