//! Observable engine events.
//!
//! Engines append events to an in-memory log as operations succeed; a
//! reverted operation drops everything it appended. Amounts are base
//! units, shares are 18-decimal fractions of supply.

use serde::{Deserialize, Serialize};

use crate::types::{Address, RequestId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Reward tokens were claimed from the policy (reward plus skim).
    RewardIssued { amount: u128 },
    /// A vesting cycle was started or extended.
    NewDistributionCycle { share: u128, reward_rate: u128, period_finish: u64, duration: u64 },
    /// Unvested share was clawed back from the running cycle.
    RewardRevoked { duration: u64, share: u128, amount: u128 },
    /// A speculative claim failed its randomized threshold and was refunded.
    ClaimRevoked { amount: u128 },
    /// A randomness request was issued.
    RandomnessRequested { request_id: RequestId, block: u64 },
    /// A second request was refused while one was still in flight.
    RandomnessRejected { in_flight: RequestId },
    /// A negative rebase closed an expansion run into a new reward cycle.
    NewCouponCycle { index: u64, share: u128, epochs: u64, sibling_pools: Vec<Address> },
    /// Reward tokens were burned for coupon credit.
    CouponsBought { user: Address, cycle: u64, amount: u128 },
    /// A staker collected vested rewards.
    RewardPaid { user: Address, amount: u128 },
    /// A payout was capped at the engine balance; `amount` stays pending.
    RewardDeferred { user: Address, amount: u128 },
    /// LP tokens were staked.
    Staked { user: Address, amount: u128 },
    /// LP tokens were withdrawn.
    Withdrawn { user: Address, amount: u128 },
    /// The price oracle was refreshed.
    OracleUpdated { price: u128, block: u64 },
    /// The multisig skim was paid out.
    MultiSigPaid { to: Address, amount: u128 },
}

impl Event {
    /// Short machine name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RewardIssued { .. } => "reward_issued",
            Self::NewDistributionCycle { .. } => "new_distribution_cycle",
            Self::RewardRevoked { .. } => "reward_revoked",
            Self::ClaimRevoked { .. } => "claim_revoked",
            Self::RandomnessRequested { .. } => "randomness_requested",
            Self::RandomnessRejected { .. } => "randomness_rejected",
            Self::NewCouponCycle { .. } => "new_coupon_cycle",
            Self::CouponsBought { .. } => "coupons_bought",
            Self::RewardPaid { .. } => "reward_paid",
            Self::RewardDeferred { .. } => "reward_deferred",
            Self::Staked { .. } => "staked",
            Self::Withdrawn { .. } => "withdrawn",
            Self::OracleUpdated { .. } => "oracle_updated",
            Self::MultiSigPaid { .. } => "multi_sig_paid",
        }
    }

    /// Render the event as a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keyed_by_kind() {
        let e = Event::RewardRevoked { duration: 1, share: 5, amount: 7 };
        let json = e.to_json().unwrap();
        assert!(json.starts_with("{\"reward_revoked\":"), "{json}");
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn kind_matches_serde_variant_name() {
        let events = [
            Event::RewardIssued { amount: 1 },
            Event::ClaimRevoked { amount: 1 },
            Event::RewardDeferred { user: Address::ZERO, amount: 1 },
            Event::Staked { user: Address::ZERO, amount: 1 },
            Event::OracleUpdated { price: 1, block: 2 },
        ];
        for e in events {
            let json = e.to_json().unwrap();
            assert!(json.starts_with(&format!("{{\"{}\":", e.kind())), "{json}");
        }
    }
}
