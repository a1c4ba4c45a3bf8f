//! Error types for the Ebb stabilizer engines.
use thiserror::Error;

use crate::types::{Address, RequestId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("division by zero")] DivisionByZero,
    #[error("zero total supply")] ZeroSupply,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance for {owner}: have {have}, need {need}")] InsufficientBalance { owner: Address, have: u128, need: u128 },
    #[error("invalid rebase target: {0}")] InvalidRebase(u128),
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("randomness fee not covered: balance {balance}, fee {fee}")] InsufficientFee { balance: u128, fee: u128 },
    #[error("randomness source not attached")] RandomnessUnavailable,
    #[error("price oracle not attached")] PriceUnavailable,
    #[error("oracle failure: {0}")] Failure(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("reward cycle still running until block {period_finish}")] CycleRunning { period_finish: u64 },
    #[error("distribution duration must be non-zero")] ZeroDuration,
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("pool is not enabled")] PoolDisabled,
    #[error("cannot stake or withdraw zero")] ZeroAmount,
    #[error("cant stake more than lp limit: staked {staked}, adding {amount}, limit {limit}")] UserLimitExceeded { staked: u128, amount: u128, limit: u128 },
    #[error("cant stake, pool lp limit reached: total {total}, adding {amount}, limit {limit}")] PoolLimitExceeded { total: u128, amount: u128, limit: u128 },
    #[error("withdraw exceeds stake: staked {staked}, requested {requested}")] WithdrawExceedsStake { staked: u128, requested: u128 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CouponError {
    #[error("coupons can only be bought during a negative rebase")] WindowClosed,
    #[error("no reward cycle open for coupons")] NoCycle,
    #[error("price {price} is not below coupon threshold {threshold}")] PriceAboveThreshold { price: u128, threshold: u128 },
    #[error("cannot buy zero coupons")] ZeroAmount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unsupported state version {found}, expected {expected}")] UnsupportedVersion { found: u16, expected: u16 },
    #[error("encode: {0}")] Encode(String),
    #[error("decode: {0}")] Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("load: {0}")] Load(String),
    #[error("invalid {field}: {reason}")] Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("caller {caller} is not the {role}")] Unauthorized { caller: Address, role: &'static str },
    #[error("operation requires the {expected} gate")] GateMismatch { expected: &'static str },
    #[error("no randomness request in flight")] NoRequestInFlight,
    #[error("stale randomness response {got}, expected {expected}")] StaleRequest { got: RequestId, expected: RequestId },
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Token(#[from] TokenError),
    #[error(transparent)] Oracle(#[from] OracleError),
    #[error(transparent)] Scheduler(#[from] SchedulerError),
    #[error(transparent)] Stake(#[from] StakeError),
    #[error(transparent)] Coupon(#[from] CouponError),
    #[error(transparent)] State(#[from] StateError),
    #[error(transparent)] Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_limit_messages_match_pool_wording() {
        let user = StakeError::UserLimitExceeded { staked: 6, amount: 5, limit: 10 };
        assert!(user.to_string().starts_with("cant stake more than lp limit"));
        let pool = StakeError::PoolLimitExceeded { total: 6, amount: 10, limit: 15 };
        assert!(pool.to_string().starts_with("cant stake, pool lp limit reached"));
    }

    #[test]
    fn engine_error_wraps_transparently() {
        let e: EngineError = CouponError::WindowClosed.into();
        assert_eq!(e.to_string(), "coupons can only be bought during a negative rebase");
        let e: EngineError = MathError::ZeroSupply.into();
        assert_eq!(e, EngineError::Math(MathError::ZeroSupply));
    }

    #[test]
    fn unauthorized_names_role() {
        let e = EngineError::Unauthorized { caller: Address::repeat_byte(0xAB), role: "policy" };
        assert!(e.to_string().contains("policy"));
        assert!(e.to_string().contains("abab"));
    }
}
