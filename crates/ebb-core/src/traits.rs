//! Trait interfaces for the collaborators a stabilizer engine consumes.
//!
//! The engine never owns these; the host passes them in per call:
//! - [`TokenLedger`]: elastic reward token and LP staking token
//! - [`RandomnessSource`]: asynchronous verifiable-random-number consumer
//! - [`PriceOracle`]: time-weighted price feed

use crate::error::{OracleError, TokenError};
use crate::types::{Address, RequestId};

/// Balance-keeping surface of a fungible token.
///
/// `total_supply` must be read fresh at every share conversion: for the
/// elastic reward token it changes on every rebase.
///
/// Implementations must reject a transfer or burn that cannot be honored
/// *before* mutating any balance, so a failed call leaves the ledger intact.
pub trait TokenLedger {
    /// Current total supply in base units.
    fn total_supply(&self) -> u128;

    /// Balance of `owner` in base units.
    fn balance_of(&self, owner: &Address) -> u128;

    /// Move `amount` from `from` to `to`.
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TokenError>;

    /// Destroy `amount` held by `from`, reducing total supply.
    fn burn(&mut self, from: &Address, amount: u128) -> Result<(), TokenError>;
}

/// Requester side of a verifiable random function oracle.
///
/// The answer arrives later through the engine's `fulfill_randomness`
/// callback, invoked by [`consumer`](Self::consumer).
pub trait RandomnessSource {
    /// Address the oracle will deliver the callback from.
    fn consumer(&self) -> Address;

    /// Fee charged per request, in fee-token base units.
    fn fee(&self) -> u128;

    /// Fee-token balance available to the consumer.
    fn fee_balance(&self) -> u128;

    /// Whether a request can be paid for right now.
    ///
    /// Default implementation: `fee_balance() >= fee()`.
    fn is_funded(&self) -> bool {
        self.fee_balance() >= self.fee()
    }

    /// Issue a request, paying the fee. Returns the id the callback will carry.
    fn request_random_number(&mut self) -> Result<RequestId, OracleError>;
}

/// Time-weighted average price feed for the reward token.
pub trait PriceOracle {
    /// Most recently computed price (18-decimal fixed point).
    fn latest_price(&self) -> u128;

    /// Recompute the average and return the new price.
    fn update(&mut self) -> Result<u128, OracleError>;
}
