//! In-memory host collaborators for testing.
//!
//! [`MemoryToken`] stores balances as gons, so a rebase rescales every
//! holder at once the way an elastic-supply token does. [`MockRandomness`]
//! and [`MockPriceOracle`] stand in for the external oracles. None of
//! these persist anything; they exist so engines can be driven end to end
//! without a chain.

use std::collections::HashMap;

use crate::constants::MAX_GONS;
use crate::error::{MathError, OracleError, TokenError};
use crate::math::mul_div;
use crate::traits::{PriceOracle, RandomnessSource, TokenLedger};
use crate::types::{Address, RequestId};

/// Elastic-supply token held entirely in memory.
///
/// Holdings are kept in gons and valued as `gons * total_supply / total_gons`,
/// so [`rebase`](Self::rebase) only changes `total_supply` and every holder
/// scales in proportion. The gon total starts as the largest multiple of
/// the initial supply under [`MAX_GONS`]; the sum of all balances never
/// exceeds `total_supply` and falls short of it by less than one unit per
/// holder. A token that is never rebased behaves like a plain fungible
/// token.
#[derive(Debug, Clone)]
pub struct MemoryToken {
    name: String,
    total_supply: u128,
    total_gons: u128,
    gons: HashMap<Address, u128>,
}

impl MemoryToken {
    /// Create a token minting `supply` to `holder`.
    ///
    /// # Errors
    ///
    /// [`MathError::ZeroSupply`] for an empty token and
    /// [`MathError::ArithmeticOverflow`] if `supply` exceeds [`MAX_GONS`].
    pub fn new(name: impl Into<String>, holder: Address, supply: u128) -> Result<Self, TokenError> {
        if supply == 0 {
            return Err(MathError::ZeroSupply.into());
        }
        if supply > MAX_GONS {
            return Err(MathError::ArithmeticOverflow.into());
        }
        let total_gons = MAX_GONS - MAX_GONS % supply;
        Ok(Self {
            name: name.into(),
            total_supply: supply,
            total_gons,
            gons: HashMap::from([(holder, total_gons)]),
        })
    }

    /// Token name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every address holding a non-zero gon balance.
    pub fn holders(&self) -> impl Iterator<Item = &Address> {
        self.gons.iter().filter(|(_, g)| **g > 0).map(|(a, _)| a)
    }

    /// Mint `amount` fresh tokens to `to`.
    pub fn mint(&mut self, to: &Address, amount: u128) -> Result<(), TokenError> {
        let gon_amount = self.gons_for(amount)?;
        self.total_gons = self
            .total_gons
            .checked_add(gon_amount)
            .ok_or(MathError::ArithmeticOverflow)?;
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(MathError::ArithmeticOverflow)?;
        *self.gons.entry(*to).or_default() += gon_amount;
        Ok(())
    }

    /// Rebase to `new_supply`, rescaling every balance by `new_supply / old_supply`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidRebase`] if `new_supply` is zero or exceeds the gon backing.
    pub fn rebase(&mut self, new_supply: u128) -> Result<(), TokenError> {
        if new_supply == 0 || new_supply > self.total_gons {
            return Err(TokenError::InvalidRebase(new_supply));
        }
        self.total_supply = new_supply;
        Ok(())
    }

    fn gons_of(&self, owner: &Address) -> u128 {
        self.gons.get(owner).copied().unwrap_or(0)
    }

    fn value_of(&self, gons: u128) -> Result<u128, MathError> {
        if self.total_gons == 0 {
            return Ok(0);
        }
        mul_div(gons, self.total_supply, self.total_gons)
    }

    /// Smallest gon amount worth at least `amount`.
    fn gons_for(&self, amount: u128) -> Result<u128, MathError> {
        if self.total_supply == 0 {
            return Err(MathError::ZeroSupply);
        }
        let floor = mul_div(amount, self.total_gons, self.total_supply)?;
        if self.value_of(floor)? >= amount {
            Ok(floor)
        } else {
            floor.checked_add(1).ok_or(MathError::ArithmeticOverflow)
        }
    }

    fn debit(&mut self, owner: &Address, amount: u128) -> Result<u128, TokenError> {
        let have = self.balance_of(owner);
        if have < amount {
            return Err(TokenError::InsufficientBalance { owner: *owner, have, need: amount });
        }
        let gon_amount = self.gons_for(amount)?.min(self.gons_of(owner));
        if let Some(g) = self.gons.get_mut(owner) {
            *g -= gon_amount;
        }
        Ok(gon_amount)
    }
}

impl TokenLedger for MemoryToken {
    fn total_supply(&self) -> u128 {
        self.total_supply
    }

    fn balance_of(&self, owner: &Address) -> u128 {
        // Holdings never exceed total_gons, so the quotient fits.
        self.value_of(self.gons_of(owner)).unwrap_or(0)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let gon_amount = self.debit(from, amount)?;
        *self.gons.entry(*to).or_default() += gon_amount;
        Ok(())
    }

    fn burn(&mut self, from: &Address, amount: u128) -> Result<(), TokenError> {
        if amount == 0 {
            return Ok(());
        }
        let gon_amount = self.debit(from, amount)?;
        self.total_gons -= gon_amount;
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }
}

/// Scripted randomness consumer.
///
/// Requests are recorded and charged against a fee balance; tests deliver
/// the answer by calling the engine's callback with
/// [`last_request`](Self::last_request).
#[derive(Debug, Clone)]
pub struct MockRandomness {
    consumer: Address,
    fee: u128,
    fee_balance: u128,
    nonce: u64,
    requests: Vec<RequestId>,
}

impl MockRandomness {
    /// Create an unfunded consumer charging `fee` per request.
    pub fn new(consumer: Address, fee: u128) -> Self {
        Self { consumer, fee, fee_balance: 0, nonce: 0, requests: Vec::new() }
    }

    /// Top up the fee balance.
    pub fn fund(&mut self, amount: u128) {
        self.fee_balance = self.fee_balance.saturating_add(amount);
    }

    /// All requests issued so far, oldest first.
    pub fn requests(&self) -> &[RequestId] {
        &self.requests
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<RequestId> {
        self.requests.last().copied()
    }
}

impl RandomnessSource for MockRandomness {
    fn consumer(&self) -> Address {
        self.consumer
    }

    fn fee(&self) -> u128 {
        self.fee
    }

    fn fee_balance(&self) -> u128 {
        self.fee_balance
    }

    fn request_random_number(&mut self) -> Result<RequestId, OracleError> {
        if self.fee_balance < self.fee {
            return Err(OracleError::InsufficientFee { balance: self.fee_balance, fee: self.fee });
        }
        self.fee_balance -= self.fee;
        let id = RequestId::derive(&self.consumer, self.nonce);
        self.nonce += 1;
        self.requests.push(id);
        Ok(id)
    }
}

/// Price feed returning a settable price.
#[derive(Debug, Clone, Default)]
pub struct MockPriceOracle {
    price: u128,
    updates: u64,
    failing: bool,
}

impl MockPriceOracle {
    /// Create an oracle reporting `price`.
    pub fn new(price: u128) -> Self {
        Self { price, updates: 0, failing: false }
    }

    /// Change the reported price.
    pub fn set_price(&mut self, price: u128) {
        self.price = price;
    }

    /// Make subsequent `update` calls fail.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Number of successful `update` calls.
    pub fn update_count(&self) -> u64 {
        self.updates
    }
}

impl PriceOracle for MockPriceOracle {
    fn latest_price(&self) -> u128 {
        self.price
    }

    fn update(&mut self) -> Result<u128, OracleError> {
        if self.failing {
            return Err(OracleError::Failure("mock oracle offline".to_string()));
        }
        self.updates += 1;
        Ok(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TOKEN;
    use proptest::prelude::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn new_token_credits_holder() {
        let t = MemoryToken::new("EBB", addr(1), 1_000 * TOKEN).unwrap();
        assert_eq!(t.total_supply(), 1_000 * TOKEN);
        assert_eq!(t.balance_of(&addr(1)), 1_000 * TOKEN);
        assert_eq!(t.balance_of(&addr(2)), 0);
        assert_eq!(t.name(), "EBB");
    }

    #[test]
    fn transfer_moves_balance() {
        let mut t = MemoryToken::new("EBB", addr(1), 100 * TOKEN).unwrap();
        t.transfer(&addr(1), &addr(2), 40 * TOKEN).unwrap();
        assert_eq!(t.balance_of(&addr(1)), 60 * TOKEN);
        assert_eq!(t.balance_of(&addr(2)), 40 * TOKEN);
    }

    #[test]
    fn transfer_insufficient_leaves_state() {
        let mut t = MemoryToken::new("EBB", addr(1), 10).unwrap();
        let err = t.transfer(&addr(1), &addr(2), 11).unwrap_err();
        assert_eq!(err, TokenError::InsufficientBalance { owner: addr(1), have: 10, need: 11 });
        assert_eq!(t.balance_of(&addr(1)), 10);
        assert_eq!(t.balance_of(&addr(2)), 0);
    }

    #[test]
    fn rebase_scales_all_holders() {
        let mut t = MemoryToken::new("EBB", addr(1), 1_000_000 * TOKEN).unwrap();
        t.transfer(&addr(1), &addr(2), 10 * TOKEN).unwrap();
        t.rebase(2_000_000 * TOKEN).unwrap();
        assert_eq!(t.total_supply(), 2_000_000 * TOKEN);
        assert_eq!(t.balance_of(&addr(2)), 20 * TOKEN);
        assert_eq!(t.balance_of(&addr(1)), 1_999_980 * TOKEN);
    }

    #[test]
    fn new_rejects_empty_token() {
        assert_eq!(
            MemoryToken::new("EBB", addr(1), 0).unwrap_err(),
            TokenError::Math(MathError::ZeroSupply)
        );
    }

    #[test]
    fn rebase_then_transfer_keeps_value() {
        let mut t = MemoryToken::new("EBB", addr(1), 1_000_000 * TOKEN).unwrap();
        t.rebase(2_310_000 * TOKEN).unwrap();
        t.transfer(&addr(1), &addr(2), 7 * TOKEN + 3).unwrap();
        assert_eq!(t.balance_of(&addr(2)), 7 * TOKEN + 3);
        t.rebase(1_155_000 * TOKEN).unwrap();
        // Halving the supply halves the holding, floored.
        assert_eq!(t.balance_of(&addr(2)), (7 * TOKEN + 3) / 2);
    }

    #[test]
    fn rebase_rejects_zero() {
        let mut t = MemoryToken::new("EBB", addr(1), 100).unwrap();
        assert_eq!(t.rebase(0), Err(TokenError::InvalidRebase(0)));
    }

    #[test]
    fn burn_reduces_supply() {
        let mut t = MemoryToken::new("EBB", addr(1), 100 * TOKEN).unwrap();
        t.burn(&addr(1), 30 * TOKEN).unwrap();
        assert_eq!(t.total_supply(), 70 * TOKEN);
        assert_eq!(t.balance_of(&addr(1)), 70 * TOKEN);
    }

    #[test]
    fn mint_after_rebase_credits_nominal() {
        let mut t = MemoryToken::new("EBB", addr(1), 1_000 * TOKEN).unwrap();
        t.rebase(500 * TOKEN).unwrap();
        t.mint(&addr(3), 5 * TOKEN).unwrap();
        assert_eq!(t.balance_of(&addr(3)), 5 * TOKEN);
        assert_eq!(t.total_supply(), 505 * TOKEN);
    }

    #[test]
    fn randomness_charges_fee() {
        let mut r = MockRandomness::new(addr(9), 100);
        assert!(!r.is_funded());
        assert!(matches!(r.request_random_number(), Err(OracleError::InsufficientFee { .. })));
        r.fund(250);
        let a = r.request_random_number().unwrap();
        let b = r.request_random_number().unwrap();
        assert_ne!(a, b);
        assert_eq!(r.fee_balance(), 50);
        assert_eq!(r.last_request(), Some(b));
        assert_eq!(r.requests().len(), 2);
        assert!(!r.is_funded());
    }

    #[test]
    fn price_oracle_counts_updates() {
        let mut o = MockPriceOracle::new(95 * TOKEN / 100);
        assert_eq!(o.update().unwrap(), 95 * TOKEN / 100);
        o.set_failing(true);
        assert!(o.update().is_err());
        assert_eq!(o.update_count(), 1);
        o.set_price(TOKEN);
        assert_eq!(o.latest_price(), TOKEN);
    }

    fn sum_of_balances(t: &MemoryToken) -> u128 {
        t.holders().map(|a| t.balance_of(a)).sum()
    }

    proptest! {
        #[test]
        fn balances_track_supply_across_rebases(
            steps in prop::collection::vec((1u8..6, 1u128..1_000_000, 50u128..200), 1..20),
        ) {
            let mut t = MemoryToken::new("EBB", addr(1), 1_000_000 * TOKEN).unwrap();
            for (to, micro, pct) in steps {
                // Move a slice of holder 1's balance, then rebase by pct%.
                let amount = t.balance_of(&addr(1)) / 1_000_000 * micro;
                t.transfer(&addr(1), &addr(to), amount).unwrap();
                let target = (t.total_supply() / 100 * pct).max(1);
                t.rebase(target).unwrap();

                let holders = t.holders().count() as u128;
                let sum = sum_of_balances(&t);
                prop_assert!(sum <= t.total_supply(), "sum {} > supply {}", sum, t.total_supply());
                prop_assert!(t.total_supply() - sum <= holders, "drift {}", t.total_supply() - sum);
            }
        }
    }
}
