//! The stabilizer engine.
//!
//! [`Engine`] owns one [`EngineState`] and an event log. Every public
//! mutating call runs inside [`Engine::transact`]: the state is snapshotted
//! first and restored, with the call's events dropped, if anything fails.
//! Host collaborators (tokens, oracles, current block) arrive per call in
//! an [`Env`].

use tracing::{debug, info, warn};

use ebb_core::constants::PRECISION;
use ebb_core::error::{ConfigError, EngineError, MathError, OracleError, SchedulerError, StakeError, StateError};
use ebb_core::events::Event;
use ebb_core::math::{amount_of, amount_of_up, share_of};
use ebb_core::traits::{PriceOracle, RandomnessSource, TokenLedger};
use ebb_core::types::{Address, EpochSignal, RebaseDirection, RequestId};
use ebb_curve::CurveParams;

use crate::config::EngineConfig;
use crate::gate::{DistributionTable, GateContext, RequestDecision, Resolution, RewardInstruction};
use crate::state::EngineState;

/// Host collaborators for one call.
pub struct Env<'a> {
    /// Current block number.
    pub block: u64,
    /// Elastic reward token.
    pub reward_token: &'a mut dyn TokenLedger,
    /// LP token stakers deposit.
    pub lp_token: &'a mut dyn TokenLedger,
    pub randomness: Option<&'a mut dyn RandomnessSource>,
    pub price_oracle: Option<&'a mut dyn PriceOracle>,
}

impl<'a> Env<'a> {
    pub fn new(block: u64, reward_token: &'a mut dyn TokenLedger, lp_token: &'a mut dyn TokenLedger) -> Self {
        Self { block, reward_token, lp_token, randomness: None, price_oracle: None }
    }

    pub fn with_randomness(mut self, source: &'a mut dyn RandomnessSource) -> Self {
        self.randomness = Some(source);
        self
    }

    pub fn with_price_oracle(mut self, oracle: &'a mut dyn PriceOracle) -> Self {
        self.price_oracle = Some(oracle);
        self
    }
}

/// A deployed stabilizer pool.
#[derive(Debug, Clone)]
pub struct Engine {
    state: EngineState,
    events: Vec<Event>,
}

fn require(caller: &Address, expected: &Address, role: &'static str) -> Result<(), EngineError> {
    if caller != expected {
        return Err(EngineError::Unauthorized { caller: *caller, role });
    }
    Ok(())
}

impl Engine {
    /// Validate `config` and build a fresh engine.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let state = EngineState::from_config(config)?;
        info!(gate = state.gate.name(), engine = %state.engine, "stabilizer initialized");
        Ok(Self::from_state(state))
    }

    /// Wrap an existing state, e.g. one built directly in a test.
    pub fn from_state(state: EngineState) -> Self {
        Self { state, events: Vec::new() }
    }

    /// Rebuild an engine from [`snapshot`](Self::snapshot) bytes.
    pub fn restore(bytes: &[u8]) -> Result<Self, EngineError> {
        Ok(Self::from_state(EngineState::decode(bytes)?))
    }

    /// Encode the current state.
    pub fn snapshot(&self) -> Result<Vec<u8>, StateError> {
        self.state.encode()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Events recorded by successful calls, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take and clear the event log.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Run `f` atomically: on error the state and event log are restored.
    pub fn transact<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut EngineState, &mut Vec<Event>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let snapshot = self.state.clone();
        let mark = self.events.len();
        match f(&mut self.state, &mut self.events) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.state = snapshot;
                self.events.truncate(mark);
                warn!(op, error = %e, "transaction reverted");
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Epochs
    // ------------------------------------------------------------------

    /// Per-epoch entry point for the supply-policy controller.
    ///
    /// Returns the reward tokens pulled from the policy this epoch.
    pub fn check_stabilizer_and_get_reward(
        &mut self,
        env: &mut Env<'_>,
        caller: &Address,
        signal: &EpochSignal,
    ) -> Result<u128, EngineError> {
        self.transact("check_stabilizer_and_get_reward", |state, events| {
            state.run_epoch(env, caller, signal, events)
        })
    }

    /// Randomness callback, accepted only from the configured consumer.
    pub fn fulfill_randomness(
        &mut self,
        env: &mut Env<'_>,
        caller: &Address,
        request_id: RequestId,
        random_value: u128,
    ) -> Result<(), EngineError> {
        self.transact("fulfill_randomness", |state, events| {
            require(caller, &state.randomness_consumer, "randomness consumer")?;
            let resolution = state.gate.as_threshold_mut()?.resolve(request_id, random_value)?;
            match resolution {
                Resolution::Confirm { claim_share, skim_share, skim_to, count, target } => {
                    info!(%request_id, count, target, "claim confirmed");
                    state.confirm_claim(env, events, claim_share, skim_share, &skim_to)
                }
                Resolution::Revoke { claim_share, skim_share, count, target } => {
                    info!(%request_id, count, target, "claim revoked");
                    state.refund_claim(env, events, claim_share, skim_share)
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Stakers
    // ------------------------------------------------------------------

    pub fn stake(&mut self, env: &mut Env<'_>, user: &Address, amount: u128) -> Result<(), EngineError> {
        self.transact("stake", |state, events| {
            if !state.pool_enabled {
                return Err(StakeError::PoolDisabled.into());
            }
            state.stakers.stake(&mut state.stream, env.block, user, amount)?;
            env.lp_token.transfer(user, &state.engine, amount)?;
            events.push(Event::Staked { user: *user, amount });
            debug!(%user, amount, total = state.stakers.total_staked(), "staked");
            Ok(())
        })
    }

    pub fn withdraw(&mut self, env: &mut Env<'_>, user: &Address, amount: u128) -> Result<(), EngineError> {
        self.transact("withdraw", |state, events| state.withdraw(env, events, user, amount))
    }

    /// Pay out `user`'s vested reward. Returns the tokens paid.
    pub fn get_reward(&mut self, env: &mut Env<'_>, user: &Address) -> Result<u128, EngineError> {
        self.transact("get_reward", |state, events| state.pay_reward(env, events, user))
    }

    /// Withdraw the whole stake and collect rewards.
    pub fn exit(&mut self, env: &mut Env<'_>, user: &Address) -> Result<u128, EngineError> {
        self.transact("exit", |state, events| {
            let staked = state.stakers.stake_of(user);
            if staked > 0 {
                state.withdraw(env, events, user, staked)?;
            }
            state.pay_reward(env, events, user)
        })
    }

    /// Reward share `user` could claim at `block`.
    pub fn earned(&self, block: u64, user: &Address) -> Result<u128, MathError> {
        self.state.stakers.earned(&self.state.stream, block, user)
    }

    /// Tokens `user` could claim at `block` and reward-token `supply`.
    pub fn earned_amount(&self, block: u64, supply: u128, user: &Address) -> Result<u128, MathError> {
        amount_of(self.earned(block, user)?, supply)
    }

    // ------------------------------------------------------------------
    // Coupons
    // ------------------------------------------------------------------

    /// Burn `amount` reward tokens from `user` for coupon credit.
    pub fn buy_coupons(&mut self, env: &mut Env<'_>, user: &Address, amount: u128) -> Result<(), EngineError> {
        self.transact("buy_coupons", |state, events| {
            let last_rebase = state.last_rebase;
            let gate = state.gate.as_curve_mut()?;
            let price = env
                .price_oracle
                .as_deref()
                .map(|oracle| oracle.latest_price())
                .ok_or(OracleError::PriceUnavailable)?;
            let cycle = gate.buy_coupons(user, amount, price, last_rebase)?;
            env.reward_token.burn(user, amount)?;
            events.push(Event::CouponsBought { user: *user, cycle, amount });
            info!(%user, cycle, amount, price, "coupons bought");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Administration (owner only)
    // ------------------------------------------------------------------

    fn admin(
        &mut self,
        caller: &Address,
        setting: &'static str,
        f: impl FnOnce(&mut EngineState) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        self.transact(setting, |state, _| {
            require(caller, &state.owner, "owner")?;
            f(state)?;
            info!(setting, "setting updated");
            Ok(())
        })
    }

    pub fn set_pool_enabled(&mut self, caller: &Address, enabled: bool) -> Result<(), EngineError> {
        self.admin(caller, "pool_enabled", |s| {
            s.pool_enabled = enabled;
            Ok(())
        })
    }

    pub fn set_user_lp_limit(&mut self, caller: &Address, enabled: bool, limit: u128) -> Result<(), EngineError> {
        self.admin(caller, "user_lp_limit", |s| {
            s.stakers.limits.user_limit_enabled = enabled;
            s.stakers.limits.user_limit = limit;
            Ok(())
        })
    }

    pub fn set_pool_lp_limit(&mut self, caller: &Address, enabled: bool, limit: u128) -> Result<(), EngineError> {
        self.admin(caller, "pool_lp_limit", |s| {
            s.stakers.limits.pool_limit_enabled = enabled;
            s.stakers.limits.pool_limit = limit;
            Ok(())
        })
    }

    pub fn set_revoke_reward(&mut self, caller: &Address, enabled: bool) -> Result<(), EngineError> {
        self.admin(caller, "revoke_reward", |s| {
            s.revocation.enabled = enabled;
            Ok(())
        })
    }

    pub fn set_revoke_reward_duration(&mut self, caller: &Address, duration: u64) -> Result<(), EngineError> {
        self.admin(caller, "revoke_reward_duration", |s| {
            s.revocation.duration = duration;
            Ok(())
        })
    }

    pub fn set_multi_sig_address(&mut self, caller: &Address, address: Address) -> Result<(), EngineError> {
        self.admin(caller, "multi_sig_address", |s| {
            s.skim.address = address;
            Ok(())
        })
    }

    pub fn set_multi_sig_reward_share(&mut self, caller: &Address, share: u128) -> Result<(), EngineError> {
        self.admin(caller, "multi_sig_reward_share", |s| {
            if share > PRECISION {
                return Err(ConfigError::Invalid { field: "skim.share", reason: "exceeds 1e18 (100%)".into() }.into());
            }
            s.skim.share = share;
            Ok(())
        })
    }

    pub fn set_before_period_finish(&mut self, caller: &Address, enabled: bool) -> Result<(), EngineError> {
        self.admin(caller, "before_period_finish", |s| {
            s.before_period_finish = enabled;
            Ok(())
        })
    }

    pub fn set_reward_percentage(&mut self, caller: &Address, percentage: u128) -> Result<(), EngineError> {
        self.admin(caller, "reward_percentage", |s| s.gate.set_reward_percentage(percentage))
    }

    pub fn set_block_duration(&mut self, caller: &Address, duration: u64) -> Result<(), EngineError> {
        self.admin(caller, "block_duration", |s| Ok(s.gate.set_block_duration(duration)?))
    }

    pub fn set_count_in_sequence(&mut self, caller: &Address, enabled: bool) -> Result<(), EngineError> {
        self.admin(caller, "count_in_sequence", |s| {
            s.gate.as_threshold_mut()?.count_in_sequence = enabled;
            Ok(())
        })
    }

    pub fn set_distribution(
        &mut self,
        caller: &Address,
        mean: u64,
        deviation: u64,
        table: Vec<u64>,
    ) -> Result<(), EngineError> {
        self.admin(caller, "distribution", |s| {
            let gate = s.gate.as_threshold_mut()?;
            gate.distribution = DistributionTable::new(mean, deviation, table)?;
            Ok(())
        })
    }

    pub fn set_coupon_price_threshold(&mut self, caller: &Address, price: u128) -> Result<(), EngineError> {
        self.admin(caller, "coupon_price_threshold", |s| {
            s.gate.as_curve_mut()?.coupon_price_threshold = price;
            Ok(())
        })
    }

    pub fn set_curve_params(
        &mut self,
        caller: &Address,
        mean: f64,
        deviation: f64,
        curve_shifter: f64,
    ) -> Result<(), EngineError> {
        self.admin(caller, "curve_params", |s| {
            let gate = s.gate.as_curve_mut()?;
            if !curve_shifter.is_finite() {
                return Err(ConfigError::Invalid { field: "curve_shifter", reason: "must be finite".into() }.into());
            }
            gate.curve = CurveParams::from_deviation(mean, deviation)?;
            gate.curve_shifter = curve_shifter;
            Ok(())
        })
    }

    pub fn set_oracle_period(&mut self, caller: &Address, period: u64) -> Result<(), EngineError> {
        self.admin(caller, "oracle_period", |s| {
            s.gate.as_curve_mut()?.oracle_period = period;
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------
// State transitions
// ----------------------------------------------------------------------

impl EngineState {
    fn run_epoch(
        &mut self,
        env: &mut Env<'_>,
        caller: &Address,
        signal: &EpochSignal,
        events: &mut Vec<Event>,
    ) -> Result<u128, EngineError> {
        require(caller, &self.policy, "policy")?;
        let now = env.block;
        let direction = signal.direction();

        let ctx = GateContext {
            block: now,
            supply: env.reward_token.total_supply(),
            last_rebase: self.last_rebase,
            stream_running: self.stream.is_running(now),
            before_period_finish: self.before_period_finish,
            skim: self.skim,
            randomness_funded: env.randomness.as_deref().is_some_and(|r| r.is_funded()),
        };
        let instruction = self.gate.evaluate(signal, &ctx)?;
        debug!(block = now, ?direction, supply_delta = signal.supply_delta, ?instruction, "epoch evaluated");

        let pulled = match instruction {
            RewardInstruction::Idle => 0,
            RewardInstruction::Commit { share, skim_share, duration, before_period_finish } => {
                self.commit(env, events, share, skim_share, duration, before_period_finish)?
            }
            RewardInstruction::Hold { previous_share, claim_share, skim_share, request } => {
                self.hold(env, events, previous_share, claim_share, skim_share, request)?
            }
            RewardInstruction::OpenCouponCycle { index, share, epochs, sibling_pools } => {
                info!(index, share, epochs, siblings = sibling_pools.len(), "coupon cycle opened");
                events.push(Event::NewCouponCycle { index, share, epochs, sibling_pools });
                0
            }
        };

        if direction != RebaseDirection::Positive {
            self.revoke_unvested(env, events)?;
        }
        self.last_rebase = direction;
        // Runs last so a reverted epoch never refreshes the oracle.
        self.refresh_price_oracle(env, events);
        Ok(pulled)
    }

    fn refresh_price_oracle(&mut self, env: &mut Env<'_>, events: &mut Vec<Event>) {
        let now = env.block;
        let Ok(gate) = self.gate.as_curve_mut() else {
            return;
        };
        if !gate.oracle_due(now) {
            return;
        }
        let Some(oracle) = env.price_oracle.as_deref_mut() else {
            debug!("no price oracle attached; skipping update");
            return;
        };
        match oracle.update() {
            Ok(price) => {
                gate.record_oracle_update(now);
                events.push(Event::OracleUpdated { price, block: now });
                debug!(price, block = now, "price oracle updated");
            }
            Err(e) => warn!(error = %e, "price oracle update failed"),
        }
    }

    /// Tokens held by the engine that are not reserved for a pending claim.
    fn free_balance(&self, env: &Env<'_>, supply: u128) -> Result<u128, MathError> {
        let held = amount_of(self.gate.held_share(), supply)?;
        Ok(env.reward_token.balance_of(&self.engine).saturating_sub(held))
    }

    fn pay_skim(
        &self,
        env: &mut Env<'_>,
        events: &mut Vec<Event>,
        to: &Address,
        amount: u128,
    ) -> Result<(), EngineError> {
        if amount == 0 {
            return Ok(());
        }
        env.reward_token.transfer(&self.engine, to, amount)?;
        events.push(Event::MultiSigPaid { to: *to, amount });
        Ok(())
    }

    fn commit(
        &mut self,
        env: &mut Env<'_>,
        events: &mut Vec<Event>,
        share: u128,
        skim_share: u128,
        duration: u64,
        before_period_finish: bool,
    ) -> Result<u128, EngineError> {
        if share == 0 {
            return Ok(0);
        }
        let supply = env.reward_token.total_supply();
        let skim_amount = amount_of(skim_share, supply)?;
        let total = amount_of_up(share, supply)?
            .checked_add(skim_amount)
            .ok_or(MathError::ArithmeticOverflow)?;

        let cycle = self
            .stream
            .start_or_extend(env.block, share, duration, before_period_finish, self.stakers.total_staked())?;

        env.reward_token.transfer(&self.policy, &self.engine, total)?;
        events.push(Event::RewardIssued { amount: total });
        let multisig = self.skim.address;
        self.pay_skim(env, events, &multisig, skim_amount)?;
        events.push(Event::NewDistributionCycle {
            share: cycle.share,
            reward_rate: cycle.reward_rate,
            period_finish: cycle.period_finish,
            duration: cycle.duration,
        });
        info!(
            amount = total,
            skim = skim_amount,
            reward_rate = cycle.reward_rate,
            period_finish = cycle.period_finish,
            "distribution cycle started"
        );
        Ok(total)
    }

    fn hold(
        &mut self,
        env: &mut Env<'_>,
        events: &mut Vec<Event>,
        previous_share: u128,
        claim_share: u128,
        skim_share: u128,
        request: RequestDecision,
    ) -> Result<u128, EngineError> {
        let supply = env.reward_token.total_supply();
        let before = amount_of(previous_share, supply)?;
        let after = amount_of_up(claim_share.saturating_add(skim_share), supply)?;

        let pulled = if after > before {
            let diff = after - before;
            env.reward_token.transfer(&self.policy, &self.engine, diff)?;
            diff
        } else {
            let refund = (before - after).min(env.reward_token.balance_of(&self.engine));
            if refund > 0 {
                env.reward_token.transfer(&self.engine, &self.policy, refund)?;
            }
            0
        };
        if after > 0 {
            events.push(Event::RewardIssued { amount: after });
        }

        match request {
            RequestDecision::Issue => self.request_randomness(env, events)?,
            RequestDecision::Rejected(in_flight) => {
                info!(%in_flight, "randomness request rejected; one already in flight");
                events.push(Event::RandomnessRejected { in_flight });
            }
            RequestDecision::Skip => debug!(block = env.block, "randomness request skipped"),
        }
        Ok(pulled)
    }

    fn request_randomness(&mut self, env: &mut Env<'_>, events: &mut Vec<Event>) -> Result<(), EngineError> {
        let block = env.block;
        let Some(source) = env.randomness.as_deref_mut() else {
            warn!(error = %OracleError::RandomnessUnavailable, "claim stays held");
            return Ok(());
        };
        if source.consumer() != self.randomness_consumer {
            warn!(
                consumer = %source.consumer(),
                expected = %self.randomness_consumer,
                "randomness source would answer from another consumer; claim stays held"
            );
            return Ok(());
        }
        match source.request_random_number() {
            Ok(request_id) => {
                self.gate.as_threshold_mut()?.record_request(request_id, block);
                events.push(Event::RandomnessRequested { request_id, block });
                info!(%request_id, block, "randomness requested");
            }
            Err(e) => warn!(error = %e, "randomness request failed; claim stays held"),
        }
        Ok(())
    }

    fn confirm_claim(
        &mut self,
        env: &mut Env<'_>,
        events: &mut Vec<Event>,
        claim_share: u128,
        skim_share: u128,
        skim_to: &Address,
    ) -> Result<(), EngineError> {
        if claim_share == 0 {
            return Ok(());
        }
        let duration = self.gate.block_duration();
        let started = self.stream.start_or_extend(
            env.block,
            claim_share,
            duration,
            self.before_period_finish,
            self.stakers.total_staked(),
        );
        let cycle = match started {
            Ok(cycle) => cycle,
            Err(SchedulerError::CycleRunning { period_finish }) => {
                warn!(period_finish, "cycle still running; refunding confirmed claim");
                return self.refund_claim(env, events, claim_share, skim_share);
            }
            Err(e) => return Err(e.into()),
        };

        let supply = env.reward_token.total_supply();
        let skim_amount = amount_of(skim_share, supply)?.min(env.reward_token.balance_of(&self.engine));
        self.pay_skim(env, events, skim_to, skim_amount)?;
        events.push(Event::NewDistributionCycle {
            share: cycle.share,
            reward_rate: cycle.reward_rate,
            period_finish: cycle.period_finish,
            duration: cycle.duration,
        });
        info!(reward_rate = cycle.reward_rate, period_finish = cycle.period_finish, "distribution cycle started");
        Ok(())
    }

    fn refund_claim(
        &mut self,
        env: &mut Env<'_>,
        events: &mut Vec<Event>,
        claim_share: u128,
        skim_share: u128,
    ) -> Result<(), EngineError> {
        let supply = env.reward_token.total_supply();
        let amount = amount_of(claim_share.saturating_add(skim_share), supply)?
            .min(env.reward_token.balance_of(&self.engine));
        if amount > 0 {
            env.reward_token.transfer(&self.engine, &self.policy, amount)?;
        }
        events.push(Event::ClaimRevoked { amount });
        Ok(())
    }

    fn revoke_unvested(&mut self, env: &mut Env<'_>, events: &mut Vec<Event>) -> Result<(), EngineError> {
        let total_staked = self.stakers.total_staked();
        let Some(revoked) = self.revocation.apply(&mut self.stream, env.block, total_staked)? else {
            return Ok(());
        };
        let supply = env.reward_token.total_supply();
        let amount = amount_of(revoked.share, supply)?;
        let refund = amount.min(self.free_balance(env, supply)?);
        if refund > 0 {
            env.reward_token.transfer(&self.engine, &self.policy, refund)?;
        }
        events.push(Event::RewardRevoked { duration: revoked.duration, share: revoked.share, amount });
        info!(
            duration = revoked.duration,
            share = revoked.share,
            amount,
            refund,
            period_finish = self.stream.period_finish,
            "unvested reward revoked"
        );
        Ok(())
    }

    fn withdraw(
        &mut self,
        env: &mut Env<'_>,
        events: &mut Vec<Event>,
        user: &Address,
        amount: u128,
    ) -> Result<(), EngineError> {
        self.stakers.withdraw(&mut self.stream, env.block, user, amount)?;
        env.lp_token.transfer(&self.engine, user, amount)?;
        events.push(Event::Withdrawn { user: *user, amount });
        debug!(%user, amount, total = self.stakers.total_staked(), "withdrawn");
        Ok(())
    }

    fn pay_reward(&mut self, env: &mut Env<'_>, events: &mut Vec<Event>, user: &Address) -> Result<u128, EngineError> {
        let share = self.stakers.take_reward(&mut self.stream, env.block, user)?;
        if share == 0 {
            return Ok(0);
        }
        let supply = env.reward_token.total_supply();
        let owed = amount_of(share, supply)?;
        let paid = owed.min(self.free_balance(env, supply)?);
        if paid < owed {
            let unpaid = share.saturating_sub(share_of(paid, supply)?);
            self.stakers.restore_reward(user, unpaid)?;
            events.push(Event::RewardDeferred { user: *user, amount: owed - paid });
            warn!(%user, owed, paid, "reward capped at engine balance; remainder stays pending");
        }
        if paid > 0 {
            env.reward_token.transfer(&self.engine, user, paid)?;
            events.push(Event::RewardPaid { user: *user, amount: paid });
        }
        Ok(paid)
    }
}
