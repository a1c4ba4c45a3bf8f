//! Shared fixtures for the integration tests.

use std::sync::Once;

use ebb_core::constants::{PRECISION, TOKEN};
use ebb_core::error::{EngineError, TokenError};
use ebb_core::events::Event;
use ebb_core::memory::{MemoryToken, MockPriceOracle, MockRandomness};
use ebb_core::traits::TokenLedger;
use ebb_core::types::{Address, EpochSignal};
use ebb_stabilizer::config::{CurveGateConfig, EngineConfig, GateConfig, ThresholdGateConfig};
use ebb_stabilizer::revocation::RevocationPolicy;
use ebb_stabilizer::skim::MultiSigSkim;
use ebb_stabilizer::staking::StakeLimits;
use ebb_stabilizer::{Engine, Env};

pub const OWNER: Address = Address::repeat_byte(0x01);
pub const POLICY: Address = Address::repeat_byte(0x02);
pub const CONSUMER: Address = Address::repeat_byte(0x03);
pub const MULTISIG: Address = Address::repeat_byte(0x04);
pub const ENGINE: Address = Address::repeat_byte(0xEE);
pub const ALICE: Address = Address::repeat_byte(0xA1);
pub const BOB: Address = Address::repeat_byte(0xB0);
pub const CAROL: Address = Address::repeat_byte(0xC0);

/// Reward-token supply minted to the policy at the start of every world.
pub const INITIAL_SUPPLY: u128 = 1_000_000 * TOKEN;
/// LP tokens minted to each of Alice, Bob and Carol.
pub const LP_PER_USER: u128 = 100 * TOKEN;
/// Fee charged per randomness request.
pub const VRF_FEE: u128 = PRECISION / 10;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Engine configuration with every optional feature off.
pub fn base_config(gate: GateConfig) -> EngineConfig {
    EngineConfig {
        engine: ENGINE,
        owner: OWNER,
        policy: POLICY,
        randomness_consumer: CONSUMER,
        pool_enabled: true,
        before_period_finish: false,
        limits: StakeLimits::default(),
        revocation: RevocationPolicy::default(),
        skim: MultiSigSkim::default(),
        gate,
    }
}

pub fn percentage_gate(reward_percentage: u128, duration: u64) -> GateConfig {
    GateConfig::Percentage { reward_percentage, duration }
}

/// 10% claims over 5 blocks, drawing thresholds from `table`.
pub fn threshold_gate(table: Vec<u64>) -> GateConfig {
    GateConfig::RandomThreshold(ThresholdGateConfig {
        reward_percentage: PRECISION / 10,
        block_duration: 5,
        count_in_sequence: true,
        mean: 5,
        deviation: 2,
        table,
    })
}

/// Table used by most threshold scenarios: index 0 needs 8 positive
/// epochs, 1 needs 2, 2 needs 1, 3 needs 7, the rest 5.
pub fn sample_table() -> Vec<u64> {
    let mut table = vec![5; 100];
    table[..4].copy_from_slice(&[8, 2, 1, 7]);
    table
}

/// Standard-normal curve, 5% initial accrual, 5-epoch cycles, 10-block
/// windows, coupons below 0.95.
pub fn curve_gate() -> GateConfig {
    GateConfig::CurveWeighted(CurveGateConfig {
        mean: 0.0,
        deviation: 1.0,
        curve_shifter: 0.0,
        epochs_per_cycle: 5,
        initial_reward_share: PRECISION / 20,
        block_duration: 10,
        oracle_period: 1_000,
        coupon_price_threshold: 95 * PRECISION / 100,
        sibling_pools: vec![Address::repeat_byte(0x5B)],
    })
}

/// A complete deployment: engine, tokens, oracles and a block clock.
pub struct World {
    pub engine: Engine,
    pub reward: MemoryToken,
    pub lp: MemoryToken,
    pub vrf: MockRandomness,
    pub oracle: MockPriceOracle,
    pub block: u64,
}

impl World {
    /// Build a world around `config`. The randomness consumer is funded
    /// for 100 requests and the oracle reports a price of 1.0.
    pub fn new(config: EngineConfig) -> Self {
        init_tracing();
        let engine = Engine::new(&config).expect("valid engine config");
        let reward = MemoryToken::new("EBB", POLICY, INITIAL_SUPPLY).expect("reward token");
        let mut lp = MemoryToken::new("EBB-LP", ALICE, LP_PER_USER).expect("lp token");
        lp.mint(&BOB, LP_PER_USER).expect("mint");
        lp.mint(&CAROL, LP_PER_USER).expect("mint");
        let mut vrf = MockRandomness::new(CONSUMER, VRF_FEE);
        vrf.fund(100 * VRF_FEE);
        Self { engine, reward, lp, vrf, oracle: MockPriceOracle::new(PRECISION), block: 1 }
    }

    /// Run `f` with an [`Env`] wired to this world's collaborators.
    pub fn with_env<T>(&mut self, f: impl FnOnce(&mut Engine, &mut Env<'_>) -> T) -> T {
        let Self { engine, reward, lp, vrf, oracle, block } = self;
        let mut env = Env::new(*block, reward, lp).with_randomness(vrf).with_price_oracle(oracle);
        f(engine, &mut env)
    }

    pub fn advance(&mut self, blocks: u64) {
        self.block += blocks;
    }

    /// Epoch call from the policy with the given supply delta and pool balance.
    pub fn epoch(&mut self, supply_delta: i128, pool_balance: u128) -> Result<u128, EngineError> {
        let signal = EpochSignal::new(supply_delta, pool_balance);
        self.with_env(|engine, env| engine.check_stabilizer_and_get_reward(env, &POLICY, &signal))
    }

    pub fn stake(&mut self, user: Address, amount: u128) -> Result<(), EngineError> {
        self.with_env(|engine, env| engine.stake(env, &user, amount))
    }

    pub fn withdraw(&mut self, user: Address, amount: u128) -> Result<(), EngineError> {
        self.with_env(|engine, env| engine.withdraw(env, &user, amount))
    }

    pub fn get_reward(&mut self, user: Address) -> Result<u128, EngineError> {
        self.with_env(|engine, env| engine.get_reward(env, &user))
    }

    pub fn exit(&mut self, user: Address) -> Result<u128, EngineError> {
        self.with_env(|engine, env| engine.exit(env, &user))
    }

    pub fn buy_coupons(&mut self, user: Address, amount: u128) -> Result<(), EngineError> {
        self.with_env(|engine, env| engine.buy_coupons(env, &user, amount))
    }

    /// Deliver `value` for the most recent randomness request.
    pub fn fulfill(&mut self, value: u128) -> Result<(), EngineError> {
        let request = self.vrf.last_request().ok_or(EngineError::NoRequestInFlight)?;
        self.with_env(|engine, env| engine.fulfill_randomness(env, &CONSUMER, request, value))
    }

    pub fn rebase(&mut self, new_supply: u128) -> Result<(), TokenError> {
        self.reward.rebase(new_supply)
    }

    /// Tokens `user` could collect right now.
    pub fn earned_amount(&self, user: &Address) -> u128 {
        self.engine
            .earned_amount(self.block, self.reward.total_supply(), user)
            .expect("earned")
    }

    pub fn reward_balance(&self, who: &Address) -> u128 {
        self.reward.balance_of(who)
    }

    /// Events of one kind, oldest first.
    pub fn events_of(&self, kind: &str) -> Vec<&Event> {
        self.engine.events().iter().filter(|e| e.kind() == kind).collect()
    }
}
