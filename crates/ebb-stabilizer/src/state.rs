//! Versioned engine state.
//!
//! All mutable engine data lives in one [`EngineState`], so a state can be
//! built directly in tests, cloned as a revert snapshot, and persisted.
//! The encoded form is a little-endian `u16` [`STATE_VERSION`] followed by
//! the bincode (standard config) body.

use serde::{Deserialize, Serialize};

use ebb_core::constants::STATE_VERSION;
use ebb_core::error::{ConfigError, StateError};
use ebb_core::types::{Address, RebaseDirection};

use crate::config::EngineConfig;
use crate::gate::GatingPolicy;
use crate::revocation::RevocationPolicy;
use crate::scheduler::RewardStream;
use crate::skim::MultiSigSkim;
use crate::staking::StakerLedger;

/// Decode limit for a state body.
pub const MAX_STATE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct EngineState {
    pub engine: Address,
    pub owner: Address,
    pub policy: Address,
    pub randomness_consumer: Address,
    pub stream: RewardStream,
    pub stakers: StakerLedger,
    pub revocation: RevocationPolicy,
    pub skim: MultiSigSkim,
    pub pool_enabled: bool,
    pub before_period_finish: bool,
    pub last_rebase: RebaseDirection,
    pub gate: GatingPolicy,
}

impl EngineState {
    /// Initial state for a validated configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine: config.engine,
            owner: config.owner,
            policy: config.policy,
            randomness_consumer: config.randomness_consumer,
            stream: RewardStream::default(),
            stakers: StakerLedger::new(config.limits),
            revocation: config.revocation,
            skim: config.skim,
            pool_enabled: config.pool_enabled,
            before_period_finish: config.before_period_finish,
            last_rebase: RebaseDirection::Neutral,
            gate: GatingPolicy::from_config(&config.gate)?,
        })
    }

    /// Serialize with a version prefix.
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        let body = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StateError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(2 + body.len());
        out.extend_from_slice(&STATE_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse bytes produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// - [`StateError::UnsupportedVersion`] for any other layout version
    /// - [`StateError::Decode`] for truncated or trailing bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        let (version, body) = bytes
            .split_first_chunk::<2>()
            .ok_or_else(|| StateError::Decode("missing version prefix".into()))?;
        let found = u16::from_le_bytes(*version);
        if found != STATE_VERSION {
            return Err(StateError::UnsupportedVersion { found, expected: STATE_VERSION });
        }
        let config = bincode::config::standard().with_limit::<MAX_STATE_BYTES>();
        let (state, read): (Self, usize) = bincode::decode_from_slice(body, config)
            .map_err(|e| StateError::Decode(e.to_string()))?;
        if read != body.len() {
            return Err(StateError::Decode(format!("{} trailing bytes", body.len() - read)));
        }
        Ok(state)
    }
}
