//! Claw-back of unvested share on non-positive epochs.

use serde::{Deserialize, Serialize};

use ebb_core::error::MathError;

use crate::scheduler::RewardStream;

/// Revocation settings.
///
/// On a non-positive epoch with `enabled`, `duration` blocks are cut off the
/// end of the running cycle if at least that many remain.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode,
    bincode::Decode,
)]
pub struct RevocationPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub duration: u64,
}

/// Outcome of a successful revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revoked {
    pub duration: u64,
    pub share: u128,
}

impl RevocationPolicy {
    /// Apply to `stream` at `now`. Returns `None` when disabled or when the
    /// duration exceeds the remaining window.
    pub fn apply(
        &self,
        stream: &mut RewardStream,
        now: u64,
        total_staked: u128,
    ) -> Result<Option<Revoked>, MathError> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(stream
            .revoke(now, self.duration, total_staked)?
            .map(|share| Revoked { duration: self.duration, share }))
    }
}
