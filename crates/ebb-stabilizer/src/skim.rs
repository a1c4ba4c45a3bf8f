//! Fixed-percentage diversion of committed reward share to a multisig.

use serde::{Deserialize, Serialize};

use ebb_core::error::MathError;
use ebb_core::math::mul_fixed;
use ebb_core::types::{amount, Address};

/// Multisig payout configuration.
///
/// `share` is a fraction of each committed reward share (1e18 = 100%).
/// The skim is computed at the moment a cycle is committed, never
/// retroactively.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode,
    bincode::Decode,
)]
pub struct MultiSigSkim {
    #[serde(default)]
    pub address: Address,
    #[serde(default, with = "amount")]
    pub share: u128,
}

impl MultiSigSkim {
    /// Whether any skim will be paid.
    pub fn is_active(&self) -> bool {
        !self.address.is_zero() && self.share > 0
    }

    /// Skim owed on `committed_share`, in share units.
    pub fn skim_of(&self, committed_share: u128) -> Result<u128, MathError> {
        if !self.is_active() {
            return Ok(0);
        }
        mul_fixed(committed_share, self.share)
    }
}
