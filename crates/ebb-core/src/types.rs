//! Core protocol types: addresses, request identifiers, epoch signals.
//!
//! All token quantities are `u128` base units (18 decimals). Shares are
//! `u128` fractions of total supply scaled by [`PRECISION`](crate::constants::PRECISION).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 20-byte account address.
///
/// Displays and parses as `0x`-prefixed lowercase hex.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// An address with every byte set to `byte`. Handy for fixtures.
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Error returned when parsing an [`Address`] from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(pub String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| ParseAddressError(e.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ParseAddressError(format!("expected 20 bytes, got {}", b.len())))?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of an outstanding randomness request.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    /// Derive a request id from the requesting consumer and its nonce (BLAKE3).
    pub fn derive(consumer: &Address, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(consumer.as_bytes());
        hasher.update(&nonce.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Direction of the most recent rebase as seen by a stabilizer.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum RebaseDirection {
    /// Supply expanded.
    Positive,
    /// Supply unchanged.
    #[default]
    Neutral,
    /// Supply contracted.
    Negative,
}

impl RebaseDirection {
    /// Classify a signed supply delta.
    pub fn from_delta(supply_delta: i128) -> Self {
        match supply_delta {
            d if d > 0 => Self::Positive,
            0 => Self::Neutral,
            _ => Self::Negative,
        }
    }
}

/// Arguments the supply-policy controller passes to a stabilizer once per epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EpochSignal {
    /// Signed change in total supply this epoch, in base units.
    pub supply_delta: i128,
    /// Rebase lag applied by the controller.
    pub rebase_lag: i128,
    /// Exchange rate observed by the controller (18-decimal fixed point).
    pub exchange_rate: u128,
    /// Reward tokens the controller holds for stabilizers (or the amount it
    /// is willing to release), in base units.
    pub pool_balance: u128,
}

impl EpochSignal {
    /// Build a signal from a supply delta and pool balance, with neutral lag and rate.
    pub fn new(supply_delta: i128, pool_balance: u128) -> Self {
        Self {
            supply_delta,
            rebase_lag: 1,
            exchange_rate: crate::constants::PRECISION,
            pool_balance,
        }
    }

    /// Direction of this epoch's rebase.
    pub fn direction(&self) -> RebaseDirection {
        RebaseDirection::from_delta(self.supply_delta)
    }
}

/// Serde helpers for `u128` token amounts.
///
/// Accepts integers of any width or decimal strings, so configuration files
/// can express amounts above `i64::MAX` (e.g. `"30000000000000000000000"`).
pub mod amount {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl Visitor<'_> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount {v}")))
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim().replace('_', "").parse().map_err(E::custom)
        }
    }
}
