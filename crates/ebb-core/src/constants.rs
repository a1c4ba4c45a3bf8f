//! Protocol constants. All shares and percentages are 18-decimal fixed point.

/// Fixed-point unit: `PRECISION` represents 1.0 (100%).
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// One whole reward or LP token in base units (18 decimals).
pub const TOKEN: u128 = PRECISION;

/// Number of entries in a randomized-threshold distribution table.
///
/// A random value `v` selects entry `v % DISTRIBUTION_TABLE_LEN`.
pub const DISTRIBUTION_TABLE_LEN: usize = 100;

/// Current layout version of the encoded engine state.
///
/// Bump whenever a field is added to or removed from `EngineState`.
pub const STATE_VERSION: u16 = 2;

/// Upper bound on the gons backing the in-memory elastic token.
///
/// The actual total is the largest multiple of the initial supply under
/// this bound. Sixteen bits are left free so minting never overflows.
pub const MAX_GONS: u128 = u128::MAX >> 16;

/// Default number of blocks between two price-oracle updates.
pub const DEFAULT_ORACLE_PERIOD: u64 = 1_000;

/// Default number of positive epochs a reward cycle is spread across.
pub const DEFAULT_EPOCHS_PER_CYCLE: u64 = 5;
