//! # ebb-core
//! Foundation types, rebase-safe share math and host traits for the Ebb
//! stabilizer engines.

pub mod constants;
pub mod error;
pub mod events;
pub mod math;
pub mod memory;
pub mod traits;
pub mod types;
