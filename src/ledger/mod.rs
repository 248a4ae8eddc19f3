//! Ledger module containing campaign management and donation processing

pub mod campaign;
pub mod core;
pub mod donation;

pub use campaign::*;
pub use self::core::*;
pub use donation::*;
