#![warn(clippy::unwrap_used)]

pub mod ledger;
pub mod rotation;
pub mod scorer;

pub use ledger::{Ledger, MemoryLedger};
pub use rotation::{Decision, RotationEngine};
pub use scorer::Scorer;
