#![warn(clippy::unwrap_used)]

pub mod redis_ledger;

pub use redis_ledger::RedisLedger;
