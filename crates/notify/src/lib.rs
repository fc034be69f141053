#![warn(clippy::unwrap_used)]

pub mod nats;

pub use nats::NatsNotifier;
