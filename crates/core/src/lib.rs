pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::AppConfig;
pub use error::{RotationError, RotationResult};
pub use events::Notifier;
pub use types::{EventKind, RotationEvent};
