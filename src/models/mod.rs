//! Model identity and per-session routing memory
//!
//! Provides the `provider/model` key used by usage accounting and cooldowns,
//! and the expiring session pin cache used by the hook server.

pub mod model_key;
pub mod pin;

pub use model_key::{ExclusionSet, ModelKey};
pub use pin::{PendingPin, PinCache};
