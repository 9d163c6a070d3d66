//! Rate limiting counters.
//!
//! The dispatcher charges each request against the endpoint's rate for the
//! caller's scope through a [`ThrottleStore`]. The bundled
//! [`InMemoryThrottleStore`] is a per-process fixed-window counter; a shared
//! backend can be plugged in by implementing the trait.

mod clock;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{InMemoryThrottleStore, ThrottleDecision, ThrottleStore, DEFAULT_SWEEP_EVERY};
