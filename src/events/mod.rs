//! Durable event plumbing
//!
//! Topic constants, event payloads and the in-process event bus that drives
//! the fanout router.

mod bus;
mod types;

pub use bus::{EventBus, EventHandler, EventRecord};
pub use types::{EventPayload, topics};
