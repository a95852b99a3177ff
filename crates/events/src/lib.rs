//! Event publication mechanics.
//!
//! The ledger engine never depends on a concrete transport: it hands committed
//! facts to an [`EventBus`], which may be in-memory (tests/dev) or backed by a
//! broker (see the infra crate).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
