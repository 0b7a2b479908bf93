//! Eventos de auditoría y trait EventStore.

mod store;
mod types;

pub use store::{EventStore, InMemoryEventStore};
pub use types::{ProcessEvent, ProcessEventKind};
