use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use super::{ProcessEvent, ProcessEventKind};

/// Almacenamiento de eventos append-only.
pub trait EventStore {
    /// Agrega un evento a partir de su kind y devuelve el evento completo (con seq y ts).
    fn append_kind(&mut self, process_id: Uuid, kind: ProcessEventKind) -> ProcessEvent;
    /// Lista eventos de un proceso (orden ascendente por seq).
    fn list(&self, process_id: Uuid) -> Vec<ProcessEvent>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    pub inner: HashMap<Uuid, Vec<ProcessEvent>>,
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&mut self, process_id: Uuid, kind: ProcessEventKind) -> ProcessEvent {
        let vec = self.inner.entry(process_id).or_default();
        let seq = vec.len() as u64;
        let ev = ProcessEvent { seq, process_id, kind, ts: Utc::now() };
        vec.push(ev.clone());
        ev
    }

    fn list(&self, process_id: Uuid) -> Vec<ProcessEvent> {
        self.inner.get(&process_id).cloned().unwrap_or_default()
    }
}
