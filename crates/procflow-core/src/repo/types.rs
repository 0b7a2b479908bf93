//! Repositorio de snapshots de procesos suspendidos.
//!
//! El repositorio guarda el snapshot serializado (JSON) para que cualquier
//! backend pueda almacenarlo tal cual. La verificación del checksum la hace el
//! engine al restaurar.
use std::collections::HashMap;

use uuid::Uuid;

use crate::errors::ProcessError;
use crate::process::ProcessSnapshot;

pub trait ProcessRepository {
    fn save(&mut self, snapshot: &ProcessSnapshot) -> Result<(), ProcessError>;
    fn load(&self, process_id: Uuid) -> Result<Option<ProcessSnapshot>, ProcessError>;
    fn remove(&mut self, process_id: Uuid) -> Result<(), ProcessError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProcessRepository {
    pub inner: HashMap<Uuid, String>,
}

impl InMemoryProcessRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl ProcessRepository for InMemoryProcessRepository {
    fn save(&mut self, snapshot: &ProcessSnapshot) -> Result<(), ProcessError> {
        let json = serde_json::to_string(snapshot).map_err(|e| ProcessError::Repository(e.to_string()))?;
        self.inner.insert(snapshot.id, json);
        Ok(())
    }

    fn load(&self, process_id: Uuid) -> Result<Option<ProcessSnapshot>, ProcessError> {
        match self.inner.get(&process_id) {
            Some(json) => serde_json::from_str(json).map(Some)
                                                    .map_err(|e| ProcessError::Repository(e.to_string())),
            None => Ok(None),
        }
    }

    fn remove(&mut self, process_id: Uuid) -> Result<(), ProcessError> {
        self.inner.remove(&process_id);
        Ok(())
    }
}
