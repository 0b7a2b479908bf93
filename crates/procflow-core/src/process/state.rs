//! `ProcessState`: snapshot serializable para la capa de presentación.
//!
//! Contiene todo lo necesario para redibujar la UI sin consultar el engine.
//! El diff incremental (parámetros modificados) se obtiene aparte con
//! `ProcessEngine::take_changes`, de modo que el estado sea reproducible tras
//! persistir y restaurar.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::fragment::ValidationErrors;
use crate::param::{ParamId, PropertyMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    Created,
    Running,
    Suspended,
    Finished,
    Cancelled,
    Failed,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionParam {
    pub id: ParamId,
    /// Fragment que declaró el parámetro.
    pub fragment: String,
    pub value: Option<Value>,
    pub writable: bool,
    pub properties: PropertyMap,
    pub annotations: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    pub process_id: Uuid,
    pub definition: String,
    pub status: ProcessStatus,
    /// Step actual; `None` cuando el proceso terminó.
    pub step: Option<String>,
    pub params: Vec<InteractionParam>,
    pub validation_errors: ValidationErrors,
    pub can_rollback: bool,
    /// Sugerencia de re-invocación para steps con auto-update.
    pub retry_after_ms: Option<u64>,
    pub spawned: Vec<Uuid>,
}

impl ProcessState {
    pub fn is_finished(&self) -> bool {
        self.status == ProcessStatus::Finished
    }

    pub fn param(&self, id: &ParamId) -> Option<&InteractionParam> {
        self.params.iter().find(|p| &p.id == id)
    }
}
