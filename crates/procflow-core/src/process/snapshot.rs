//! Forma persistida de un proceso suspendido.
//!
//! Guarda (id, step actual, estado no transitorio del store, profundidad de
//! scopes, historial de rollback). El árbol de fragments no se serializa: se
//! reconstruye llamando de nuevo a `init` sobre el step actual. El checksum es
//! el blake3 del JSON canónico del resto de campos.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ProcessStatus;
use crate::errors::ProcessError;
use crate::fragment::ValidationErrors;
use crate::hashing::hash_value;
use crate::param::ParameterState;
use crate::step::{ScopeDepths, StepPhase};

/// Estado previo al `execute` de un step con su profundidad de scopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub step: String,
    pub state: ParameterState,
    pub depths: ScopeDepths,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub id: Uuid,
    pub definition: String,
    pub status: ProcessStatus,
    pub current_step: Option<String>,
    pub phase: StepPhase,
    pub parameters: ParameterState,
    pub depths: ScopeDepths,
    pub history: Vec<RollbackPoint>,
    pub validation_errors: ValidationErrors,
    pub retry_after_ms: Option<u64>,
    /// El último fallo deshizo scopes de steps anteriores: sólo se sale con
    /// un rollback.
    #[serde(default)]
    pub retry_blocked: bool,
    pub spawned: Vec<Uuid>,
    #[serde(default)]
    pub checksum: String,
}

impl ProcessSnapshot {
    pub fn compute_checksum(&self) -> Result<String, ProcessError> {
        let mut value = serde_json::to_value(self).map_err(|e| ProcessError::Repository(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.remove("checksum");
        }
        Ok(hash_value(&value))
    }

    pub fn seal(mut self) -> Result<Self, ProcessError> {
        self.checksum = self.compute_checksum()?;
        Ok(self)
    }

    pub fn verify(&self) -> Result<(), ProcessError> {
        if self.compute_checksum()? != self.checksum {
            return Err(ProcessError::InvalidState(format!("snapshot checksum mismatch for process {}", self.id)));
        }
        Ok(())
    }
}
