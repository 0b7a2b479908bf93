//! Tipos de evento de un proceso y estructura `ProcessEvent`.
//!
//! - El proceso acumula los kinds en un diario interno mientras opera; el
//!   engine los vuelca al `EventStore` append-only al terminar cada llamada.
//! - Los eventos son auditoría: el estado reanudable vive en el snapshot, no
//!   se reconstruye por replay.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::param::ParamId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessEventKind {
    /// Primer evento de un proceso.
    ProcessCreated { definition: String },
    StepStarted { step: String },
    StepFinished { step: String },
    /// Fallo terminal de un step; el puntero de step no avanza.
    StepFailed { step: String, error: String },
    /// El proceso se suspendió esperando al usuario.
    InteractionRequested { step: String, params: Vec<ParamId> },
    InteractionReceived { step: String, key: Option<ParamId> },
    ValidationFailed { step: String, params: Vec<ParamId> },
    RolledBack { from: String, to: String },
    /// Cierre con el hash del estado persistente final.
    ProcessFinished { fingerprint: String },
    ProcessCancelled { step: Option<String> },
    ProcessRestored { step: Option<String> },
    ProcessSpawned { child: Uuid, definition: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub seq: u64, // asignado por el store (orden append)
    pub process_id: Uuid,
    pub kind: ProcessEventKind,
    pub ts: DateTime<Utc>,
}
