use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::param::ParamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Entrada continua (teclear, mover un slider...).
    Update,
    /// Disparo discreto (botón).
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub key: ParamId,
    pub kind: EventKind,
}

/// Destino elegido en tiempo de ejecución.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Step(String),
    Finish,
}

/// Estado volátil de un step entre `prepare` y `perform`.
#[derive(Debug, Clone, Default)]
pub struct StepRuntime {
    pub(crate) event: Option<InteractionEvent>,
    pub(crate) continuation_cause: Option<ParamId>,
    pub(crate) transition: Option<Transition>,
    pub(crate) auto_update: Option<Duration>,
    pub(crate) spawn: Vec<String>,
}

impl StepRuntime {
    pub fn event(&self) -> Option<&InteractionEvent> {
        self.event.as_ref()
    }

    pub fn auto_update(&self) -> Option<Duration> {
        self.auto_update
    }
}
