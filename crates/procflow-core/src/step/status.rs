use serde::{Deserialize, Serialize};

/// Fase de ejecución de un step dentro de su proceso.
///
/// `NotPrepared → Prepared → AwaitingInteraction → ReEntered → Executing →
/// Done | RolledBack`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepPhase {
    #[default]
    NotPrepared,
    Prepared,
    AwaitingInteraction,
    /// Llegó un evento de interacción; el siguiente `prepare` toma el camino
    /// ligero.
    ReEntered,
    Executing,
    Done,
    /// Restaurado por un rollback; el próximo avance lo vuelve a ejecutar.
    RolledBack,
}

impl StepPhase {
    /// Fases en las que el proceso puede estar suspendido sobre el step.
    pub fn is_suspended(self) -> bool {
        matches!(self, StepPhase::AwaitingInteraction | StepPhase::RolledBack)
    }
}
