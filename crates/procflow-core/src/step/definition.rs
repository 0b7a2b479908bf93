use crate::errors::StepError;
use crate::fragment::{Fragment, FragmentContext};
use crate::param::{ParamId, ParamKey, ParameterStore};

use super::scope::{HistoryMode, TransactionMode};

/// Configuración estática de un step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepConfig {
    pub interactive: bool,
    pub can_rollback: bool,
    /// `None` termina el proceso tras este step.
    pub next_step: Option<String>,
    pub mandatory: Vec<ParamId>,
    pub transaction: TransactionMode,
    pub history: HistoryMode,
}

impl StepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn rollback(mut self) -> Self {
        self.can_rollback = true;
        self
    }

    pub fn next(mut self, step: impl Into<String>) -> Self {
        self.next_step = Some(step.into());
        self
    }

    pub fn mandatory<T>(mut self, key: &ParamKey<T>) -> Self {
        self.mandatory.push(key.id().clone());
        self
    }

    pub fn transaction(mut self, mode: TransactionMode) -> Self {
        self.transaction = mode;
        self
    }

    pub fn history(mut self, mode: HistoryMode) -> Self {
        self.history = mode;
        self
    }

    /// Modos que aplica el engine. Un historial `Wrap` implica transacción
    /// `Wrap`, y un scope `Wrap` prevalece sobre marcas manuales
    /// `Begin`/`End` del mismo tipo.
    pub fn effective_scopes(&self) -> (TransactionMode, HistoryMode) {
        match self.history {
            HistoryMode::Wrap => (TransactionMode::Wrap, HistoryMode::Wrap),
            history => (self.transaction, history),
        }
    }
}

/// Contrato de un step: fragment raíz más hooks de ejecución.
///
/// `execute` es la única operación obligatoria además de `init`. Los demás
/// hooks tienen implementación por defecto.
pub trait Step: Fragment {
    fn config(&self) -> StepConfig;

    /// Preparación completa antes de la primera presentación del step.
    fn prepare_execution(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    /// Se invoca cuando una clave de continuación provoca la ejecución sin
    /// suspender.
    fn prepare_continuation(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn needs_interaction(&self, ctx: &FragmentContext<'_>) -> bool {
        self.config().interactive && ctx.has_interaction_params()
    }

    fn execute(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError>;

    /// Deshace efectos externos del último `execute`. El estado de
    /// parámetros lo restaura el engine.
    fn rollback(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    /// Si el step puede volver a su interacción anterior sin salir de él
    /// (steps que recorren un subproceso propio).
    fn can_rollback_to_previous_interaction(&self, _store: &ParameterStore) -> bool {
        false
    }

    fn rollback_to_previous_interaction(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Err(StepError::failed("rollback to previous interaction is not supported"))
    }

    /// Limpieza al abandonar el step (no se llama mientras siga en interacción).
    fn cleanup(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }
}
