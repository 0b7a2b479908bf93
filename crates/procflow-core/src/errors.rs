//! Errores del core, organizados por capa.
//!
//! - `ParamError`: accesos al `ParameterStore` (conversión, finales, claves).
//! - `StepError`: lo que devuelve el código de un step o fragment.
//! - `ProcessError`: lo que el engine expone en su frontera, ya con la
//!   identidad del step que falló.
//! - `EntityError`: contrato estrecho con la capa de entidades y los
//!   coordinadores de transacción.

use thiserror::Error;

use crate::fragment::ValidationErrors;
use crate::param::ParamId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("mandatory parameter '{0}' has no value")] Missing(ParamId),
    #[error("parameter '{param}' holds an incompatible value: {message}")] Conversion { param: ParamId, message: String },
    #[error("final parameter '{0}' already has a value")] FinalValue(ParamId),
    #[error("parameter key '{0}' declared twice with different definitions")] DuplicateKey(ParamId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("storage error: {0}")] Storage(String),
    #[error("transaction error: {0}")] Transaction(String),
    #[error("entity not found: {0}")] NotFound(String),
}

/// Error devuelto por las implementaciones de `Step` y `Fragment`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error(transparent)] Param(#[from] ParamError),
    #[error(transparent)] Entity(#[from] EntityError),
    #[error("{0}")] Failed(String),
    #[error("operation cancelled")] Cancelled,
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errores en la frontera del proceso.
///
/// Sólo `ValidationFailure` es recuperable localmente: el llamador corrige la
/// entrada y vuelve a invocar `resume`. El resto señala un defecto de
/// configuración o un fallo de ejecución que debe llegar al usuario.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("validation failed in step '{step}': {errors:?}")] ValidationFailure { step: String, errors: ValidationErrors },
    #[error("step '{step}' is missing mandatory parameter '{param}'")] MissingMandatoryParameter { step: String, param: ParamId },
    #[error("step '{step}' does not support rollback")] RollbackUnsupported { step: String },
    #[error("unbalanced {scope} scope at step '{step}' (depth {depth})")] TransactionNesting { step: String, scope: &'static str, depth: u32 },
    #[error("step '{step}' failed: {source}")] StepExecution { step: String, #[source] source: StepError },
    #[error("step '{step}' was cancelled")] Cancelled { step: String },
    #[error("fragment '{fragment}' would be attached under itself in step '{step}'")] CyclicFragment { step: String, fragment: String },
    #[error("parameter '{param}' is not writable in step '{step}'")] NotWritable { step: String, param: ParamId },
    #[error("coordinator error at step '{step}': {source}")] Coordinator { step: String, #[source] source: EntityError },
    #[error("unknown step '{0}'")] UnknownStep(String),
    #[error("unknown process definition '{0}'")] UnknownDefinition(String),
    #[error("process definition '{0}' registered twice")] DuplicateDefinition(String),
    #[error("process not found: {0}")] ProcessNotFound(uuid::Uuid),
    #[error("invalid process state: {0}")] InvalidState(String),
    #[error("more than {0} step transitions in a single call")] TransitionLimit(usize),
    #[error(transparent)] Param(#[from] ParamError),
    #[error("repository: {0}")] Repository(String),
}

impl ProcessError {
    /// Envuelve el error de un step con su identidad. Los parámetros
    /// obligatorios ausentes y las cancelaciones conservan su propia variante.
    pub fn from_step(step: &str, err: StepError) -> Self {
        match err {
            StepError::Param(ParamError::Missing(param)) => Self::MissingMandatoryParameter { step: step.to_string(), param },
            StepError::Cancelled => Self::Cancelled { step: step.to_string() },
            other => Self::StepExecution { step: step.to_string(), source: other },
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ValidationFailure { .. })
    }

    /// Nombre del step asociado al error, si lo hay.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::ValidationFailure { step, .. }
            | Self::MissingMandatoryParameter { step, .. }
            | Self::RollbackUnsupported { step }
            | Self::TransactionNesting { step, .. }
            | Self::StepExecution { step, .. }
            | Self::Cancelled { step }
            | Self::CyclicFragment { step, .. }
            | Self::NotWritable { step, .. }
            | Self::Coordinator { step, .. } => Some(step),
            Self::UnknownStep(step) => Some(step),
            _ => None,
        }
    }
}
