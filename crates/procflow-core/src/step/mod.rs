//! Steps: unidad de ejecución de un proceso.
//!
//! Un `Step` es el fragment raíz de su árbol más los hooks de ejecución. El
//! comportamiento de scopes (transacción / historial) es dato de
//! configuración (`StepConfig`), no un subtipo.

mod definition;
mod runtime;
mod scope;
mod status;

pub use definition::{Step, StepConfig};
pub use runtime::{EventKind, InteractionEvent, StepRuntime, Transition};
pub use scope::{HistoryMode, ScopeDepths, TransactionMode};
pub use status::StepPhase;
