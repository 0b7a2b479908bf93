//! Procesos: orquestación de steps, suspensión por interacción, rollback y
//! persistencia.

mod core;
mod definition;
mod handle;
mod snapshot;
mod state;

pub use self::core::Process;
pub use definition::ProcessDefinition;
pub use handle::{CancellationFlag, Interaction, ProcessHandle};
pub use snapshot::{ProcessSnapshot, RollbackPoint};
pub use state::{InteractionParam, ProcessState, ProcessStatus};
