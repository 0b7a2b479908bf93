//! procflow-core: motor de procesos interactivos por pasos.
//!
//! Un proceso ejecuta steps hasta que uno necesita interacción, se suspende
//! devolviendo un `ProcessState` y se reanuda con la interacción del usuario.
//! Los parámetros viven en un `ParameterStore` con claves tipadas; los steps
//! se componen de fragments anidables.
pub mod config;
pub mod constants;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod entity;
pub mod errors;
pub mod event;
pub mod fragment;
pub mod hashing;
pub mod param;
pub mod process;
pub mod repo;
pub mod step;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use coordinator::{HistoryCoordinator, NoopCoordinator, TransactionCoordinator};
pub use engine::{DefinitionRegistry, EngineBuilder, EngineBuilderInit, ProcessEngine};
pub use entity::{Criteria, Entity, EntityStore, InMemoryEntityStore};
pub use errors::{EntityError, ParamError, ProcessError, StepError};
pub use event::{EventStore, InMemoryEventStore, ProcessEvent, ProcessEventKind};
pub use fragment::{Fragment, FragmentContext, FragmentState, ValidationErrors, ValidationPhase};
pub use param::{AnnotationKey, KeyFlags, ParamId, ParamKey, ParamList, ParameterChanges, ParameterState, ParameterStore};
pub use process::{CancellationFlag, Interaction, InteractionParam, Process, ProcessDefinition, ProcessHandle,
                  ProcessSnapshot, ProcessState, ProcessStatus};
pub use repo::{InMemoryProcessRepository, ProcessRepository};
pub use step::{EventKind, HistoryMode, Step, StepConfig, StepPhase, TransactionMode};
