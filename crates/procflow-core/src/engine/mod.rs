//! Engine: registro de definiciones, procesos vivos y persistencia.

pub mod builder;
pub mod core;
pub mod registry;

pub use self::core::ProcessEngine;
pub use builder::{EngineBuilder, EngineBuilderInit};
pub use registry::{DefinitionFactory, DefinitionRegistry};

pub use crate::event::{EventStore, InMemoryEventStore, ProcessEvent, ProcessEventKind};
pub use crate::repo::{InMemoryProcessRepository, ProcessRepository};
