//! Builder para `ProcessEngine`.
//!
//! - `EngineBuilderInit` representa el estado inicial: stores (event_store +
//!   repository) presentes, contexto y definiciones aún por declarar.
//! - `EngineBuilder` acumula el contexto y las factorías de definición; los
//!   identificadores duplicados se detectan en `build`.
//!
//! ```ignore
//! let mut engine = ProcessEngine::new()
//!     .context(EngineContext::new(EngineConfig::from_env()))
//!     .definition("order", order_definition)
//!     .build()?;
//! ```

use crate::context::EngineContext;
use crate::engine::registry::DefinitionFactory;
use crate::engine::ProcessEngine;
use crate::errors::ProcessError;
use crate::event::EventStore;
use crate::process::ProcessDefinition;
use crate::repo::ProcessRepository;

/// Estado inicial del builder.
#[derive(Debug)]
pub struct EngineBuilderInit<E: EventStore, R: ProcessRepository> {
    /// Store de eventos que usará el engine.
    pub event_store: E,
    /// Repositorio de snapshots de procesos suspendidos.
    pub repository: R,
}

impl<E: EventStore, R: ProcessRepository> EngineBuilderInit<E, R> {
    /// Fija el contexto compartido (coordinadores, entidades, configuración).
    pub fn context(self, context: EngineContext) -> EngineBuilder<E, R> {
        EngineBuilder { event_store: self.event_store,
                        repository: self.repository,
                        context,
                        definitions: Vec::new() }
    }

    /// Declara una definición usando el contexto por defecto.
    pub fn definition<F>(self, id: impl Into<String>, factory: F) -> EngineBuilder<E, R>
        where F: Fn() -> ProcessDefinition + Send + Sync + 'static
    {
        self.context(EngineContext::default()).definition(id, factory)
    }
}

pub struct EngineBuilder<E: EventStore, R: ProcessRepository> {
    event_store: E,
    repository: R,
    context: EngineContext,
    definitions: Vec<(String, DefinitionFactory)>,
}

impl<E: EventStore, R: ProcessRepository> EngineBuilder<E, R> {
    pub fn definition<F>(mut self, id: impl Into<String>, factory: F) -> Self
        where F: Fn() -> ProcessDefinition + Send + Sync + 'static
    {
        self.definitions.push((id.into(), Box::new(factory)));
        self
    }

    /// Construye el engine registrando todas las definiciones declaradas.
    pub fn build(self) -> Result<ProcessEngine<E, R>, ProcessError> {
        let mut engine = ProcessEngine::new_with_stores(self.event_store, self.repository, self.context);
        for (id, factory) in self.definitions {
            engine.registry_mut().register(id, factory)?;
        }
        Ok(engine)
    }
}
